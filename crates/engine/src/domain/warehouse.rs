// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C2: bag inspection and the sell pipeline.

use std::collections::HashMap;
use std::time::Duration;

use farmgate::proto::{BagReply, BagRequest, Item, SellReply, SellRequest};
use farmgate::GatewaySession;
use tracing::debug;

use crate::config_store::ConfigStore;
use crate::domain::rpc::call;
use crate::error::EngineError;

const SERVICE: &str = "gamepb.itempb.ItemService";
const SELL_BATCH_SIZE: usize = 15;
const BATCH_SPACING: Duration = Duration::from_millis(300);
const FALLBACK_SPACING: Duration = Duration::from_millis(100);
const GOLD_ITEM_IDS: [i64; 2] = [1, 1001];
const FERTILIZER_BUCKET_INTERACTION_TYPE: &str = "fertilizerbucket";

pub async fn get_bag(session: &GatewaySession) -> Result<BagReply, EngineError> {
    call(session, SERVICE, "Bag", BagRequest {}).await
}

/// Total count of a given seed id held across every stack in the bag.
pub fn seed_stock(bag: &BagReply, seed_id: i64) -> i64 {
    bag.item_bag.as_ref().map(|b| b.items.iter().filter(|i| i.id == seed_id).map(|i| i.count).sum()).unwrap_or(0)
}

pub async fn sell_items(session: &GatewaySession, items: Vec<Item>) -> Result<SellReply, EngineError> {
    call(session, SERVICE, "Sell", SellRequest { items }).await
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemCategory {
    Gold,
    Exp,
    Fruit,
    Seed,
    Item,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BagRow {
    pub item_id: i64,
    pub count: i64,
    pub name: String,
    pub category: ItemCategory,
    /// For fertilizer-bucket items: `floor(count / 3600 * 10) / 10` hours,
    /// i.e. the bucket's contents expressed as tenths of an hour.
    pub hours_text: Option<String>,
}

/// Merges duplicate item ids (the bag endpoint can return the same id
/// split across multiple stacks) and classifies each into a display
/// category using the config store.
pub fn get_bag_detail(config: &ConfigStore, bag: &BagReply) -> Vec<BagRow> {
    let mut merged: HashMap<i64, i64> = HashMap::new();
    if let Some(item_bag) = &bag.item_bag {
        for item in &item_bag.items {
            *merged.entry(item.id).or_insert(0) += item.count;
        }
    }

    let mut rows: Vec<BagRow> = merged
        .into_iter()
        .map(|(item_id, count)| {
            let config_item = config.item_by_id(item_id as u64);
            let name = config_item.map(|i| i.name.clone()).unwrap_or_else(|| format!("item#{item_id}"));
            let interaction_type = config_item.map(|i| i.interaction_type.as_str()).unwrap_or("");
            let category = categorize(item_id, config);
            let hours_text = if interaction_type == FERTILIZER_BUCKET_INTERACTION_TYPE {
                Some(format!("{:.1}", (count as f64 / 3600.0 * 10.0).floor() / 10.0))
            } else {
                None
            };
            BagRow { item_id, count, name, category, hours_text }
        })
        .collect();
    rows.sort_by_key(|r| r.item_id);
    rows
}

fn categorize(item_id: i64, config: &ConfigStore) -> ItemCategory {
    if GOLD_ITEM_IDS.contains(&item_id) {
        return ItemCategory::Gold;
    }
    if config.plant_by_fruit(item_id as u64).is_some() {
        return ItemCategory::Fruit;
    }
    if config.item_by_id(item_id as u64).map(|i| config.plant_by_seed(item_id as u64).is_some()).unwrap_or(false) {
        return ItemCategory::Seed;
    }
    if item_id == 2 {
        return ItemCategory::Exp;
    }
    ItemCategory::Item
}

/// Sums the gold received back from a sell reply: only item ids `1` and
/// `1001` are gold denominations, everything else in the reply is a
/// secondary drop (e.g. bonus seeds).
pub fn derive_gold_gain(reply: &SellReply) -> i64 {
    reply.get_items.iter().filter(|i| GOLD_ITEM_IDS.contains(&i.id)).map(|i| i.count).sum()
}

/// Sells every fruit item in the bag in batches of 15, spaced to avoid
/// flooding the gateway; a batch that fails is retried item-by-item.
pub async fn sell_all_fruits(session: &GatewaySession, config: &ConfigStore, bag: &BagReply) -> Result<i64, EngineError> {
    let fruit_items: Vec<Item> = bag
        .item_bag
        .as_ref()
        .map(|b| b.items.iter().filter(|i| config.plant_by_fruit(i.id as u64).is_some()).cloned().collect())
        .unwrap_or_default();

    let mut total_gold = 0i64;
    for (batch_index, chunk) in fruit_items.chunks(SELL_BATCH_SIZE).enumerate() {
        if batch_index > 0 {
            tokio::time::sleep(BATCH_SPACING).await;
        }
        match sell_items(session, chunk.to_vec()).await {
            Ok(reply) => total_gold += derive_gold_gain(&reply),
            Err(e) => {
                debug!(error = %e, "sell batch failed, falling back to per-item");
                for (i, item) in chunk.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(FALLBACK_SPACING).await;
                    }
                    let reply = sell_items(session, vec![item.clone()]).await?;
                    total_gold += derive_gold_gain(&reply);
                }
            }
        }
    }
    Ok(total_gold)
}
