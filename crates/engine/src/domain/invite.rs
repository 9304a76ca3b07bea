// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invite-share processing: parses a locally-written share file (one `wx`
//! share link per line, appended by the host app's share hook) and reports
//! each referrer via `User.ReportArkClick`. Only relevant on the `wx`
//! platform; every other platform's invite cycle is a no-op.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use farmgate::GatewaySession;

use crate::domain::user::report_ark_click;

pub const REQUEST_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareLink {
    pub uid: String,
    pub openid: String,
    pub share_source: String,
    pub doc_id: String,
}

/// Parses one query-string-shaped share link (`"?uid=...&openid=..."`, the
/// leading `?` optional). Unknown or missing fields default to empty.
pub fn parse_share_link(link: &str) -> ShareLink {
    let text = link.trim().trim_start_matches('?');
    let mut out = ShareLink::default();
    for pair in text.split('&') {
        let Some((key, value)) = pair.split_once('=') else { continue };
        match key {
            "uid" => out.uid = value.to_owned(),
            "openid" => out.openid = value.to_owned(),
            "share_source" => out.share_source = value.to_owned(),
            "doc_id" => out.doc_id = value.to_owned(),
            _ => {}
        }
    }
    out
}

/// Reads and parses the share file, deduplicating by `uid` and dropping
/// rows missing `uid` or `openid`, or any line without an `openid=`
/// fragment at all.
pub fn read_share_file(path: &Path) -> Vec<ShareLink> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut seen_uid = HashSet::new();
    let mut rows = Vec::new();
    for line in contents.lines() {
        let raw = line.trim();
        if raw.is_empty() || !raw.contains("openid=") {
            continue;
        }
        let parsed = parse_share_link(raw);
        if parsed.uid.is_empty() || parsed.openid.is_empty() || !seen_uid.insert(parsed.uid.clone()) {
            continue;
        }
        rows.push(parsed);
    }
    rows
}

pub fn clear_share_file(path: &Path) {
    let _ = std::fs::write(path, "");
}

#[derive(Debug, Clone, Default)]
pub struct InviteOutcome {
    pub skipped: bool,
    pub reason: &'static str,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Walks the share file and reports every referrer, spaced by
/// [`REQUEST_DELAY`] so the gateway sees one report request at a time. A
/// failed report is counted and logged but does not stop the sweep. The
/// share file is cleared only after a non-skipped run, so a crash mid-sweep
/// leaves unreported rows for the next attempt.
pub async fn process_invites(
    session: &GatewaySession,
    platform: &str,
    share_file_path: &Path,
    log: impl Fn(bool, &str),
) -> InviteOutcome {
    if platform != "wx" {
        return InviteOutcome { skipped: true, reason: "platform_not_wx", ..Default::default() };
    }

    let rows = read_share_file(share_file_path);
    if rows.is_empty() {
        return InviteOutcome { skipped: true, reason: "empty", ..Default::default() };
    }

    let mut success = 0;
    let mut failed = 0;
    let last = rows.len() - 1;
    for (idx, row) in rows.iter().enumerate() {
        let sharer_id: i64 = row.uid.parse().unwrap_or(0);
        let share_source: i64 = row.share_source.parse().unwrap_or(0);
        match report_ark_click(session, sharer_id, &row.openid, share_source).await {
            Ok(_) => {
                success += 1;
                log(false, &format!("invite report ok uid={sharer_id}"));
            }
            Err(e) => {
                failed += 1;
                log(true, &format!("invite report failed uid={sharer_id}: {e}"));
            }
        }
        if idx < last {
            tokio::time::sleep(REQUEST_DELAY).await;
        }
    }

    clear_share_file(share_file_path);
    log(false, &format!("invite process done success={success} failed={failed}"));
    InviteOutcome { skipped: false, reason: "", total: rows.len(), success, failed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_share_link_extracts_known_fields() {
        let row = parse_share_link("?uid=1001&openid=abc&share_source=77&doc_id=9");
        assert_eq!(row.uid, "1001");
        assert_eq!(row.openid, "abc");
        assert_eq!(row.share_source, "77");
        assert_eq!(row.doc_id, "9");
    }

    #[test]
    fn read_share_file_dedups_by_uid_and_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("share.txt");
        std::fs::write(
            &path,
            "?uid=1001&openid=aaa&share_source=1\n?uid=1001&openid=bbb&share_source=2\n?uid=1002&openid=ccc&share_source=3\nnot a share line\n",
        )
        .unwrap();

        let rows = read_share_file(&path);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].uid, "1001");
        assert_eq!(rows[1].uid, "1002");
    }

    #[test]
    fn read_share_file_returns_empty_for_missing_file() {
        let rows = read_share_file(Path::new("/nonexistent/share.txt"));
        assert!(rows.is_empty());
    }

    #[test]
    fn clear_share_file_truncates_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("share.txt");
        std::fs::write(&path, "?uid=1&openid=a").unwrap();
        clear_share_file(&path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
