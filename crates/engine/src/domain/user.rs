// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C2: login, heartbeat, and ark-click reporting. Device profile fields are
//! fixed constants matching the client build this gateway impersonates.

use farmgate::proto::{
    DeviceInfo, HeartbeatReply, HeartbeatRequest, LoginReply, LoginRequest, ReportArkClickReply,
    ReportArkClickRequest, ReportData,
};
use farmgate::GatewaySession;

use crate::domain::rpc::call;
use crate::error::EngineError;

const SERVICE: &str = "gamepb.userpb.UserService";

fn device_info(client_version: &str) -> DeviceInfo {
    DeviceInfo {
        client_version: client_version.to_owned(),
        sys_software: "iOS 26.2.1".to_owned(),
        network: "wifi".to_owned(),
        memory: 7672,
        device_id: "iPhone X<iPhone18,3>".to_owned(),
    }
}

fn report_data() -> ReportData {
    ReportData {
        callback: String::new(),
        cd_extend_info: String::new(),
        click_id: String::new(),
        clue_token: String::new(),
        minigame_channel: "other".to_owned(),
        minigame_platid: 2,
        req_id: String::new(),
        trackid: String::new(),
    }
}

pub async fn login(session: &GatewaySession, client_version: &str) -> Result<LoginReply, EngineError> {
    let request = LoginRequest {
        sharer_id: 0,
        sharer_open_id: String::new(),
        device_info: Some(device_info(client_version)),
        share_cfg_id: 0,
        scene_id: "1256".to_owned(),
        report_data: Some(report_data()),
    };
    call(session, SERVICE, "Login", request).await
}

pub async fn heartbeat(session: &GatewaySession, gid: i64, client_version: &str) -> Result<HeartbeatReply, EngineError> {
    call(session, SERVICE, "Heartbeat", HeartbeatRequest { gid, client_version: client_version.to_owned() }).await
}

pub async fn report_ark_click(
    session: &GatewaySession,
    sharer_id: i64,
    sharer_open_id: &str,
    share_cfg_id: i64,
) -> Result<ReportArkClickReply, EngineError> {
    let request = ReportArkClickRequest {
        sharer_id,
        sharer_open_id: sharer_open_id.to_owned(),
        share_cfg_id,
        scene_id: "1256".to_owned(),
    };
    call(session, SERVICE, "ReportArkClick", request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_matches_the_fixed_client_profile() {
        let info = device_info("1.6.0.5_20251224");
        assert_eq!(info.sys_software, "iOS 26.2.1");
        assert_eq!(info.network, "wifi");
        assert_eq!(info.memory, 7672);
        assert_eq!(info.device_id, "iPhone X<iPhone18,3>");
        assert_eq!(info.client_version, "1.6.0.5_20251224");
    }
}
