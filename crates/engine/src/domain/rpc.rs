// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin encode/call/decode helper shared by every domain service so each
//! service module only has to name the service, method, and message types.

use farmgate::GatewaySession;
use prost::Message;

use crate::error::EngineError;

pub async fn call<Req, Rep>(
    session: &GatewaySession,
    service: &str,
    method: &str,
    request: Req,
) -> Result<Rep, EngineError>
where
    Req: Message,
    Rep: Message + Default,
{
    let body = session.call(service, method, request.encode_to_vec(), None).await?;
    Rep::decode(body).map_err(|e| EngineError::Internal(format!("decode {service}.{method}: {e}")))
}
