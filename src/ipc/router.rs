use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::setup::try_handle,
    handlers::years::try_handle,
    handlers::classes::try_handle,
    handlers::students::try_handle,
    handlers::teachers::try_handle,
    handlers::fees::try_handle,
    handlers::ledger::try_handle,
    handlers::promotion::try_handle,
    handlers::expenses::try_handle,
    handlers::reports::try_handle,
    handlers::backup::try_handle,
    handlers::logs::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let resp = HANDLERS
        .iter()
        .find_map(|h| h(state, &req))
        .unwrap_or_else(|| {
            err(
                &req.id,
                "not_implemented",
                format!("unknown method: {}", req.method),
                None,
            )
        });
    if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = resp
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        tracing::warn!(id = %req.id, method = %req.method, code, "request failed");
    } else {
        tracing::debug!(id = %req.id, method = %req.method, "request ok");
    }
    resp
}
