use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    limit: Option<usize>,
}

fn handle_logs_list(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: ListParams = parse_params(req)?;
        // Entries written in the same request share a timestamp; later ones
        // still come first.
        let mut rows: Vec<_> = school.system_logs.iter().rev().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = p.limit {
            rows.truncate(limit);
        }
        Ok(json!({ "logs": to_value(&rows)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "logs.list" => Some(handle_logs_list(state, req)),
        _ => None,
    }
}
