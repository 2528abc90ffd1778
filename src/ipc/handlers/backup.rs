use crate::backup;
use crate::confirm::{kinds, PendingAction};
use crate::error::Error;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{parse_params, require_db, respond, to_value};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct RestoreRequestParams {
    document: Value,
}

#[derive(Deserialize)]
struct TokenParams {
    token: String,
}

fn backup_export(state: &mut AppState) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let doc = backup::export_document(conn, Utc::now()).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    tracing::info!(keys = doc.data.len(), "backup exported");
    to_value(&doc)
}

fn backup_restore_request(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    require_db(state)?;
    let p: RestoreRequestParams = parse_params(req)?;
    let doc = backup::validate_document(&p.document)?;
    let keys = backup::restorable_keys(&doc);
    let token = state
        .confirmations
        .issue(PendingAction::RestoreBackup { document: doc.clone() }, Utc::now());
    Ok(json!({
        "confirmationRequired": true,
        "token": token,
        "exportedAt": doc.meta.exported_at,
        "keys": keys,
        "message": "Restoring will overwrite the listed data in this workspace.",
    }))
}

fn backup_restore_commit(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    require_db(state)?;
    let p: TokenParams = parse_params(req)?;
    let now = Utc::now();
    let PendingAction::RestoreBackup { document } =
        state.confirmations.take(&p.token, kinds::RESTORE_BACKUP, now)?
    else {
        return Err(Error::InvalidToken.into());
    };
    let conn = require_db(state)?;
    let summary =
        backup::restore_document(conn, &document, now).map_err(|e| HandlerErr::db("db_update_failed", e))?;
    to_value(&summary)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "backup.export" => backup_export(state),
        "backup.restore.request" => backup_restore_request(state, req),
        "backup.restore.commit" => backup_restore_commit(state, req),
        _ => return None,
    };
    Some(respond(req, outcome))
}
