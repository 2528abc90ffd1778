use super::error::{ok, HandlerErr};
use super::types::{AppState, Request};
use crate::confirm::Confirmations;
use crate::school::School;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Deserializes `params` into a typed struct. Missing params read as `{}`.
pub fn parse_params<T: DeserializeOwned>(req: &Request) -> Result<T, HandlerErr> {
    let params = if req.params.is_null() {
        Value::Object(Default::default())
    } else {
        req.params.clone()
    };
    serde_json::from_value(params)
        .map_err(|e| HandlerErr::bad_params(format!("invalid params for {}: {}", req.method, e)))
}

pub fn to_value<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

pub fn respond(req: &Request, outcome: Result<Value, HandlerErr>) -> Value {
    match outcome {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or_else(HandlerErr::no_workspace)
}

/// Loads the workspace state, runs `f` against it and commits every touched
/// key in one transaction. Nothing is written when `f` fails.
pub fn with_school<F>(state: &mut AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&mut School, &mut Confirmations, DateTime<Utc>) -> Result<Value, HandlerErr>,
{
    respond(req, run_with_school(state, f))
}

fn run_with_school<F>(state: &mut AppState, f: F) -> Result<Value, HandlerErr>
where
    F: FnOnce(&mut School, &mut Confirmations, DateTime<Utc>) -> Result<Value, HandlerErr>,
{
    let AppState {
        db, confirmations, ..
    } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let now = Utc::now();
    let mut school =
        School::load(conn, now.date_naive()).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let result = f(&mut school, confirmations, now)?;
    if school.is_dirty() {
        let written = school
            .commit(conn)
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
        tracing::debug!(keys = ?written, "state committed");
    }
    Ok(result)
}
