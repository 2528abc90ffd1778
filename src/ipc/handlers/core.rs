use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{parse_params, respond};
use crate::ipc::types::{AppState, Request};
use crate::promotion;
use crate::school::School;
use crate::store;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        req,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        })),
    )
}

#[derive(Deserialize)]
struct SelectParams {
    path: PathBuf,
}

/// Opens (or creates) the workspace database, seeds missing keys and consumes
/// any auto-promotion left behind by an interrupted year close.
pub fn open_workspace(state: &mut AppState, path: &Path) -> Result<serde_json::Value, HandlerErr> {
    let conn = store::open_db(path).map_err(|e| HandlerErr::db("db_open_failed", e))?;
    let now = Utc::now();
    let mut school =
        School::load(&conn, now.date_naive()).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let auto_promotion = promotion::run_pending(&mut school, now)?;
    if school.is_dirty() {
        school
            .commit(&conn)
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    tracing::info!(workspace = %path.display(), academic_year = %school.academic_year, "workspace opened");

    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.confirmations.clear();
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "academicYear": school.academic_year,
        "autoPromotion": auto_promotion,
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let outcome = parse_params::<SelectParams>(req).and_then(|p| open_workspace(state, &p.path));
    respond(req, outcome)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
