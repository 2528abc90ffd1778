use crate::confirm::{kinds, PendingAction};
use crate::error::Error;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{parse_params, with_school};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentStatus;
use crate::promotion;
use crate::years::{self, CloseStep};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct YearParams {
    year: String,
}

#[derive(Deserialize)]
struct TokenParams {
    token: String,
}

fn handle_years_list(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let rows: Vec<Value> = school
            .year_meta
            .iter()
            .map(|m| {
                json!({
                    "year": m.year,
                    "status": m.status,
                    "closedAt": m.closed_at,
                    "promotionLocked": years::is_promotion_locked(school, &m.year),
                    "promotionSummary": years::promotion_summary(school, &m.year),
                })
            })
            .collect();
        Ok(json!({
            "current": school.academic_year,
            "years": rows,
        }))
    })
}

fn handle_years_select(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: YearParams = parse_params(req)?;
        years::select_year(school, &p.year)?;
        Ok(json!({ "current": school.academic_year }))
    })
}

fn handle_years_close(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, confirmations, now| {
        let p: YearParams = parse_params(req)?;
        match years::begin_close(school, &p.year, now)? {
            CloseStep::Closed => Ok(json!({ "closed": true, "year": p.year })),
            CloseStep::NeedsConfirmation => {
                let eligible = school
                    .students
                    .iter()
                    .filter(|s| s.status == StudentStatus::Active && s.class_id.is_some())
                    .count();
                let token = confirmations.issue(PendingAction::CloseYear { year: p.year.clone() }, now);
                Ok(json!({
                    "confirmationRequired": true,
                    "token": token,
                    "year": p.year,
                    "activeStudents": eligible,
                    "message": format!(
                        "Closing {} will promote all active students and cannot be undone.",
                        p.year
                    ),
                }))
            }
        }
    })
}

fn handle_years_close_commit(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, confirmations, now| {
        let p: TokenParams = parse_params(req)?;
        let PendingAction::CloseYear { year } = confirmations.take(&p.token, kinds::CLOSE_YEAR, now)? else {
            return Err(HandlerErr::from(Error::InvalidToken));
        };
        years::commit_close(school, &year, now)?;
        let promotion = promotion::run_pending(school, now)?;
        Ok(json!({
            "closed": true,
            "year": year,
            "promotion": promotion,
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "years.list" => Some(handle_years_list(state, req)),
        "years.select" => Some(handle_years_select(state, req)),
        "years.close" => Some(handle_years_close(state, req)),
        "years.close.commit" => Some(handle_years_close_commit(state, req)),
        _ => None,
    }
}
