use crate::confirm::{kinds, PendingAction};
use crate::error::Error;
use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentStatus;
use crate::promotion::{self, NextStep};
use crate::years;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YearParams {
    #[serde(default)]
    academic_year: Option<String>,
}

#[derive(Deserialize)]
struct TokenParams {
    token: String,
}

/// Previews the run and hands out a confirmation token.
fn handle_promotion_request(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, confirmations, now| {
        let p: YearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        if years::year_meta(school, &year).is_none() {
            return Err(Error::not_found("academic year", &year).into());
        }
        if years::is_promotion_locked(school, &year) {
            return Err(Error::AlreadyLocked(year).into());
        }
        let (mut promote, mut graduate, mut skip) = (0usize, 0usize, 0usize);
        for s in school.students.iter().filter(|s| s.status == StudentStatus::Active) {
            match s.class_id.as_deref().map(|c| promotion::next_step(school, c)) {
                Some(NextStep::Promote(_)) => promote += 1,
                Some(NextStep::Graduate) => graduate += 1,
                Some(NextStep::Skip) | None => skip += 1,
            }
        }
        let token = confirmations.issue(PendingAction::BulkPromotion { year: year.clone() }, now);
        Ok(json!({
            "confirmationRequired": true,
            "token": token,
            "academicYear": year,
            "preview": {
                "toPromote": promote,
                "toGraduate": graduate,
                "skipped": skip,
            },
        }))
    })
}

fn handle_promotion_commit(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, confirmations, now| {
        let p: TokenParams = parse_params(req)?;
        let PendingAction::BulkPromotion { year } = confirmations.take(&p.token, kinds::BULK_PROMOTION, now)? else {
            return Err(Error::InvalidToken.into());
        };
        let summary = promotion::promote(school, &year, now)?;
        Ok(json!({ "academicYear": year, "summary": to_value(&summary)? }))
    })
}

fn handle_promotion_summary(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: YearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        Ok(json!({
            "academicYear": year,
            "locked": years::is_promotion_locked(school, &year),
            "summary": to_value(&years::promotion_summary(school, &year))?,
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "promotion.request" => Some(handle_promotion_request(state, req)),
        "promotion.commit" => Some(handle_promotion_commit(state, req)),
        "promotion.summary" => Some(handle_promotion_summary(state, req)),
        _ => None,
    }
}
