use crate::error::Error;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, NewAdjustment, NewPayment};
use crate::model::ComponentSnapshot;
use crate::school::School;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerInput {
    student_id: String,
    class_id: String,
    #[serde(default)]
    academic_year: Option<String>,
    base_components: Vec<ComponentSnapshot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentYearParams {
    student_id: String,
    #[serde(default)]
    academic_year: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerIdParams {
    ledger_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptParams {
    payment_id: String,
    #[serde(default)]
    academic_year: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    academic_year: Option<String>,
    #[serde(default)]
    class_id: Option<String>,
}

/// Shared checks for `ledger.create` and `ledger.upsert`.
fn check_input(school: &School, p: &LedgerInput) -> Result<(), HandlerErr> {
    if school.student(&p.student_id).is_none() {
        return Err(Error::not_found("student", &p.student_id).into());
    }
    if school.class(&p.class_id).is_none() {
        return Err(Error::not_found("class", &p.class_id).into());
    }
    ledger::check_components(&p.base_components)?;
    Ok(())
}

fn handle_ledger_create(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: LedgerInput = parse_params(req)?;
        check_input(school, &p)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let l = ledger::create_ledger(school, &p.student_id, &p.class_id, &year, p.base_components, now)?;
        Ok(json!({ "ledger": to_value(&l)? }))
    })
}

fn handle_ledger_upsert(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: LedgerInput = parse_params(req)?;
        check_input(school, &p)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let outcome = ledger::upsert_ledger_from_fee_structure(
            school,
            &p.student_id,
            &p.class_id,
            &year,
            p.base_components,
            now,
        );
        Ok(json!({
            "outcome": outcome,
            "ledger": to_value(&ledger::ledger_by_student_year(school, &p.student_id, &year))?,
        }))
    })
}

fn handle_ledger_sync(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: StudentYearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let outcome = ledger::sync_student_ledger(school, &p.student_id, &year, now)?;
        Ok(json!({ "outcome": outcome }))
    })
}

fn handle_ledger_by_student_year(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: StudentYearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let Some(l) = ledger::ledger_by_student_year(school, &p.student_id, &year) else {
            return Ok(json!({ "ledger": null, "summary": null }));
        };
        let summary = ledger::ledger_summary(school, &l.id)?;
        Ok(json!({ "ledger": to_value(l)?, "summary": to_value(&summary)? }))
    })
}

fn handle_ledger_list(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: ListParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let mut rows = Vec::new();
        for l in school
            .ledgers
            .iter()
            .filter(|l| l.academic_year == year)
            .filter(|l| p.class_id.as_deref().map(|c| c == l.class_id).unwrap_or(true))
        {
            let summary = ledger::ledger_summary(school, &l.id)?;
            rows.push(json!({
                "ledger": to_value(l)?,
                "studentName": school.student(&l.student_id).map(|s| s.display_name()),
                "summary": to_value(&summary)?,
            }));
        }
        Ok(json!({ "academicYear": year, "ledgers": rows }))
    })
}

fn handle_ledger_summary(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: LedgerIdParams = parse_params(req)?;
        let summary = ledger::ledger_summary(school, &p.ledger_id)?;
        to_value(&summary)
    })
}

fn handle_ledger_statement(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: LedgerIdParams = parse_params(req)?;
        let st = ledger::statement(school, &p.ledger_id)?;
        to_value(&st)
    })
}

fn handle_adjustment_add(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let new: NewAdjustment = parse_params(req)?;
        let ledger_id = new.ledger_id.clone();
        let adjustment = ledger::add_adjustment(school, new, now)?;
        let summary = ledger::ledger_summary(school, &ledger_id)?;
        Ok(json!({
            "adjustment": to_value(&adjustment)?,
            "summary": to_value(&summary)?,
        }))
    })
}

fn handle_payment_add(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let new: NewPayment = parse_params(req)?;
        let payment = ledger::add_payment(school, new, now)?;
        let receipt_number = ledger::receipt_number(school, &payment.id, None)?;
        let summary = ledger::ledger_summary(school, &payment.ledger_id)?;
        Ok(json!({
            "payment": to_value(&payment)?,
            "receiptNumber": receipt_number,
            "summary": to_value(&summary)?,
        }))
    })
}

fn handle_receipt(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: ReceiptParams = parse_params(req)?;
        let receipt_number = ledger::receipt_number(school, &p.payment_id, p.academic_year.as_deref())?;
        Ok(json!({ "receiptNumber": receipt_number }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "ledger.create" => Some(handle_ledger_create(state, req)),
        "ledger.upsert" => Some(handle_ledger_upsert(state, req)),
        "ledger.sync" => Some(handle_ledger_sync(state, req)),
        "ledger.byStudentYear" => Some(handle_ledger_by_student_year(state, req)),
        "ledger.list" => Some(handle_ledger_list(state, req)),
        "ledger.summary" => Some(handle_ledger_summary(state, req)),
        "ledger.statement" => Some(handle_ledger_statement(state, req)),
        "ledger.adjustment.add" => Some(handle_adjustment_add(state, req)),
        "ledger.payment.add" => Some(handle_payment_add(state, req)),
        "ledger.receipt" => Some(handle_receipt(state, req)),
        _ => None,
    }
}
