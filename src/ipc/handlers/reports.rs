use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use crate::reports::{self, Period};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YearParams {
    #[serde(default)]
    academic_year: Option<String>,
    #[serde(default)]
    class_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeriodParams {
    #[serde(default)]
    academic_year: Option<String>,
    #[serde(default = "yearly")]
    period: Period,
}

fn yearly() -> Period {
    Period::Yearly
}

fn handle_outstanding_dues(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: YearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        to_value(&reports::outstanding_dues(school, &year, p.class_id.as_deref(), now)?)
    })
}

fn handle_class_fee_summary(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: YearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        to_value(&reports::class_fee_summary(school, &year, now)?)
    })
}

fn handle_income_expense(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: PeriodParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        to_value(&reports::income_vs_expense(school, &year, &p.period, now)?)
    })
}

fn handle_expense_breakdown(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: PeriodParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        to_value(&reports::expense_breakdown(school, &year, &p.period, now)?)
    })
}

fn handle_year_end(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: YearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        to_value(&reports::year_end_statement(school, &year, now)?)
    })
}

fn handle_promotion_summary(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: YearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        to_value(&reports::promotion_summary(school, &year, now)?)
    })
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: YearParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        to_value(&reports::dashboard(school, &year)?)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.outstandingDues" => Some(handle_outstanding_dues(state, req)),
        "reports.classFeeSummary" => Some(handle_class_fee_summary(state, req)),
        "reports.incomeExpense" => Some(handle_income_expense(state, req)),
        "reports.expenseBreakdown" => Some(handle_expense_breakdown(state, req)),
        "reports.yearEnd" => Some(handle_year_end(state, req)),
        "reports.promotionSummary" => Some(handle_promotion_summary(state, req)),
        "reports.dashboard" => Some(handle_dashboard(state, req)),
        _ => None,
    }
}
