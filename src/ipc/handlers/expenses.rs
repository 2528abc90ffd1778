use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, NewExpense};
use crate::model::ExpenseCategory;
use crate::years;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    academic_year: Option<String>,
    #[serde(default)]
    category: Option<ExpenseCategory>,
}

fn handle_expenses_add(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let new: NewExpense = parse_params(req)?;
        let expense = ledger::add_expense(school, new, now)?;
        Ok(json!({
            "expense": to_value(&expense)?,
            "academicYear": years::academic_year_for_date(expense.expense_date),
        }))
    })
}

/// Newest expense date first.
fn handle_expenses_list(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: ListParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let mut rows: Vec<_> = school
            .expenses
            .iter()
            .filter(|e| years::academic_year_for_date(e.expense_date) == year)
            .filter(|e| p.category.map(|c| c == e.category).unwrap_or(true))
            .collect();
        rows.sort_by(|a, b| {
            b.expense_date
                .cmp(&a.expense_date)
                .then_with(|| b.recorded_at.cmp(&a.recorded_at))
        });
        let total: f64 = rows.iter().map(|e| e.amount).sum();
        Ok(json!({ "academicYear": year, "expenses": to_value(&rows)?, "total": total }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "expenses.add" => Some(handle_expenses_add(state, req)),
        "expenses.list" => Some(handle_expenses_list(state, req)),
        _ => None,
    }
}
