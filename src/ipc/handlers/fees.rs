use crate::error::Error;
use crate::fees;
use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    class_id: Option<String>,
    #[serde(default)]
    academic_year: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    class_id: String,
    #[serde(default)]
    academic_year: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddComponentParams {
    fee_structure_id: String,
    name: String,
    amount: f64,
    #[serde(default = "default_mandatory")]
    mandatory: bool,
}

fn default_mandatory() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveComponentParams {
    fee_structure_id: String,
    component_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructureParams {
    fee_structure_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveParams {
    class_id: String,
    #[serde(default)]
    academic_year: Option<String>,
}

fn handle_fees_list(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: ListParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let rows: Vec<_> = school
            .fee_structures
            .iter()
            .filter(|fs| fs.academic_year == year)
            .filter(|fs| p.class_id.as_deref().map(|c| c == fs.class_id).unwrap_or(true))
            .collect();
        Ok(json!({ "academicYear": year, "feeStructures": to_value(&rows)? }))
    })
}

fn handle_fees_create(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: CreateParams = parse_params(req)?;
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let fs = fees::create_fee_structure(school, &p.class_id, &year, now)?;
        Ok(json!({ "feeStructure": to_value(&fs)? }))
    })
}

fn handle_fees_add_component(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: AddComponentParams = parse_params(req)?;
        let c = fees::add_fee_component(school, &p.fee_structure_id, &p.name, p.amount, p.mandatory)?;
        Ok(json!({ "component": to_value(&c)? }))
    })
}

fn handle_fees_remove_component(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: RemoveComponentParams = parse_params(req)?;
        fees::remove_fee_component(school, &p.fee_structure_id, &p.component_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_fees_activate(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: StructureParams = parse_params(req)?;
        let report = fees::activate_fee_structure(school, &p.fee_structure_id, now)?;
        Ok(json!({ "activation": to_value(&report)? }))
    })
}

fn handle_fees_active(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: ActiveParams = parse_params(req)?;
        if school.class(&p.class_id).is_none() {
            return Err(Error::not_found("class", &p.class_id).into());
        }
        let year = p.academic_year.unwrap_or_else(|| school.academic_year.clone());
        let fs = fees::active_fee_structure(school, &p.class_id, &year);
        Ok(json!({ "feeStructure": to_value(&fs)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "fees.list" => Some(handle_fees_list(state, req)),
        "fees.create" => Some(handle_fees_create(state, req)),
        "fees.addComponent" => Some(handle_fees_add_component(state, req)),
        "fees.removeComponent" => Some(handle_fees_remove_component(state, req)),
        "fees.activate" => Some(handle_fees_activate(state, req)),
        "fees.active" => Some(handle_fees_active(state, req)),
        _ => None,
    }
}
