use crate::error::Error;
use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentStatus;
use crate::people::{self, NewStudent, StudentPatch};
use crate::promotion;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    class_id: Option<String>,
    #[serde(default)]
    section_id: Option<String>,
    #[serde(default)]
    status: Option<StudentStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentIdParams {
    student_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    student_id: String,
    patch: StudentPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignParams {
    student_id: String,
    class_id: String,
    #[serde(default)]
    section_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusParams {
    student_id: String,
    status: StudentStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromoteParams {
    student_id: String,
    #[serde(default)]
    from_year: Option<String>,
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: ListParams = parse_params(req)?;
        let rows: Vec<_> = school
            .students
            .iter()
            .filter(|s| p.class_id.is_none() || s.class_id == p.class_id)
            .filter(|s| p.section_id.is_none() || s.section_id == p.section_id)
            .filter(|s| p.status.map(|st| st == s.status).unwrap_or(true))
            .collect();
        Ok(json!({ "students": to_value(&rows)? }))
    })
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: StudentIdParams = parse_params(req)?;
        let student = school
            .student(&p.student_id)
            .ok_or_else(|| Error::not_found("student", &p.student_id))?;
        Ok(json!({ "student": to_value(student)? }))
    })
}

fn handle_students_add(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let new: NewStudent = parse_params(req)?;
        let student = people::add_student(school, new)?;
        Ok(json!({ "student": to_value(&student)? }))
    })
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: UpdateParams = parse_params(req)?;
        let student = people::update_student(school, &p.student_id, p.patch)?;
        Ok(json!({ "student": to_value(&student)? }))
    })
}

fn handle_students_assign_section(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: AssignParams = parse_params(req)?;
        people::assign_student_to_section(school, &p.student_id, &p.class_id, p.section_id.as_deref())?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_students_set_status(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: StatusParams = parse_params(req)?;
        people::update_student_status(school, &p.student_id, p.status)?;
        Ok(json!({ "ok": true, "status": p.status }))
    })
}

fn handle_students_promote(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, now| {
        let p: PromoteParams = parse_params(req)?;
        let from_year = p.from_year.unwrap_or_else(|| school.academic_year.clone());
        let r = promotion::promote_student(school, &p.student_id, &from_year, now)?;
        Ok(json!({
            "classId": r.class_id,
            "nextYear": r.next_year,
            "ledger": r.ledger,
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.add" => Some(handle_students_add(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.assignSection" => Some(handle_students_assign_section(state, req)),
        "students.setStatus" => Some(handle_students_set_status(state, req)),
        "students.promote" => Some(handle_students_promote(state, req)),
        _ => None,
    }
}
