use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClassAssignment, TeacherStatus};
use crate::people::{self, NewTeacher};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusParams {
    teacher_id: String,
    status: TeacherStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignParams {
    teacher_id: String,
    #[serde(default)]
    class_id: Option<String>,
    #[serde(default)]
    section_id: Option<String>,
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        Ok(json!({ "teachers": to_value(&school.teachers)? }))
    })
}

fn handle_teachers_add(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let new: NewTeacher = parse_params(req)?;
        let teacher = people::add_teacher(school, new)?;
        Ok(json!({ "teacher": to_value(&teacher)? }))
    })
}

fn handle_teachers_set_status(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: StatusParams = parse_params(req)?;
        people::update_teacher_status(school, &p.teacher_id, p.status)?;
        Ok(json!({ "ok": true }))
    })
}

/// Omitting `classId` clears the assignment.
fn handle_teachers_assign_class(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: AssignParams = parse_params(req)?;
        let assignment = p.class_id.map(|class_id| ClassAssignment {
            class_id,
            section_id: p.section_id,
        });
        people::assign_teacher_class(school, &p.teacher_id, assignment)?;
        Ok(json!({ "ok": true }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.add" => Some(handle_teachers_add(state, req)),
        "teachers.setStatus" => Some(handle_teachers_set_status(state, req)),
        "teachers.assignClass" => Some(handle_teachers_assign_class(state, req)),
        _ => None,
    }
}
