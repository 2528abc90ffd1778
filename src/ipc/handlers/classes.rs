use crate::classes;
use crate::ipc::helpers::{parse_params, to_value, with_school};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddSectionParams {
    class_id: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignTeacherParams {
    section_id: String,
    teacher_id: String,
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let rows: Vec<Value> = school
            .classes
            .iter()
            .map(|c| {
                let students = school
                    .students
                    .iter()
                    .filter(|s| s.class_id.as_deref() == Some(c.id.as_str()))
                    .count();
                json!({
                    "id": c.id,
                    "name": c.name,
                    "studentCount": students,
                    "sections": classes::sections_for_class(school, &c.id),
                })
            })
            .collect();
        Ok(json!({ "classes": rows }))
    })
}

fn handle_sections_add(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: AddSectionParams = parse_params(req)?;
        let section = classes::add_section(school, &p.class_id, &p.name)?;
        Ok(json!({ "section": to_value(&section)? }))
    })
}

fn handle_sections_assign_teacher(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let p: AssignTeacherParams = parse_params(req)?;
        classes::assign_homeroom_teacher(school, &p.section_id, &p.teacher_id)?;
        Ok(json!({ "ok": true }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "sections.add" => Some(handle_sections_add(state, req)),
        "sections.assignTeacher" => Some(handle_sections_assign_teacher(state, req)),
        _ => None,
    }
}
