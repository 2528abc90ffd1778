//! Student and teacher registries.

use crate::error::{Error, Result};
use crate::model::*;
use crate::school::{new_id, School};
use crate::store::keys;
use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub father: ParentInfo,
    #[serde(default)]
    pub mother: ParentInfo,
    #[serde(default)]
    pub academic: AcademicInfo,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
}

/// Profile fields a student update may touch. Status and placement have their
/// own operations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudentPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub address: Option<Address>,
    pub father: Option<ParentInfo>,
    pub mother: Option<ParentInfo>,
    pub academic: Option<AcademicInfo>,
}

fn check_placement(school: &School, class_id: Option<&str>, section_id: Option<&str>) -> Result<()> {
    if let Some(cid) = class_id {
        if school.class(cid).is_none() {
            return Err(Error::not_found("class", cid));
        }
    }
    if let Some(sid) = section_id {
        let section = school
            .sections
            .iter()
            .find(|s| s.id == sid)
            .ok_or_else(|| Error::not_found("section", sid))?;
        if Some(section.class_id.as_str()) != class_id {
            return Err(Error::BadInput("section does not belong to the class".into()));
        }
    }
    Ok(())
}

fn non_empty(value: &str, field: &str) -> Result<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(Error::BadInput(format!("{} must not be empty", field)));
    }
    Ok(v.to_string())
}

pub fn add_student(school: &mut School, new: NewStudent) -> Result<Student> {
    let first_name = non_empty(&new.first_name, "firstName")?;
    let last_name = new.last_name.trim().to_string();
    check_placement(school, new.class_id.as_deref(), new.section_id.as_deref())?;
    let student = Student {
        id: new_id(),
        first_name,
        last_name,
        gender: new.gender,
        date_of_birth: new.date_of_birth,
        phone_number: new.phone_number,
        address: new.address,
        father: new.father,
        mother: new.mother,
        academic: new.academic,
        status: StudentStatus::Active,
        class_id: new.class_id,
        section_id: new.section_id,
    };
    school.students.push(student.clone());
    school.touch(keys::STUDENTS);
    Ok(student)
}

fn student_mut<'a>(school: &'a mut School, id: &str) -> Result<&'a mut Student> {
    school
        .students
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| Error::not_found("student", id))
}

pub fn update_student(school: &mut School, id: &str, patch: StudentPatch) -> Result<Student> {
    let first_name = match patch.first_name.as_deref() {
        Some(v) => Some(non_empty(v, "firstName")?),
        None => None,
    };
    let student = student_mut(school, id)?;
    if let Some(v) = first_name {
        student.first_name = v;
    }
    if let Some(v) = patch.last_name {
        student.last_name = v.trim().to_string();
    }
    if let Some(v) = patch.gender {
        student.gender = v;
    }
    if let Some(v) = patch.date_of_birth {
        student.date_of_birth = Some(v);
    }
    if let Some(v) = patch.phone_number {
        student.phone_number = v;
    }
    if let Some(v) = patch.address {
        student.address = v;
    }
    if let Some(v) = patch.father {
        student.father = v;
    }
    if let Some(v) = patch.mother {
        student.mother = v;
    }
    if let Some(v) = patch.academic {
        student.academic = v;
    }
    let out = student.clone();
    school.touch(keys::STUDENTS);
    Ok(out)
}

pub fn assign_student_to_section(
    school: &mut School,
    student_id: &str,
    class_id: &str,
    section_id: Option<&str>,
) -> Result<()> {
    check_placement(school, Some(class_id), section_id)?;
    let student = student_mut(school, student_id)?;
    if matches!(student.status, StudentStatus::Alumni | StudentStatus::Withdrawn) {
        return Err(Error::InvalidState(format!(
            "cannot place a {:?} student",
            student.status
        )));
    }
    student.class_id = Some(class_id.to_string());
    student.section_id = section_id.map(str::to_string);
    school.touch(keys::STUDENTS);
    Ok(())
}

/// Active and Inactive flip freely; Withdrawn is terminal; Alumni comes only
/// from promotion.
pub fn status_transition_allowed(from: StudentStatus, to: StudentStatus) -> bool {
    use StudentStatus::*;
    matches!(
        (from, to),
        (Active, Inactive) | (Inactive, Active) | (Active, Withdrawn) | (Inactive, Withdrawn)
    )
}

pub fn update_student_status(school: &mut School, id: &str, status: StudentStatus) -> Result<()> {
    let student = student_mut(school, id)?;
    if student.status == status {
        return Ok(());
    }
    if !status_transition_allowed(student.status, status) {
        return Err(Error::InvalidState(format!(
            "student status cannot change from {:?} to {:?}",
            student.status, status
        )));
    }
    student.status = status;
    school.touch(keys::STUDENTS);
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date_of_joining: Option<NaiveDate>,
    #[serde(default)]
    pub qualification: String,
    #[serde(default)]
    pub subjects: Vec<String>,
}

pub fn add_teacher(school: &mut School, new: NewTeacher) -> Result<Teacher> {
    let teacher = Teacher {
        id: new_id(),
        first_name: non_empty(&new.first_name, "firstName")?,
        last_name: new.last_name.trim().to_string(),
        phone: new.phone,
        email: new.email,
        date_of_joining: new.date_of_joining,
        qualification: new.qualification,
        subjects: new.subjects,
        status: TeacherStatus::Active,
        current_class: None,
    };
    school.teachers.push(teacher.clone());
    school.touch(keys::TEACHERS);
    Ok(teacher)
}

fn teacher_mut<'a>(school: &'a mut School, id: &str) -> Result<&'a mut Teacher> {
    school
        .teachers
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| Error::not_found("teacher", id))
}

pub fn update_teacher_status(school: &mut School, id: &str, status: TeacherStatus) -> Result<()> {
    let teacher = teacher_mut(school, id)?;
    if teacher.status != status {
        teacher.status = status;
        school.touch(keys::TEACHERS);
    }
    Ok(())
}

pub fn assign_teacher_class(
    school: &mut School,
    id: &str,
    assignment: Option<ClassAssignment>,
) -> Result<()> {
    if let Some(a) = assignment.as_ref() {
        check_placement(school, Some(&a.class_id), a.section_id.as_deref())?;
    }
    let teacher = teacher_mut(school, id)?;
    teacher.current_class = assignment;
    school.touch(keys::TEACHERS);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::{add_section, class_by_name};

    fn school() -> School {
        School::seeded(NaiveDate::from_ymd_opt(2025, 6, 1).expect("date"))
    }

    fn new_student(class_id: Option<String>) -> NewStudent {
        NewStudent {
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            gender: Gender::Female,
            date_of_birth: None,
            phone_number: String::new(),
            address: Address::default(),
            father: ParentInfo::default(),
            mother: ParentInfo::default(),
            academic: AcademicInfo::default(),
            class_id,
            section_id: None,
        }
    }

    #[test]
    fn status_lifecycle() {
        let mut s = school();
        let id = add_student(&mut s, new_student(None)).expect("add").id;
        update_student_status(&mut s, &id, StudentStatus::Inactive).expect("deactivate");
        update_student_status(&mut s, &id, StudentStatus::Active).expect("reactivate");
        assert!(matches!(
            update_student_status(&mut s, &id, StudentStatus::Alumni),
            Err(Error::InvalidState(_))
        ));
        update_student_status(&mut s, &id, StudentStatus::Withdrawn).expect("withdraw");
        assert!(matches!(
            update_student_status(&mut s, &id, StudentStatus::Active),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn section_must_match_class() {
        let mut s = school();
        let c5 = class_by_name(&s, "5").expect("5").id.clone();
        let c6 = class_by_name(&s, "6").expect("6").id.clone();
        let sec = add_section(&mut s, &c5, "A").expect("section");
        let id = add_student(&mut s, new_student(Some(c5.clone()))).expect("add").id;

        assert!(matches!(
            assign_student_to_section(&mut s, &id, &c6, Some(&sec.id)),
            Err(Error::BadInput(_))
        ));
        assign_student_to_section(&mut s, &id, &c5, Some(&sec.id)).expect("assign");
        assert_eq!(s.student(&id).and_then(|st| st.section_id.clone()), Some(sec.id));
    }

    #[test]
    fn update_rejects_blank_first_name() {
        let mut s = school();
        let id = add_student(&mut s, new_student(None)).expect("add").id;
        let patch = StudentPatch {
            first_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(update_student(&mut s, &id, patch), Err(Error::BadInput(_))));
        let patch = StudentPatch {
            phone_number: Some("98450 00000".into()),
            ..Default::default()
        };
        let st = update_student(&mut s, &id, patch).expect("update");
        assert_eq!(st.phone_number, "98450 00000");
        assert_eq!(st.first_name, "Asha");
    }
}
