//! Fixed class vocabulary and sections.

use crate::error::{Error, Result};
use crate::model::{Section, SchoolClass, TeacherStatus};
use crate::school::{new_id, School};
use crate::store::keys;
use std::collections::BTreeMap;

pub const FIXED_CLASSES: [&str; 16] = [
    "Playgroup", "Nursery", "LKG", "UKG", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11",
    "12",
];

pub fn class_rank(name: &str) -> Option<usize> {
    FIXED_CLASSES.iter().position(|n| *n == name)
}

/// Result of `ensure_fixed_classes`.
#[derive(Debug, Default, PartialEq)]
pub struct ClassFixup {
    pub changed: bool,
    /// Dropped duplicate id -> id of the record kept for that name.
    pub remap: BTreeMap<String, String>,
}

/// Deduplicates by name, fills in missing fixed classes and puts the list in
/// vocabulary order. Names outside the vocabulary are kept at the end. The
/// first record for a name wins; callers must rewrite references to the ids
/// listed in `remap`.
pub fn ensure_fixed_classes(classes: &mut Vec<SchoolClass>) -> ClassFixup {
    let mut out: Vec<SchoolClass> = Vec::with_capacity(FIXED_CLASSES.len());
    for name in FIXED_CLASSES {
        match classes.iter().find(|c| c.name == name) {
            Some(c) => out.push(c.clone()),
            None => out.push(SchoolClass {
                id: new_id(),
                name: name.to_string(),
            }),
        }
    }
    for c in classes.iter() {
        if class_rank(&c.name).is_none() && !out.iter().any(|o| o.name == c.name) {
            out.push(c.clone());
        }
    }
    let mut remap = BTreeMap::new();
    for c in classes.iter() {
        if let Some(kept) = out.iter().find(|o| o.name == c.name && o.id != c.id) {
            remap.insert(c.id.clone(), kept.id.clone());
        }
    }
    let changed = out != *classes;
    if changed {
        *classes = out;
    }
    ClassFixup { changed, remap }
}

pub fn class_by_name<'a>(school: &'a School, name: &str) -> Option<&'a SchoolClass> {
    school.classes.iter().find(|c| c.name == name)
}

pub fn sections_for_class<'a>(school: &'a School, class_id: &str) -> Vec<&'a Section> {
    school.sections.iter().filter(|s| s.class_id == class_id).collect()
}

pub fn add_section(school: &mut School, class_id: &str, name: &str) -> Result<Section> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadInput("section name must not be empty".into()));
    }
    if school.class(class_id).is_none() {
        return Err(Error::not_found("class", class_id));
    }
    if school
        .sections
        .iter()
        .any(|s| s.class_id == class_id && s.name.eq_ignore_ascii_case(name))
    {
        return Err(Error::AlreadyExists(format!("section {} already exists in class", name)));
    }
    let section = Section {
        id: new_id(),
        class_id: class_id.to_string(),
        name: name.to_string(),
        homeroom_teacher_id: None,
    };
    school.sections.push(section.clone());
    school.touch(keys::SECTIONS);
    Ok(section)
}

pub fn assign_homeroom_teacher(school: &mut School, section_id: &str, teacher_id: &str) -> Result<()> {
    let teacher = school
        .teacher(teacher_id)
        .ok_or_else(|| Error::not_found("teacher", teacher_id))?;
    if teacher.status != TeacherStatus::Active {
        return Err(Error::InvalidState("only active teachers can lead a section".into()));
    }
    let section = school
        .sections
        .iter_mut()
        .find(|s| s.id == section_id)
        .ok_or_else(|| Error::not_found("section", section_id))?;
    section.homeroom_teacher_id = Some(teacher_id.to_string());
    school.touch(keys::SECTIONS);
    Ok(())
}
