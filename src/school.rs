//! In-memory view of a workspace. Requests load it, domain functions mutate it,
//! and the handler commits every touched key in one store transaction.

use crate::classes;
use crate::config::Settings;
use crate::model::*;
use crate::store::{self, keys};
use crate::years;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct School {
    pub academic_year: String,
    pub year_meta: Vec<AcademicYearMeta>,
    pub promotion_locked: BTreeMap<String, bool>,
    pub promotion_summary: BTreeMap<String, PromotionSummary>,
    pub auto_promotion_request: Option<AutoPromotionRequest>,
    pub classes: Vec<SchoolClass>,
    pub sections: Vec<Section>,
    pub students: Vec<Student>,
    pub teachers: Vec<Teacher>,
    pub fee_structures: Vec<FeeStructure>,
    pub ledgers: Vec<FeeLedger>,
    pub adjustments: Vec<LedgerAdjustment>,
    pub payments: Vec<Payment>,
    pub expenses: Vec<Expense>,
    pub system_logs: Vec<SystemLog>,
    pub settings: Settings,
    dirty: BTreeSet<&'static str>,
}

impl School {
    /// Fresh workspace state: rolling year window and the fixed class list.
    pub fn seeded(today: NaiveDate) -> Self {
        let mut school = School {
            academic_year: years::academic_year_for_date(today),
            year_meta: years::initial_year_meta(today),
            promotion_locked: BTreeMap::new(),
            promotion_summary: BTreeMap::new(),
            auto_promotion_request: None,
            classes: Vec::new(),
            sections: Vec::new(),
            students: Vec::new(),
            teachers: Vec::new(),
            fee_structures: Vec::new(),
            ledgers: Vec::new(),
            adjustments: Vec::new(),
            payments: Vec::new(),
            expenses: Vec::new(),
            system_logs: Vec::new(),
            settings: Settings::default(),
            dirty: BTreeSet::new(),
        };
        school.normalize();
        school
    }

    pub fn load(conn: &Connection, today: NaiveDate) -> anyhow::Result<Self> {
        let defaults = School::seeded(today);
        let mut school = School {
            academic_year: store::load_or(conn, keys::ACADEMIC_YEAR, defaults.academic_year)?,
            year_meta: store::load_or(conn, keys::ACADEMIC_YEAR_META, defaults.year_meta)?,
            promotion_locked: store::load_or(conn, keys::PROMOTION_LOCKED, BTreeMap::new())?,
            promotion_summary: store::load_or(conn, keys::PROMOTION_SUMMARY, BTreeMap::new())?,
            auto_promotion_request: store::load_or(conn, keys::AUTO_PROMOTION_REQUEST, None)?,
            classes: store::load_or(conn, keys::CLASSES, defaults.classes)?,
            sections: store::load_or(conn, keys::SECTIONS, Vec::new())?,
            students: store::load_or(conn, keys::STUDENTS, Vec::new())?,
            teachers: store::load_or(conn, keys::TEACHERS, Vec::new())?,
            fee_structures: store::load_or(conn, keys::FEE_STRUCTURES, Vec::new())?,
            ledgers: store::load_or(conn, keys::LEDGERS, Vec::new())?,
            adjustments: store::load_or(conn, keys::ADJUSTMENTS, Vec::new())?,
            payments: store::load_or(conn, keys::PAYMENTS, Vec::new())?,
            expenses: store::load_or(conn, keys::EXPENSES, Vec::new())?,
            system_logs: store::load_or(conn, keys::SYSTEM_LOGS, Vec::new())?,
            settings: store::load_or(conn, keys::SETTINGS, Settings::default())?,
            dirty: BTreeSet::new(),
        };
        for key in [keys::ACADEMIC_YEAR_META, keys::CLASSES] {
            if store::get_raw(conn, key)?.is_none() {
                school.touch(key);
            }
        }
        school.normalize();
        Ok(school)
    }

    fn normalize(&mut self) {
        let fixup = classes::ensure_fixed_classes(&mut self.classes);
        if fixup.changed {
            self.touch(keys::CLASSES);
        }
        if !fixup.remap.is_empty() {
            self.remap_class_ids(&fixup.remap);
        }
        if years::ensure_open_window(&mut self.year_meta) {
            self.touch(keys::ACADEMIC_YEAR_META);
        }
    }

    /// Points every class reference at the surviving record after duplicate
    /// classes were merged.
    fn remap_class_ids(&mut self, remap: &BTreeMap<String, String>) {
        let swap = |id: &mut String| match remap.get(id.as_str()) {
            Some(kept) => {
                *id = kept.clone();
                true
            }
            None => false,
        };
        let mut students = false;
        for s in self.students.iter_mut() {
            if let Some(id) = s.class_id.as_mut() {
                students |= swap(id);
            }
        }
        let mut teachers = false;
        for t in self.teachers.iter_mut() {
            if let Some(a) = t.current_class.as_mut() {
                teachers |= swap(&mut a.class_id);
            }
        }
        let mut sections = false;
        for sec in self.sections.iter_mut() {
            sections |= swap(&mut sec.class_id);
        }
        let mut fee_structures = false;
        for fs in self.fee_structures.iter_mut() {
            fee_structures |= swap(&mut fs.class_id);
        }
        let mut ledgers = false;
        for l in self.ledgers.iter_mut() {
            ledgers |= swap(&mut l.class_id);
        }

        for (key, hit) in [
            (keys::STUDENTS, students),
            (keys::TEACHERS, teachers),
            (keys::SECTIONS, sections),
            (keys::FEE_STRUCTURES, fee_structures),
            (keys::LEDGERS, ledgers),
        ] {
            if hit {
                self.touch(key);
            }
        }
        tracing::warn!(merged = remap.len(), "duplicate classes merged");
    }

    pub fn touch(&mut self, key: &'static str) {
        self.dirty.insert(key);
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Writes all touched keys in one transaction and returns them.
    pub fn commit(&mut self, conn: &Connection) -> anyhow::Result<Vec<&'static str>> {
        let mut entries: Vec<(&str, serde_json::Value)> = Vec::new();
        for key in &self.dirty {
            entries.push((*key, self.value_for(key)?));
        }
        store::write_batch(conn, &entries)?;
        let written: Vec<&'static str> = std::mem::take(&mut self.dirty).into_iter().collect();
        Ok(written)
    }

    fn value_for(&self, key: &str) -> anyhow::Result<serde_json::Value> {
        let v = match key {
            keys::ACADEMIC_YEAR => serde_json::to_value(&self.academic_year)?,
            keys::ACADEMIC_YEAR_META => serde_json::to_value(&self.year_meta)?,
            keys::PROMOTION_LOCKED => serde_json::to_value(&self.promotion_locked)?,
            keys::PROMOTION_SUMMARY => serde_json::to_value(&self.promotion_summary)?,
            keys::AUTO_PROMOTION_REQUEST => serde_json::to_value(&self.auto_promotion_request)?,
            keys::CLASSES => serde_json::to_value(&self.classes)?,
            keys::SECTIONS => serde_json::to_value(&self.sections)?,
            keys::STUDENTS => serde_json::to_value(&self.students)?,
            keys::TEACHERS => serde_json::to_value(&self.teachers)?,
            keys::FEE_STRUCTURES => serde_json::to_value(&self.fee_structures)?,
            keys::LEDGERS => serde_json::to_value(&self.ledgers)?,
            keys::ADJUSTMENTS => serde_json::to_value(&self.adjustments)?,
            keys::PAYMENTS => serde_json::to_value(&self.payments)?,
            keys::EXPENSES => serde_json::to_value(&self.expenses)?,
            keys::SYSTEM_LOGS => serde_json::to_value(&self.system_logs)?,
            keys::SETTINGS => serde_json::to_value(&self.settings)?,
            other => anyhow::bail!("unknown store key: {}", other),
        };
        Ok(v)
    }

    pub fn log_event(
        &mut self,
        event: SystemLogEvent,
        academic_year: &str,
        details: Option<String>,
        now: DateTime<Utc>,
    ) {
        tracing::info!(?event, academic_year, details = details.as_deref().unwrap_or(""), "system event");
        self.system_logs.push(SystemLog {
            id: new_id(),
            event,
            academic_year: academic_year.to_string(),
            timestamp: now,
            details,
        });
        self.touch(keys::SYSTEM_LOGS);
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn teacher(&self, id: &str) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.id == id)
    }

    pub fn class(&self, id: &str) -> Option<&SchoolClass> {
        self.classes.iter().find(|c| c.id == id)
    }

    pub fn ledger(&self, id: &str) -> Option<&FeeLedger> {
        self.ledgers.iter().find(|l| l.id == id)
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::people::{add_student, NewStudent};
    use crate::promotion;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).expect("date")
    }

    #[test]
    fn fresh_load_seeds_and_persists_defaults() {
        let conn = Connection::open_in_memory().expect("db");
        store::init_schema(&conn).expect("schema");

        let mut school = School::load(&conn, today()).expect("load");
        assert_eq!(school.academic_year, "2025-26");
        assert_eq!(school.classes.len(), classes::FIXED_CLASSES.len());
        assert_eq!(school.year_meta.first().map(|y| y.year.as_str()), Some("2024-25"));

        let written = school.commit(&conn).expect("commit");
        assert!(written.contains(&keys::CLASSES));
        assert!(written.contains(&keys::ACADEMIC_YEAR_META));

        let reloaded = School::load(&conn, today()).expect("reload");
        assert!(!reloaded.is_dirty());
        assert_eq!(reloaded.classes, school.classes);
    }

    #[test]
    fn commit_writes_only_touched_keys() {
        let conn = Connection::open_in_memory().expect("db");
        store::init_schema(&conn).expect("schema");
        let mut school = School::load(&conn, today()).expect("load");
        school.commit(&conn).expect("commit");

        school.academic_year = "2026-27".into();
        school.touch(keys::ACADEMIC_YEAR);
        let written = school.commit(&conn).expect("commit");
        assert_eq!(written, vec![keys::ACADEMIC_YEAR]);
        assert!(store::get_raw(&conn, keys::STUDENTS).expect("raw").is_none());
    }

    #[test]
    fn duplicate_class_references_follow_the_kept_record() {
        let conn = Connection::open_in_memory().expect("db");
        store::init_schema(&conn).expect("schema");
        let mut school = School::load(&conn, today()).expect("load");
        let kept = classes::class_by_name(&school, "5").expect("class 5").id.clone();
        let student = add_student(
            &mut school,
            NewStudent {
                first_name: "Meera".into(),
                last_name: "Iyer".into(),
                gender: Gender::Female,
                date_of_birth: None,
                phone_number: String::new(),
                address: Address::default(),
                father: ParentInfo::default(),
                mother: ParentInfo::default(),
                academic: AcademicInfo::default(),
                class_id: Some(kept.clone()),
                section_id: None,
            },
        )
        .expect("student")
        .id;
        school.classes.push(SchoolClass {
            id: "dup5".into(),
            name: "5".into(),
        });
        for st in school.students.iter_mut() {
            st.class_id = Some("dup5".into());
        }
        school.sections.push(Section {
            id: "sec".into(),
            class_id: "dup5".into(),
            name: "A".into(),
            homeroom_teacher_id: None,
        });
        school.touch(keys::CLASSES);
        school.touch(keys::STUDENTS);
        school.touch(keys::SECTIONS);
        school.commit(&conn).expect("commit");

        let mut reloaded = School::load(&conn, today()).expect("reload");
        assert!(reloaded.class("dup5").is_none());
        assert_eq!(reloaded.student(&student).and_then(|s| s.class_id.clone()), Some(kept.clone()));
        assert_eq!(reloaded.sections[0].class_id, kept);
        let written = reloaded.commit(&conn).expect("commit fixup");
        assert!(written.contains(&keys::STUDENTS));
        assert!(written.contains(&keys::SECTIONS));

        let now = DateTime::parse_from_rfc3339("2026-03-20T09:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);
        let summary = promotion::promote(&mut reloaded, "2025-26", now).expect("promote");
        assert_eq!(summary.promoted_count, 1);
        let next = reloaded.student(&student).and_then(|s| s.class_id.clone()).expect("class");
        assert_eq!(reloaded.class(&next).map(|c| c.name.as_str()), Some("6"));
    }
}
