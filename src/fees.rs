//! Fee structure registry. Components are editable while a structure is a
//! draft; at most one structure is active per class and academic year.

use crate::error::{Error, Result};
use crate::ledger::{self, UpsertOutcome};
use crate::model::*;
use crate::school::{new_id, School};
use crate::store::keys;
use crate::years;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub fn active_fee_structure<'a>(
    school: &'a School,
    class_id: &str,
    academic_year: &str,
) -> Option<&'a FeeStructure> {
    school.fee_structures.iter().find(|fs| {
        fs.class_id == class_id
            && fs.academic_year == academic_year
            && fs.status == FeeStructureStatus::Active
    })
}

pub fn create_fee_structure(
    school: &mut School,
    class_id: &str,
    academic_year: &str,
    now: DateTime<Utc>,
) -> Result<FeeStructure> {
    if school.class(class_id).is_none() {
        return Err(Error::not_found("class", class_id));
    }
    if years::parse_start(academic_year).is_none() {
        return Err(Error::BadInput(format!("invalid academic year: {}", academic_year)));
    }
    let fs = FeeStructure {
        id: new_id(),
        class_id: class_id.to_string(),
        academic_year: academic_year.to_string(),
        components: Vec::new(),
        status: FeeStructureStatus::Draft,
        created_at: now,
    };
    school.fee_structures.push(fs.clone());
    school.touch(keys::FEE_STRUCTURES);
    Ok(fs)
}

fn draft_mut<'a>(school: &'a mut School, id: &str) -> Result<&'a mut FeeStructure> {
    let fs = school
        .fee_structures
        .iter_mut()
        .find(|fs| fs.id == id)
        .ok_or_else(|| Error::not_found("fee structure", id))?;
    if fs.status != FeeStructureStatus::Draft {
        return Err(Error::InvalidState(
            "fee structure is active; components can only change while it is a draft".into(),
        ));
    }
    Ok(fs)
}

pub fn add_fee_component(
    school: &mut School,
    fee_structure_id: &str,
    name: &str,
    amount: f64,
    mandatory: bool,
) -> Result<FeeComponent> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadInput("component name must not be empty".into()));
    }
    if !(amount >= 0.0) || !amount.is_finite() {
        return Err(Error::InvalidAmount("fee component"));
    }
    let fs = draft_mut(school, fee_structure_id)?;
    let component = FeeComponent {
        id: new_id(),
        name: name.to_string(),
        amount,
        mandatory,
    };
    fs.components.push(component.clone());
    school.touch(keys::FEE_STRUCTURES);
    Ok(component)
}

pub fn remove_fee_component(school: &mut School, fee_structure_id: &str, component_id: &str) -> Result<()> {
    let fs = draft_mut(school, fee_structure_id)?;
    let before = fs.components.len();
    fs.components.retain(|c| c.id != component_id);
    if fs.components.len() == before {
        return Err(Error::not_found("fee component", component_id));
    }
    school.touch(keys::FEE_STRUCTURES);
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReport {
    pub demoted: Vec<String>,
    pub ledgers_created: usize,
    pub ledgers_resnapshotted: usize,
    pub ledgers_frozen: usize,
}

/// Activates the structure, demotes its siblings for the same class and year
/// back to draft, then refreshes the ledgers of the class's active students.
pub fn activate_fee_structure(school: &mut School, id: &str, now: DateTime<Utc>) -> Result<ActivationReport> {
    let target = school
        .fee_structures
        .iter()
        .find(|fs| fs.id == id)
        .ok_or_else(|| Error::not_found("fee structure", id))?;
    let class_id = target.class_id.clone();
    let year = target.academic_year.clone();
    years::ensure_year_open(school, &year)?;

    let mut report = ActivationReport::default();
    for fs in school.fee_structures.iter_mut() {
        if fs.class_id != class_id || fs.academic_year != year {
            continue;
        }
        if fs.id == id {
            fs.status = FeeStructureStatus::Active;
        } else if fs.status == FeeStructureStatus::Active {
            fs.status = FeeStructureStatus::Draft;
            report.demoted.push(fs.id.clone());
        }
    }
    school.touch(keys::FEE_STRUCTURES);

    let components = active_fee_structure(school, &class_id, &year)
        .map(FeeStructure::snapshot)
        .unwrap_or_default();
    let student_ids: Vec<String> = school
        .students
        .iter()
        .filter(|s| s.status == StudentStatus::Active && s.class_id.as_deref() == Some(class_id.as_str()))
        .map(|s| s.id.clone())
        .collect();
    for sid in student_ids {
        match ledger::upsert_ledger_from_fee_structure(school, &sid, &class_id, &year, components.clone(), now) {
            UpsertOutcome::Created => report.ledgers_created += 1,
            UpsertOutcome::Resnapshotted => report.ledgers_resnapshotted += 1,
            UpsertOutcome::FrozenByPayments => report.ledgers_frozen += 1,
            UpsertOutcome::YearClosed => {}
        }
    }

    let class_name = school.class(&class_id).map(|c| c.name.clone()).unwrap_or_default();
    school.log_event(
        SystemLogEvent::FeeStructureActivated,
        &year,
        Some(format!("class {} structure {}", class_name, id)),
        now,
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::class_by_name;
    use chrono::NaiveDate;

    const YEAR: &str = "2025-26";

    fn setup() -> (School, String) {
        let s = School::seeded(NaiveDate::from_ymd_opt(2025, 6, 1).expect("date"));
        let c5 = class_by_name(&s, "5").expect("5").id.clone();
        (s, c5)
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T09:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    #[test]
    fn activating_demotes_previous_active_structure() {
        let (mut s, c5) = setup();
        let a = create_fee_structure(&mut s, &c5, YEAR, now()).expect("a");
        let b = create_fee_structure(&mut s, &c5, YEAR, now()).expect("b");
        let other_year = create_fee_structure(&mut s, &c5, "2026-27", now()).expect("other");
        activate_fee_structure(&mut s, &a.id, now()).expect("activate a");
        activate_fee_structure(&mut s, &other_year.id, now()).expect("activate other year");

        let report = activate_fee_structure(&mut s, &b.id, now()).expect("activate b");
        assert_eq!(report.demoted, vec![a.id.clone()]);

        let status = |id: &str| s.fee_structures.iter().find(|f| f.id == id).map(|f| f.status);
        assert_eq!(status(&a.id), Some(FeeStructureStatus::Draft));
        assert_eq!(status(&b.id), Some(FeeStructureStatus::Active));
        assert_eq!(status(&other_year.id), Some(FeeStructureStatus::Active));
        let active_for_pair = s
            .fee_structures
            .iter()
            .filter(|f| f.class_id == c5 && f.academic_year == YEAR && f.status == FeeStructureStatus::Active)
            .count();
        assert_eq!(active_for_pair, 1);
        assert_eq!(active_fee_structure(&s, &c5, YEAR).map(|f| f.id.clone()), Some(b.id));
    }

    #[test]
    fn components_are_frozen_once_active() {
        let (mut s, c5) = setup();
        let fs = create_fee_structure(&mut s, &c5, YEAR, now()).expect("fs");
        let tuition = add_fee_component(&mut s, &fs.id, "Tuition", 20000.0, true).expect("tuition");
        let bus = add_fee_component(&mut s, &fs.id, "Transport", 4000.0, false).expect("bus");
        remove_fee_component(&mut s, &fs.id, &bus.id).expect("remove");
        assert!(matches!(
            remove_fee_component(&mut s, &fs.id, &bus.id),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            add_fee_component(&mut s, &fs.id, "Exam", -1.0, true),
            Err(Error::InvalidAmount(_))
        ));

        activate_fee_structure(&mut s, &fs.id, now()).expect("activate");
        assert!(matches!(
            add_fee_component(&mut s, &fs.id, "Exam", 500.0, true),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            remove_fee_component(&mut s, &fs.id, &tuition.id),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn activation_for_closed_year_fails() {
        let (mut s, c5) = setup();
        let fs = create_fee_structure(&mut s, &c5, "2024-25", now()).expect("fs");
        years::commit_close(&mut s, "2024-25", now()).expect("close");
        assert!(matches!(
            activate_fee_structure(&mut s, &fs.id, now()),
            Err(Error::YearClosed(_))
        ));
    }
}
