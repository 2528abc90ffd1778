//! Bulk promotion at year end.
//!
//! The whole pass is computed on a copy of the student list and swapped in
//! together with the summary and the year lock, so a run either lands
//! completely or not at all. A locked year never promotes again.

use crate::classes::{class_by_name, class_rank};
use crate::error::{Error, Result};
use crate::fees;
use crate::ledger::{self, UpsertOutcome};
use crate::model::*;
use crate::school::School;
use crate::store::keys;
use crate::years;
use chrono::{DateTime, Utc};

/// Classes 11 and 12 are a separate stream and are not promoted automatically.
pub const PROMOTION_ORDER: [&str; 14] = [
    "Playgroup", "Nursery", "LKG", "UKG", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Promote(String),
    Graduate,
    Skip,
}

pub fn next_step(school: &School, class_id: &str) -> NextStep {
    let Some(class) = school.class(class_id) else {
        return NextStep::Skip;
    };
    let Some(pos) = PROMOTION_ORDER.iter().position(|n| *n == class.name) else {
        return NextStep::Skip;
    };
    if pos + 1 == PROMOTION_ORDER.len() {
        return NextStep::Graduate;
    }
    match class_by_name(school, PROMOTION_ORDER[pos + 1]) {
        Some(next) => NextStep::Promote(next.id.clone()),
        None => NextStep::Skip,
    }
}

/// Promotes every active, placed student out of `year`. Fails with
/// `AlreadyLocked` (and changes nothing) when the year already ran.
pub fn promote(school: &mut School, year: &str, now: DateTime<Utc>) -> Result<PromotionSummary> {
    if years::is_promotion_locked(school, year) {
        return Err(Error::AlreadyLocked(year.to_string()));
    }

    let mut next_students = school.students.clone();
    let mut promoted: Vec<(String, String)> = Vec::new();
    let mut alumni_count = 0usize;
    for student in next_students.iter_mut() {
        if student.status != StudentStatus::Active {
            continue;
        }
        let Some(class_id) = student.class_id.as_deref() else {
            continue;
        };
        match next_step(school, class_id) {
            NextStep::Graduate => {
                student.status = StudentStatus::Alumni;
                alumni_count += 1;
            }
            NextStep::Promote(next_id) => {
                student.class_id = Some(next_id.clone());
                student.section_id = None;
                promoted.push((student.id.clone(), next_id));
            }
            NextStep::Skip => {}
        }
    }

    let summary = PromotionSummary {
        promoted_count: promoted.len(),
        alumni_count,
        promoted_at: now,
    };
    school.students = next_students;
    school.touch(keys::STUDENTS);
    years::set_promotion_summary(school, year, summary.clone());
    years::lock_promotion(school, year);

    let mut ledgers_created = 0usize;
    if let Some(next_year) = years::next_year_label(year) {
        for (student_id, class_id) in &promoted {
            let Some(components) =
                fees::active_fee_structure(school, class_id, &next_year).map(FeeStructure::snapshot)
            else {
                continue;
            };
            let outcome =
                ledger::upsert_ledger_from_fee_structure(school, student_id, class_id, &next_year, components, now);
            if outcome == UpsertOutcome::Created {
                ledgers_created += 1;
            }
        }
    }

    tracing::info!(
        year,
        promoted = summary.promoted_count,
        alumni = summary.alumni_count,
        ledgers_created,
        "bulk promotion complete"
    );
    school.log_event(
        SystemLogEvent::BulkPromotionRun,
        year,
        Some(format!(
            "promoted {}, alumni {}",
            summary.promoted_count, summary.alumni_count
        )),
        now,
    );
    Ok(summary)
}

/// Consumes a pending auto-promotion request left by closing a year. A request
/// for a year that is already locked is dropped.
pub fn run_pending(school: &mut School, now: DateTime<Utc>) -> Result<Option<PromotionSummary>> {
    let Some(request) = school.auto_promotion_request.clone() else {
        return Ok(None);
    };
    years::clear_auto_promotion_request(school);
    match promote(school, &request.year, now) {
        Ok(summary) => Ok(Some(summary)),
        Err(Error::AlreadyLocked(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentPromotion {
    pub class_id: String,
    pub next_year: String,
    pub ledger: Option<UpsertOutcome>,
}

/// Moves one active student to the next class and prepares their ledger for
/// the following year when that class already has an active structure.
pub fn promote_student(
    school: &mut School,
    student_id: &str,
    from_year: &str,
    now: DateTime<Utc>,
) -> Result<StudentPromotion> {
    let student = school
        .student(student_id)
        .ok_or_else(|| Error::not_found("student", student_id))?;
    if student.status != StudentStatus::Active {
        return Err(Error::InvalidState("only active students can be promoted".into()));
    }
    let class_id = student
        .class_id
        .clone()
        .ok_or_else(|| Error::InvalidState("student has no class".into()))?;
    let next_id = match next_step(school, &class_id) {
        NextStep::Promote(id) => id,
        NextStep::Graduate => return Err(Error::InvalidState("student is already in the final class".into())),
        NextStep::Skip => {
            let rank = school.class(&class_id).and_then(|c| class_rank(&c.name));
            return Err(Error::InvalidState(match rank {
                Some(_) => "class is outside the promotion order".into(),
                None => "student class is not a known class".into(),
            }));
        }
    };
    let next_year = years::next_year_label(from_year)
        .ok_or_else(|| Error::BadInput(format!("invalid academic year: {}", from_year)))?;

    if let Some(st) = school.students.iter_mut().find(|s| s.id == student_id) {
        st.class_id = Some(next_id.clone());
        st.section_id = None;
    }
    school.touch(keys::STUDENTS);

    let components = fees::active_fee_structure(school, &next_id, &next_year).map(FeeStructure::snapshot);
    let ledger = components.map(|components| {
        ledger::upsert_ledger_from_fee_structure(school, student_id, &next_id, &next_year, components, now)
    });
    Ok(StudentPromotion {
        class_id: next_id,
        next_year,
        ledger,
    })
}
