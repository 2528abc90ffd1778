//! Academic year registry: labels, the rolling window of open years, the
//! current-year pointer, closing, and per-year promotion lock state.

use crate::error::{Error, Result};
use crate::model::{AcademicYearMeta, AutoPromotionRequest, PromotionSummary, SystemLogEvent, YearStatus};
use crate::school::School;
use crate::store::keys;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Academic years start on 1 April.
pub const START_MONTH: u32 = 4;
const SEED_YEAR_COUNT: i32 = 6;
const MIN_OPEN_YEARS: usize = 2;

pub fn year_label(start: i32) -> String {
    format!("{}-{:02}", start, (start + 1).rem_euclid(100))
}

pub fn parse_start(label: &str) -> Option<i32> {
    let (start, end) = label.split_once('-')?;
    let start: i32 = start.parse().ok()?;
    let end: i32 = end.parse().ok()?;
    if end != (start + 1).rem_euclid(100) {
        return None;
    }
    Some(start)
}

pub fn academic_year_for_date(date: NaiveDate) -> String {
    if date.month() >= START_MONTH {
        year_label(date.year())
    } else {
        year_label(date.year() - 1)
    }
}

pub fn next_year_label(label: &str) -> Option<String> {
    parse_start(label).map(|s| year_label(s + 1))
}

/// First and last calendar day of an academic year.
pub fn year_range(label: &str) -> Option<(NaiveDate, NaiveDate)> {
    let start = parse_start(label)?;
    let first = NaiveDate::from_ymd_opt(start, START_MONTH, 1)?;
    let last = NaiveDate::from_ymd_opt(start + 1, START_MONTH, 1)?.pred_opt()?;
    Some((first, last))
}

pub fn initial_year_meta(today: NaiveDate) -> Vec<AcademicYearMeta> {
    (0..SEED_YEAR_COUNT)
        .map(|i| AcademicYearMeta {
            year: year_label(today.year() - 1 + i),
            status: YearStatus::Open,
            closed_at: None,
        })
        .collect()
}

/// Appends sequential years until at least two are open. Returns true when the
/// list changed.
pub fn ensure_open_window(meta: &mut Vec<AcademicYearMeta>) -> bool {
    let mut changed = false;
    while meta.iter().filter(|y| y.status == YearStatus::Open).count() < MIN_OPEN_YEARS {
        let next = meta
            .iter()
            .filter_map(|y| parse_start(&y.year))
            .max()
            .map(|s| s + 1)
            .unwrap_or_else(|| Utc::now().year());
        meta.push(AcademicYearMeta {
            year: year_label(next),
            status: YearStatus::Open,
            closed_at: None,
        });
        changed = true;
    }
    changed
}

pub fn year_meta<'a>(school: &'a School, year: &str) -> Option<&'a AcademicYearMeta> {
    school.year_meta.iter().find(|y| y.year == year)
}

/// Unknown years count as open.
pub fn is_year_closed(school: &School, year: &str) -> bool {
    year_meta(school, year).map(|y| y.status == YearStatus::Closed).unwrap_or(false)
}

pub fn ensure_year_open(school: &School, year: &str) -> Result<()> {
    if is_year_closed(school, year) {
        return Err(Error::YearClosed(year.to_string()));
    }
    Ok(())
}

pub fn select_year(school: &mut School, year: &str) -> Result<()> {
    if year_meta(school, year).is_none() {
        return Err(Error::not_found("academic year", year));
    }
    if school.academic_year != year {
        school.academic_year = year.to_string();
        school.touch(keys::ACADEMIC_YEAR);
    }
    Ok(())
}

pub fn is_promotion_locked(school: &School, year: &str) -> bool {
    school.promotion_locked.get(year).copied().unwrap_or(false)
}

pub fn lock_promotion(school: &mut School, year: &str) {
    school.promotion_locked.insert(year.to_string(), true);
    school.touch(keys::PROMOTION_LOCKED);
}

pub fn promotion_summary<'a>(school: &'a School, year: &str) -> Option<&'a PromotionSummary> {
    school.promotion_summary.get(year)
}

pub fn set_promotion_summary(school: &mut School, year: &str, summary: PromotionSummary) {
    school.promotion_summary.insert(year.to_string(), summary);
    school.touch(keys::PROMOTION_SUMMARY);
}

pub fn request_auto_promotion(school: &mut School, year: &str, now: DateTime<Utc>) {
    school.auto_promotion_request = Some(AutoPromotionRequest {
        year: year.to_string(),
        requested_at: now,
    });
    school.touch(keys::AUTO_PROMOTION_REQUEST);
}

pub fn clear_auto_promotion_request(school: &mut School) {
    if school.auto_promotion_request.take().is_some() {
        school.touch(keys::AUTO_PROMOTION_REQUEST);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseStep {
    Closed,
    NeedsConfirmation,
}

/// First phase of closing a year. A year whose promotion already ran closes
/// right away; otherwise the caller must confirm, because the close also
/// promotes every active student.
pub fn begin_close(school: &mut School, year: &str, now: DateTime<Utc>) -> Result<CloseStep> {
    if year_meta(school, year).is_none() {
        return Err(Error::not_found("academic year", year));
    }
    if is_promotion_locked(school, year) {
        mark_closed(school, year, now);
        return Ok(CloseStep::Closed);
    }
    Ok(CloseStep::NeedsConfirmation)
}

/// Second phase: records the auto-promotion request and closes the year. The
/// request is consumed by `promotion::run_pending`.
pub fn commit_close(school: &mut School, year: &str, now: DateTime<Utc>) -> Result<()> {
    if year_meta(school, year).is_none() {
        return Err(Error::not_found("academic year", year));
    }
    if !is_promotion_locked(school, year) {
        request_auto_promotion(school, year, now);
    }
    mark_closed(school, year, now);
    Ok(())
}

fn mark_closed(school: &mut School, year: &str, now: DateTime<Utc>) {
    let Some(meta) = school.year_meta.iter_mut().find(|y| y.year == year) else {
        return;
    };
    if meta.status == YearStatus::Closed {
        return;
    }
    meta.status = YearStatus::Closed;
    meta.closed_at = Some(meta.closed_at.unwrap_or(now));
    school.touch(keys::ACADEMIC_YEAR_META);
    if ensure_open_window(&mut school.year_meta) {
        school.touch(keys::ACADEMIC_YEAR_META);
    }
    school.log_event(SystemLogEvent::AcademicYearClosed, year, None, now);
}
