//! Fee ledger engine.
//!
//! A ledger is the per-student, per-year snapshot of what is owed. Totals are
//! never stored: `ledger_summary` folds the snapshot, the signed adjustments and
//! the payments on every call. Closed years reject new ledgers, adjustments and
//! expenses; payments are still accepted and flagged as late settlements.

use crate::error::{Error, Result};
use crate::fees;
use crate::model::*;
use crate::school::{new_id, School};
use crate::store::keys;
use crate::years;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerStatus {
    Paid,
    Partial,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub base_total: f64,
    pub adjustments_total: f64,
    pub final_fee: f64,
    pub paid: f64,
    pub pending: f64,
    pub status: LedgerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpsertOutcome {
    Created,
    Resnapshotted,
    FrozenByPayments,
    YearClosed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdjustment {
    pub ledger_id: String,
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    pub amount: f64,
    #[serde(default)]
    pub reason: String,
    pub approved_by: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub ledger_id: String,
    pub amount: f64,
    pub mode: PaymentMode,
    #[serde(default)]
    pub reference: Option<String>,
    pub collected_by: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub category: ExpenseCategory,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub expense_date: NaiveDate,
    pub paid_to: String,
    pub mode: ExpenseMode,
    #[serde(default)]
    pub reference: Option<String>,
    pub recorded_by: String,
}

pub fn ledger_by_student_year<'a>(
    school: &'a School,
    student_id: &str,
    academic_year: &str,
) -> Option<&'a FeeLedger> {
    school
        .ledgers
        .iter()
        .find(|l| l.student_id == student_id && l.academic_year == academic_year)
}

/// Snapshot components need a name and a finite, non-negative amount, the
/// same rules fee structure components follow.
pub fn check_components(components: &[ComponentSnapshot]) -> Result<()> {
    for c in components {
        if c.name.trim().is_empty() {
            return Err(Error::BadInput("component name must not be empty".into()));
        }
        if !(c.amount >= 0.0) || !c.amount.is_finite() {
            return Err(Error::InvalidAmount("fee component"));
        }
    }
    Ok(())
}

pub fn create_ledger(
    school: &mut School,
    student_id: &str,
    class_id: &str,
    academic_year: &str,
    base_components: Vec<ComponentSnapshot>,
    now: DateTime<Utc>,
) -> Result<FeeLedger> {
    years::ensure_year_open(school, academic_year)?;
    check_components(&base_components)?;
    if ledger_by_student_year(school, student_id, academic_year).is_some() {
        return Err(Error::AlreadyExists(format!(
            "ledger already exists for student {} in {}",
            student_id, academic_year
        )));
    }
    let ledger = FeeLedger {
        id: new_id(),
        student_id: student_id.to_string(),
        class_id: class_id.to_string(),
        academic_year: academic_year.to_string(),
        base_components,
        created_at: now,
    };
    school.ledgers.push(ledger.clone());
    school.touch(keys::LEDGERS);
    Ok(ledger)
}

/// Creates the ledger, or re-snapshots its components while no money has
/// moved against it. Never fails; the outcome says what happened.
pub fn upsert_ledger_from_fee_structure(
    school: &mut School,
    student_id: &str,
    class_id: &str,
    academic_year: &str,
    base_components: Vec<ComponentSnapshot>,
    now: DateTime<Utc>,
) -> UpsertOutcome {
    if years::is_year_closed(school, academic_year) {
        return UpsertOutcome::YearClosed;
    }
    let existing = ledger_by_student_year(school, student_id, academic_year).map(|l| l.id.clone());
    let Some(ledger_id) = existing else {
        school.ledgers.push(FeeLedger {
            id: new_id(),
            student_id: student_id.to_string(),
            class_id: class_id.to_string(),
            academic_year: academic_year.to_string(),
            base_components,
            created_at: now,
        });
        school.touch(keys::LEDGERS);
        return UpsertOutcome::Created;
    };
    if school.payments.iter().any(|p| p.ledger_id == ledger_id) {
        return UpsertOutcome::FrozenByPayments;
    }
    if let Some(l) = school.ledgers.iter_mut().find(|l| l.id == ledger_id) {
        l.base_components = base_components;
    }
    school.touch(keys::LEDGERS);
    UpsertOutcome::Resnapshotted
}

/// Upserts the ledger of an active, placed student from the active fee
/// structure of their class. Returns `None` when there is nothing to sync.
pub fn sync_student_ledger(
    school: &mut School,
    student_id: &str,
    academic_year: &str,
    now: DateTime<Utc>,
) -> Result<Option<UpsertOutcome>> {
    let student = school
        .student(student_id)
        .ok_or_else(|| Error::not_found("student", student_id))?;
    if student.status != StudentStatus::Active {
        return Ok(None);
    }
    let Some(class_id) = student.class_id.clone() else {
        return Ok(None);
    };
    let Some(components) =
        fees::active_fee_structure(school, &class_id, academic_year).map(FeeStructure::snapshot)
    else {
        return Ok(None);
    };
    Ok(Some(upsert_ledger_from_fee_structure(
        school,
        student_id,
        &class_id,
        academic_year,
        components,
        now,
    )))
}

pub fn add_adjustment(
    school: &mut School,
    new: NewAdjustment,
    now: DateTime<Utc>,
) -> Result<LedgerAdjustment> {
    let ledger = school
        .ledger(&new.ledger_id)
        .ok_or_else(|| Error::not_found("ledger", &new.ledger_id))?;
    years::ensure_year_open(school, &ledger.academic_year)?;
    if !new.amount.is_finite() {
        return Err(Error::BadInput("adjustment amount must be a number".into()));
    }
    let adjustment = LedgerAdjustment {
        id: new_id(),
        ledger_id: new.ledger_id,
        kind: new.kind,
        amount: new.amount,
        reason: new.reason,
        approved_by: new.approved_by,
        created_at: now,
    };
    school.adjustments.push(adjustment.clone());
    school.touch(keys::ADJUSTMENTS);
    Ok(adjustment)
}

pub fn add_payment(school: &mut School, new: NewPayment, now: DateTime<Utc>) -> Result<Payment> {
    if !(new.amount > 0.0) || !new.amount.is_finite() {
        return Err(Error::InvalidAmount("payment"));
    }
    let ledger = school
        .ledger(&new.ledger_id)
        .ok_or_else(|| Error::not_found("ledger", &new.ledger_id))?;
    let closed = years::is_year_closed(school, &ledger.academic_year);
    let payment = Payment {
        id: new_id(),
        ledger_id: new.ledger_id,
        student_id: ledger.student_id.clone(),
        amount: new.amount,
        mode: new.mode,
        reference: new.reference.filter(|r| !r.trim().is_empty()),
        collected_by: new.collected_by,
        created_at: now,
        is_late_settlement: closed,
        settled_in_year: closed.then(|| school.academic_year.clone()),
    };
    if closed {
        tracing::info!(
            ledger = %payment.ledger_id,
            settled_in = %school.academic_year,
            "late settlement against closed year"
        );
    }
    school.payments.push(payment.clone());
    school.touch(keys::PAYMENTS);
    Ok(payment)
}

/// The year is derived from the expense date, not from the selected year.
pub fn add_expense(school: &mut School, new: NewExpense, now: DateTime<Utc>) -> Result<Expense> {
    if !(new.amount > 0.0) || !new.amount.is_finite() {
        return Err(Error::InvalidAmount("expense"));
    }
    let year = years::academic_year_for_date(new.expense_date);
    years::ensure_year_open(school, &year)?;
    let expense = Expense {
        id: new_id(),
        category: new.category,
        description: new.description,
        amount: new.amount,
        expense_date: new.expense_date,
        paid_to: new.paid_to,
        mode: new.mode,
        reference: new.reference.filter(|r| !r.trim().is_empty()),
        recorded_by: new.recorded_by,
        recorded_at: now,
    };
    school.expenses.push(expense.clone());
    school.touch(keys::EXPENSES);
    Ok(expense)
}

pub fn ledger_summary(school: &School, ledger_id: &str) -> Result<LedgerSummary> {
    let ledger = school
        .ledger(ledger_id)
        .ok_or_else(|| Error::not_found("ledger", ledger_id))?;
    let base_total: f64 = ledger.base_components.iter().map(|c| c.amount).sum();
    let adjustments_total: f64 = school
        .adjustments
        .iter()
        .filter(|a| a.ledger_id == ledger_id)
        .map(|a| a.amount)
        .sum();
    let paid: f64 = school
        .payments
        .iter()
        .filter(|p| p.ledger_id == ledger_id)
        .map(|p| p.amount)
        .sum();
    let final_fee = base_total + adjustments_total;
    let pending = final_fee - paid;
    let status = if pending <= 0.0 {
        LedgerStatus::Paid
    } else if paid > 0.0 {
        LedgerStatus::Partial
    } else {
        LedgerStatus::Pending
    };
    Ok(LedgerSummary {
        base_total,
        adjustments_total,
        final_fee,
        paid,
        pending,
        status,
    })
}

/// Display receipt number: `<prefix>/<year>/<seq>`, where `seq` is the 1-based
/// position of the payment among all payments on that year's ledgers, ordered
/// by creation time (ties by id). Recomputed on every call.
pub fn receipt_number(school: &School, payment_id: &str, academic_year: Option<&str>) -> Result<String> {
    let payment = school
        .payments
        .iter()
        .find(|p| p.id == payment_id)
        .ok_or_else(|| Error::not_found("payment", payment_id))?;
    let year = match academic_year {
        Some(y) => y.to_string(),
        None => school
            .ledger(&payment.ledger_id)
            .map(|l| l.academic_year.clone())
            .ok_or_else(|| Error::not_found("ledger", &payment.ledger_id))?,
    };
    let mut in_year: Vec<&Payment> = school
        .payments
        .iter()
        .filter(|p| {
            school
                .ledger(&p.ledger_id)
                .map(|l| l.academic_year == year)
                .unwrap_or(false)
        })
        .collect();
    in_year.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    let pos = in_year
        .iter()
        .position(|p| p.id == payment_id)
        .ok_or_else(|| Error::not_found("payment in academic year", payment_id))?;
    Ok(format!("{}/{}/{:06}", school.settings.school.receipt_prefix, year, pos + 1))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    #[serde(flatten)]
    pub payment: Payment,
    pub receipt_number: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatement {
    pub ledger: FeeLedger,
    pub summary: LedgerSummary,
    pub adjustments: Vec<LedgerAdjustment>,
    pub payments: Vec<ReceiptLine>,
}

pub fn statement(school: &School, ledger_id: &str) -> Result<LedgerStatement> {
    let ledger = school
        .ledger(ledger_id)
        .ok_or_else(|| Error::not_found("ledger", ledger_id))?
        .clone();
    let summary = ledger_summary(school, ledger_id)?;
    let adjustments = school
        .adjustments
        .iter()
        .filter(|a| a.ledger_id == ledger_id)
        .cloned()
        .collect();
    let mut payments = Vec::new();
    for p in school.payments.iter().filter(|p| p.ledger_id == ledger_id) {
        payments.push(ReceiptLine {
            receipt_number: receipt_number(school, &p.id, Some(&ledger.academic_year))?,
            payment: p.clone(),
        });
    }
    payments.sort_by(|a, b| a.payment.created_at.cmp(&b.payment.created_at));
    Ok(LedgerStatement {
        ledger,
        summary,
        adjustments,
        payments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::class_by_name;
    use chrono::Duration;

    const YEAR: &str = "2025-26";

    fn school() -> School {
        School::seeded(NaiveDate::from_ymd_opt(2025, 6, 1).expect("date"))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T09:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    fn components(amounts: &[f64]) -> Vec<ComponentSnapshot> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| ComponentSnapshot {
                name: format!("Component {}", i + 1),
                amount: *a,
            })
            .collect()
    }

    fn pay(ledger_id: &str, amount: f64) -> NewPayment {
        NewPayment {
            ledger_id: ledger_id.to_string(),
            amount,
            mode: PaymentMode::Cash,
            reference: None,
            collected_by: "office".into(),
        }
    }

    fn close(s: &mut School, year: &str) {
        years::commit_close(s, year, t0()).expect("close");
    }

    #[test]
    fn summary_matches_worked_example() {
        let mut s = school();
        let l = create_ledger(&mut s, "stu", "c5", YEAR, components(&[18000.0, 4000.0, 2000.0]), t0())
            .expect("ledger");
        add_adjustment(
            &mut s,
            NewAdjustment {
                ledger_id: l.id.clone(),
                kind: AdjustmentType::Discount,
                amount: -2000.0,
                reason: "sibling".into(),
                approved_by: "principal".into(),
            },
            t0(),
        )
        .expect("adjustment");
        add_payment(&mut s, pay(&l.id, 8000.0), t0()).expect("payment");

        let sum = ledger_summary(&s, &l.id).expect("summary");
        assert_eq!(
            sum,
            LedgerSummary {
                base_total: 24000.0,
                adjustments_total: -2000.0,
                final_fee: 22000.0,
                paid: 8000.0,
                pending: 14000.0,
                status: LedgerStatus::Partial,
            }
        );
    }

    #[test]
    fn status_covers_pending_paid_and_overpaid() {
        let mut s = school();
        let l = create_ledger(&mut s, "stu", "c5", YEAR, components(&[1000.0]), t0()).expect("ledger");
        assert_eq!(ledger_summary(&s, &l.id).expect("s").status, LedgerStatus::Pending);
        add_payment(&mut s, pay(&l.id, 1000.0), t0()).expect("pay");
        assert_eq!(ledger_summary(&s, &l.id).expect("s").status, LedgerStatus::Paid);
        add_payment(&mut s, pay(&l.id, 50.0), t0()).expect("pay");
        let sum = ledger_summary(&s, &l.id).expect("s");
        assert_eq!(sum.status, LedgerStatus::Paid);
        assert_eq!(sum.pending, -50.0);
    }

    #[test]
    fn negative_or_unnamed_components_are_rejected() {
        let mut s = school();
        assert!(matches!(
            create_ledger(&mut s, "stu", "c5", YEAR, components(&[1000.0, -1.0]), t0()),
            Err(Error::InvalidAmount(_))
        ));
        let unnamed = vec![ComponentSnapshot {
            name: " ".into(),
            amount: 10.0,
        }];
        assert!(matches!(check_components(&unnamed), Err(Error::BadInput(_))));
        assert!(check_components(&components(&[0.0, 250.0])).is_ok());
        assert!(s.ledgers.is_empty());
    }

    #[test]
    fn one_ledger_per_student_year() {
        let mut s = school();
        create_ledger(&mut s, "stu", "c5", YEAR, components(&[100.0]), t0()).expect("first");
        let second = create_ledger(&mut s, "stu", "c5", YEAR, components(&[100.0]), t0());
        assert!(matches!(second, Err(Error::AlreadyExists(_))));
        create_ledger(&mut s, "stu", "c6", "2026-27", components(&[100.0]), t0()).expect("next year");
        assert_eq!(s.ledgers.len(), 2);
    }

    #[test]
    fn closed_year_blocks_ledgers_and_adjustments_but_not_payments() {
        let mut s = school();
        let l = create_ledger(&mut s, "stu", "c5", "2024-25", components(&[500.0]), t0()).expect("ledger");
        close(&mut s, "2024-25");

        assert!(matches!(
            create_ledger(&mut s, "other", "c5", "2024-25", components(&[1.0]), t0()),
            Err(Error::YearClosed(_))
        ));
        let adj = add_adjustment(
            &mut s,
            NewAdjustment {
                ledger_id: l.id.clone(),
                kind: AdjustmentType::LateFee,
                amount: 100.0,
                reason: String::new(),
                approved_by: "office".into(),
            },
            t0(),
        );
        assert!(matches!(adj, Err(Error::YearClosed(_))));

        let p = add_payment(&mut s, pay(&l.id, 200.0), t0()).expect("late payment");
        assert!(p.is_late_settlement);
        assert_eq!(p.settled_in_year.as_deref(), Some(YEAR));
        assert_eq!(p.student_id, "stu");
    }

    #[test]
    fn payment_amount_must_be_positive() {
        let mut s = school();
        let l = create_ledger(&mut s, "stu", "c5", YEAR, components(&[500.0]), t0()).expect("ledger");
        for bad in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                add_payment(&mut s, pay(&l.id, bad), t0()),
                Err(Error::InvalidAmount("payment"))
            ));
        }
        assert!(matches!(
            add_payment(&mut s, pay("missing", 10.0), t0()),
            Err(Error::NotFound { .. })
        ));
        assert!(s.payments.is_empty());
    }

    #[test]
    fn upsert_resnapshots_until_money_moves() {
        let mut s = school();
        assert_eq!(
            upsert_ledger_from_fee_structure(&mut s, "stu", "c5", YEAR, components(&[100.0]), t0()),
            UpsertOutcome::Created
        );
        assert_eq!(
            upsert_ledger_from_fee_structure(&mut s, "stu", "c5", YEAR, components(&[300.0]), t0()),
            UpsertOutcome::Resnapshotted
        );
        let id = s.ledgers[0].id.clone();
        assert_eq!(ledger_summary(&s, &id).expect("s").base_total, 300.0);

        add_payment(&mut s, pay(&id, 50.0), t0()).expect("pay");
        assert_eq!(
            upsert_ledger_from_fee_structure(&mut s, "stu", "c5", YEAR, components(&[999.0]), t0()),
            UpsertOutcome::FrozenByPayments
        );
        assert_eq!(ledger_summary(&s, &id).expect("s").base_total, 300.0);

        close(&mut s, "2024-25");
        assert_eq!(
            upsert_ledger_from_fee_structure(&mut s, "stu", "c5", "2024-25", components(&[1.0]), t0()),
            UpsertOutcome::YearClosed
        );
        assert_eq!(s.ledgers.len(), 1);
    }

    #[test]
    fn expense_year_comes_from_expense_date() {
        let mut s = school();
        close(&mut s, "2024-25");
        let expense = |d: NaiveDate, amount: f64| NewExpense {
            category: ExpenseCategory::Utility,
            description: "electricity".into(),
            amount,
            expense_date: d,
            paid_to: "BESCOM".into(),
            mode: ExpenseMode::Bank,
            reference: None,
            recorded_by: "office".into(),
        };
        let march = NaiveDate::from_ymd_opt(2025, 3, 31).expect("date");
        let april = NaiveDate::from_ymd_opt(2025, 4, 1).expect("date");
        assert!(matches!(add_expense(&mut s, expense(march, 10.0), t0()), Err(Error::YearClosed(_))));
        assert!(matches!(add_expense(&mut s, expense(april, 0.0), t0()), Err(Error::InvalidAmount("expense"))));
        add_expense(&mut s, expense(april, 10.0), t0()).expect("open year expense");
    }

    #[test]
    fn receipt_numbers_follow_creation_order_within_year() {
        let mut s = school();
        let a = create_ledger(&mut s, "a", "c5", YEAR, components(&[1000.0]), t0()).expect("a");
        let b = create_ledger(&mut s, "b", "c5", YEAR, components(&[1000.0]), t0()).expect("b");
        let other = create_ledger(&mut s, "a", "c6", "2026-27", components(&[1000.0]), t0()).expect("o");

        let p2 = add_payment(&mut s, pay(&b.id, 10.0), t0() + Duration::minutes(2)).expect("p2");
        let p1 = add_payment(&mut s, pay(&a.id, 10.0), t0() + Duration::minutes(1)).expect("p1");
        let po = add_payment(&mut s, pay(&other.id, 10.0), t0()).expect("po");

        assert_eq!(receipt_number(&s, &p1.id, None).expect("r"), "SKA/2025-26/000001");
        assert_eq!(receipt_number(&s, &p2.id, Some(YEAR)).expect("r"), "SKA/2025-26/000002");
        assert_eq!(receipt_number(&s, &po.id, None).expect("r"), "SKA/2026-27/000001");
        assert!(receipt_number(&s, &po.id, Some(YEAR)).is_err());
    }

    #[test]
    fn sync_uses_active_structure_of_student_class() {
        use crate::people::{add_student, NewStudent};
        let mut s = school();
        let class_id = class_by_name(&s, "5").expect("5").id.clone();
        let student = add_student(
            &mut s,
            NewStudent {
                first_name: "Ravi".into(),
                last_name: "K".into(),
                gender: Gender::Male,
                date_of_birth: None,
                phone_number: String::new(),
                address: Address::default(),
                father: ParentInfo::default(),
                mother: ParentInfo::default(),
                academic: AcademicInfo::default(),
                class_id: Some(class_id.clone()),
                section_id: None,
            },
        )
        .expect("student");
        assert_eq!(sync_student_ledger(&mut s, &student.id, YEAR, t0()).expect("sync"), None);

        let fs = fees::create_fee_structure(&mut s, &class_id, YEAR, t0()).expect("fs");
        fees::add_fee_component(&mut s, &fs.id, "Tuition", 12000.0, true).expect("component");
        fees::activate_fee_structure(&mut s, &fs.id, t0()).expect("activate");

        let ledger = ledger_by_student_year(&s, &student.id, YEAR).expect("ledger after activation");
        assert_eq!(ledger.base_components, components_named(&[("Tuition", 12000.0)]));
        assert_eq!(
            sync_student_ledger(&mut s, &student.id, YEAR, t0()).expect("sync"),
            Some(UpsertOutcome::Resnapshotted)
        );
    }

    fn components_named(items: &[(&str, f64)]) -> Vec<ComponentSnapshot> {
        items
            .iter()
            .map(|(n, a)| ComponentSnapshot {
                name: n.to_string(),
                amount: *a,
            })
            .collect()
    }
}
