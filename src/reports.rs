//! Report projections. Each report returns its numbers plus a generic
//! printable document (`title`, `meta`, `sections` of header/row tables) that
//! the renderer turns into paper or PDF.

use crate::error::{Error, Result};
use crate::ledger::{self, LedgerStatus};
use crate::model::{Expense, ExpenseCategory, Payment};
use crate::school::School;
use crate::years;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    Income,
    Expense,
    Combined,
    Statement,
    Fees,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Daily,
    Monthly,
    HalfYearly,
    Yearly,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintMeta {
    pub school_name: String,
    pub academic_year: String,
    pub report_type: ReportType,
    pub granularity: Granularity,
    pub period_label: String,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintSection {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PrintSection {
    fn new(title: &str, headers: &[&str]) -> Self {
        PrintSection {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cols: Vec<String>) {
        self.rows.push(cols);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintDocument {
    pub title: String,
    pub meta: PrintMeta,
    pub sections: Vec<PrintSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Half {
    H1,
    H2,
}

/// A slice of an academic year. Months are calendar months (1 = January).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "granularity", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    Daily { date: NaiveDate },
    Monthly { month: u32 },
    HalfYearly { half: Half },
    Yearly,
}

impl Period {
    pub fn granularity(&self) -> Granularity {
        match self {
            Period::Daily { .. } => Granularity::Daily,
            Period::Monthly { .. } => Granularity::Monthly,
            Period::HalfYearly { .. } => Granularity::HalfYearly,
            Period::Yearly => Granularity::Yearly,
        }
    }

    /// Inclusive date range and a display label.
    pub fn resolve(&self, academic_year: &str) -> Result<(NaiveDate, NaiveDate, String)> {
        let (first, last) = years::year_range(academic_year)
            .ok_or_else(|| Error::BadInput(format!("invalid academic year: {}", academic_year)))?;
        match self {
            Period::Daily { date } => {
                if *date < first || *date > last {
                    return Err(Error::BadInput(format!("{} is outside {}", date, academic_year)));
                }
                Ok((*date, *date, date.format("%d %b %Y").to_string()))
            }
            Period::Monthly { month } => {
                if !(1..=12).contains(month) {
                    return Err(Error::BadInput("month must be in 1..=12".into()));
                }
                let (start, end) = month_range(academic_year, *month)?;
                Ok((start, end, start.format("%b %Y").to_string()))
            }
            Period::HalfYearly { half } => {
                // H1 is April..September, H2 is October..March.
                let (_, h1_end) = month_range(academic_year, 9)?;
                let (h2_start, _) = month_range(academic_year, 10)?;
                match half {
                    Half::H1 => Ok((first, h1_end, "H1 (Apr-Sep)".to_string())),
                    Half::H2 => Ok((h2_start, last, "H2 (Oct-Mar)".to_string())),
                }
            }
            Period::Yearly => Ok((first, last, academic_year.to_string())),
        }
    }
}

fn month_range(academic_year: &str, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start_year = years::parse_start(academic_year)
        .ok_or_else(|| Error::BadInput(format!("invalid academic year: {}", academic_year)))?;
    let year = if month >= years::START_MONTH { start_year } else { start_year + 1 };
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::BadInput("invalid month".into()))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let end = next
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| Error::BadInput("invalid month".into()))?;
    Ok((start, end))
}

pub fn format_money(symbol: &str, amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}{:.0}", symbol, amount)
    } else {
        format!("{}{:.2}", symbol, amount)
    }
}

fn document(
    school: &School,
    title: &str,
    report_type: ReportType,
    granularity: Granularity,
    academic_year: &str,
    period_label: String,
    sections: Vec<PrintSection>,
    now: DateTime<Utc>,
) -> PrintDocument {
    let reference = format!(
        "{}/{}/{}/{}",
        school.settings.school.receipt_prefix,
        serde_json::to_value(report_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        serde_json::to_value(granularity)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        academic_year
    );
    PrintDocument {
        title: title.to_string(),
        meta: PrintMeta {
            school_name: school.settings.school.name.clone(),
            academic_year: academic_year.to_string(),
            report_type,
            granularity,
            period_label,
            reference,
            generated_at: school.settings.reports.show_generated_at.then_some(now),
        },
        sections,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueRow {
    pub ledger_id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub pending: f64,
    pub status: LedgerStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingDues {
    pub rows: Vec<DueRow>,
    pub total_outstanding: f64,
    pub document: PrintDocument,
}

pub fn outstanding_dues(
    school: &School,
    academic_year: &str,
    class_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<OutstandingDues> {
    let mut rows = Vec::new();
    for l in school.ledgers.iter().filter(|l| l.academic_year == academic_year) {
        if class_id.is_some_and(|c| c != l.class_id) {
            continue;
        }
        let summary = ledger::ledger_summary(school, &l.id)?;
        if summary.pending <= 0.0 {
            continue;
        }
        let Some(student) = school.student(&l.student_id) else {
            continue;
        };
        rows.push(DueRow {
            ledger_id: l.id.clone(),
            student_id: student.id.clone(),
            student_name: student.display_name(),
            class_name: school.class(&l.class_id).map(|c| c.name.clone()).unwrap_or_else(|| "-".into()),
            pending: summary.pending,
            status: summary.status,
        });
    }
    rows.sort_by(|a, b| b.pending.total_cmp(&a.pending));
    let total_outstanding: f64 = rows.iter().map(|r| r.pending).sum();

    let sym = &school.settings.school.currency_symbol;
    let mut table = PrintSection::new("Outstanding Dues", &["Student", "Class", "Pending Amount", "Status"]);
    for r in &rows {
        table.row(vec![
            r.student_name.clone(),
            format!("Class {}", r.class_name),
            format_money(sym, r.pending),
            status_label(r.status).to_string(),
        ]);
    }
    let mut totals = PrintSection::new("Summary", &["Metric", "Amount"]);
    totals.row(vec!["Total Outstanding".into(), format_money(sym, total_outstanding)]);
    let document = document(
        school,
        "Outstanding Dues",
        ReportType::Fees,
        Granularity::Yearly,
        academic_year,
        academic_year.to_string(),
        vec![table, totals],
        now,
    );
    Ok(OutstandingDues {
        rows,
        total_outstanding,
        document,
    })
}

fn status_label(s: LedgerStatus) -> &'static str {
    match s {
        LedgerStatus::Paid => "PAID",
        LedgerStatus::Partial => "PARTIAL",
        LedgerStatus::Pending => "PENDING",
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassFeeRow {
    pub class_id: String,
    pub class_name: String,
    pub students: usize,
    pub total_fee: f64,
    pub collected: f64,
    pub pending: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassFeeSummary {
    pub rows: Vec<ClassFeeRow>,
    pub grand_total: ClassFeeRow,
    pub document: PrintDocument,
}

pub fn class_fee_summary(school: &School, academic_year: &str, now: DateTime<Utc>) -> Result<ClassFeeSummary> {
    let mut rows = Vec::new();
    let mut grand_total = ClassFeeRow {
        class_name: "Total".into(),
        ..Default::default()
    };
    for class in &school.classes {
        let mut row = ClassFeeRow {
            class_id: class.id.clone(),
            class_name: class.name.clone(),
            ..Default::default()
        };
        for l in school
            .ledgers
            .iter()
            .filter(|l| l.class_id == class.id && l.academic_year == academic_year)
        {
            let s = ledger::ledger_summary(school, &l.id)?;
            row.students += 1;
            row.total_fee += s.final_fee;
            row.collected += s.paid;
            row.pending += s.pending;
        }
        grand_total.students += row.students;
        grand_total.total_fee += row.total_fee;
        grand_total.collected += row.collected;
        grand_total.pending += row.pending;
        rows.push(row);
    }

    let sym = &school.settings.school.currency_symbol;
    let mut table = PrintSection::new(
        "Class-wise Fee Summary",
        &["Class", "Students", "Total Fee", "Collected", "Pending"],
    );
    for r in rows.iter().chain(std::iter::once(&grand_total)) {
        table.row(vec![
            r.class_name.clone(),
            r.students.to_string(),
            format_money(sym, r.total_fee),
            format_money(sym, r.collected),
            format_money(sym, r.pending),
        ]);
    }
    let document = document(
        school,
        "Class-wise Fee Summary",
        ReportType::Fees,
        Granularity::Yearly,
        academic_year,
        academic_year.to_string(),
        vec![table],
        now,
    );
    Ok(ClassFeeSummary {
        rows,
        grand_total,
        document,
    })
}

fn payments_between<'a>(school: &'a School, start: NaiveDate, end: NaiveDate) -> Vec<&'a Payment> {
    school
        .payments
        .iter()
        .filter(|p| {
            let d = p.created_at.date_naive();
            d >= start && d <= end
        })
        .collect()
}

fn expenses_between<'a>(school: &'a School, start: NaiveDate, end: NaiveDate) -> Vec<&'a Expense> {
    school
        .expenses
        .iter()
        .filter(|e| e.expense_date >= start && e.expense_date <= end)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeExpenseReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub income: f64,
    pub late_settlements: f64,
    pub expense: f64,
    pub net: f64,
    pub expense_by_category: BTreeMap<ExpenseCategory, f64>,
    pub document: PrintDocument,
}

pub fn income_vs_expense(
    school: &School,
    academic_year: &str,
    period: &Period,
    now: DateTime<Utc>,
) -> Result<IncomeExpenseReport> {
    let (start, end, label) = period.resolve(academic_year)?;
    let payments = payments_between(school, start, end);
    let expenses = expenses_between(school, start, end);
    let income: f64 = payments.iter().map(|p| p.amount).sum();
    let late_settlements: f64 = payments
        .iter()
        .filter(|p| p.is_late_settlement)
        .map(|p| p.amount)
        .sum();
    let expense: f64 = expenses.iter().map(|e| e.amount).sum();
    let mut expense_by_category: BTreeMap<ExpenseCategory, f64> = BTreeMap::new();
    for e in &expenses {
        *expense_by_category.entry(e.category).or_insert(0.0) += e.amount;
    }
    let net = income - expense;

    let sym = &school.settings.school.currency_symbol;
    let mut summary = PrintSection::new("Summary", &["Metric", "Amount"]);
    summary.row(vec!["Total Income".into(), format_money(sym, income)]);
    summary.row(vec!["Late Settlements (included)".into(), format_money(sym, late_settlements)]);
    summary.row(vec!["Total Expense".into(), format_money(sym, expense)]);
    summary.row(vec![net_label(net).into(), format_money(sym, net.abs())]);
    let mut by_cat = PrintSection::new("Expenses by Category", &["Category", "Amount"]);
    for (cat, amount) in &expense_by_category {
        by_cat.row(vec![cat.as_str().to_string(), format_money(sym, *amount)]);
    }
    let document = document(
        school,
        "Income vs Expense",
        ReportType::Combined,
        period.granularity(),
        academic_year,
        label,
        vec![summary, by_cat],
        now,
    );
    Ok(IncomeExpenseReport {
        period_start: start,
        period_end: end,
        income,
        late_settlements,
        expense,
        net,
        expense_by_category,
        document,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    pub category: ExpenseCategory,
    pub count: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseBreakdown {
    pub rows: Vec<CategoryRow>,
    pub total: f64,
    pub document: PrintDocument,
}

pub fn expense_breakdown(
    school: &School,
    academic_year: &str,
    period: &Period,
    now: DateTime<Utc>,
) -> Result<ExpenseBreakdown> {
    let (start, end, label) = period.resolve(academic_year)?;
    let mut by_category: BTreeMap<ExpenseCategory, (usize, f64)> = BTreeMap::new();
    for e in expenses_between(school, start, end) {
        let slot = by_category.entry(e.category).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += e.amount;
    }
    let rows: Vec<CategoryRow> = by_category
        .into_iter()
        .map(|(category, (count, amount))| CategoryRow {
            category,
            count,
            amount,
        })
        .collect();
    let total: f64 = rows.iter().map(|r| r.amount).sum();

    let sym = &school.settings.school.currency_symbol;
    let mut table = PrintSection::new("Expenses by Category", &["Category", "Entries", "Amount"]);
    for r in &rows {
        table.row(vec![
            r.category.as_str().to_string(),
            r.count.to_string(),
            format_money(sym, r.amount),
        ]);
    }
    table.row(vec!["TOTAL".into(), String::new(), format_money(sym, total)]);
    let document = document(
        school,
        "Expense Report",
        ReportType::Expense,
        period.granularity(),
        academic_year,
        label,
        vec![table],
        now,
    );
    Ok(ExpenseBreakdown { rows, total, document })
}

fn net_label(net: f64) -> &'static str {
    if net >= 0.0 {
        "Net Surplus"
    } else {
        "Net Deficit"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRow {
    pub month: String,
    pub income: f64,
    pub expense: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearEndStatement {
    pub total_income: f64,
    pub total_expense: f64,
    pub net: f64,
    pub closed: bool,
    pub months: Vec<MonthRow>,
    pub document: PrintDocument,
}

pub fn year_end_statement(school: &School, academic_year: &str, now: DateTime<Utc>) -> Result<YearEndStatement> {
    let mut months = Vec::with_capacity(12);
    for offset in 0..12u32 {
        let month = (years::START_MONTH - 1 + offset) % 12 + 1;
        let (start, end) = month_range(academic_year, month)?;
        let income: f64 = payments_between(school, start, end).iter().map(|p| p.amount).sum();
        let expense: f64 = expenses_between(school, start, end).iter().map(|e| e.amount).sum();
        months.push(MonthRow {
            month: start.format("%B").to_string(),
            income,
            expense,
            net: income - expense,
        });
    }
    let total_income: f64 = months.iter().map(|m| m.income).sum();
    let total_expense: f64 = months.iter().map(|m| m.expense).sum();
    let net = total_income - total_expense;
    let closed = years::is_year_closed(school, academic_year);

    let sym = &school.settings.school.currency_symbol;
    let mut totals = PrintSection::new("Year Summary", &["Metric", "Amount"]);
    totals.row(vec!["Total Income".into(), format_money(sym, total_income)]);
    totals.row(vec!["Total Expense".into(), format_money(sym, total_expense)]);
    totals.row(vec![net_label(net).into(), format_money(sym, net.abs())]);
    totals.row(vec![
        "Year Status".into(),
        if closed { "CLOSED" } else { "OPEN" }.to_string(),
    ]);
    let mut monthly = PrintSection::new("Monthly Snapshot", &["Month", "Income", "Expense", "Net"]);
    for m in &months {
        monthly.row(vec![
            m.month.clone(),
            format_money(sym, m.income),
            format_money(sym, m.expense),
            format_money(sym, m.net),
        ]);
    }
    let document = document(
        school,
        "Year-End Financial Statement",
        ReportType::Statement,
        Granularity::Yearly,
        academic_year,
        academic_year.to_string(),
        vec![totals, monthly],
        now,
    );
    Ok(YearEndStatement {
        total_income,
        total_expense,
        net,
        closed,
        months,
        document,
    })
}

pub fn promotion_summary(school: &School, academic_year: &str, now: DateTime<Utc>) -> Result<PrintDocument> {
    let summary = years::promotion_summary(school, academic_year)
        .ok_or_else(|| Error::not_found("promotion summary", academic_year))?;
    let mut table = PrintSection::new("Summary", &["Metric", "Value"]);
    table.row(vec!["Promoted Students".into(), summary.promoted_count.to_string()]);
    table.row(vec!["Alumni (Class 10 Passed)".into(), summary.alumni_count.to_string()]);
    table.row(vec![
        "Promotion Date".into(),
        summary.promoted_at.format("%d %b %Y %H:%M").to_string(),
    ]);
    Ok(document(
        school,
        "Promotion Summary",
        ReportType::Statement,
        Granularity::Yearly,
        academic_year,
        "Academic Year Promotion".to_string(),
        vec![table],
        now,
    ))
}

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub academic_year: String,
    pub total_income: f64,
    pub total_expense: f64,
    pub net_balance: f64,
    /// Latest month of the year with any payment or expense, e.g. `Aug 2025`.
    pub latest_month: Option<String>,
    pub month_income: f64,
    pub month_expense: f64,
    pub total_pending: f64,
    pub students_with_dues: usize,
}

pub fn dashboard(school: &School, academic_year: &str) -> Result<Dashboard> {
    let (start, end, _) = Period::Yearly.resolve(academic_year)?;
    let payments = payments_between(school, start, end);
    let expenses = expenses_between(school, start, end);
    let total_income: f64 = payments.iter().map(|p| p.amount).sum();
    let total_expense: f64 = expenses.iter().map(|e| e.amount).sum();

    let latest = payments
        .iter()
        .map(|p| p.created_at.date_naive())
        .chain(expenses.iter().map(|e| e.expense_date))
        .max();
    let (latest_month, month_income, month_expense) = match latest {
        Some(day) => {
            let (first, last) = month_range(academic_year, day.month())?;
            let income: f64 = payments
                .iter()
                .filter(|p| (first..=last).contains(&p.created_at.date_naive()))
                .map(|p| p.amount)
                .sum();
            let expense: f64 = expenses
                .iter()
                .filter(|e| (first..=last).contains(&e.expense_date))
                .map(|e| e.amount)
                .sum();
            (Some(first.format("%b %Y").to_string()), income, expense)
        }
        None => (None, 0.0, 0.0),
    };

    let mut total_pending = 0.0;
    let mut students_with_dues = 0usize;
    for l in school.ledgers.iter().filter(|l| l.academic_year == academic_year) {
        let summary = ledger::ledger_summary(school, &l.id)?;
        if summary.pending > 0.0 {
            total_pending += summary.pending;
            students_with_dues += 1;
        }
    }

    Ok(Dashboard {
        academic_year: academic_year.to_string(),
        total_income,
        total_expense,
        net_balance: total_income - total_expense,
        latest_month,
        month_income,
        month_expense,
        total_pending,
        students_with_dues,
    })
}
