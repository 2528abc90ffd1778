//! Persisted entity shapes. Field names are camelCase so the stored JSON keeps
//! the layout the admin UI already reads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum YearStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYearMeta {
    pub year: String,
    pub status: YearStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionSummary {
    pub promoted_count: usize,
    pub alumni_count: usize,
    pub promoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPromotionRequest {
    pub year: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub class_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homeroom_teacher_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentStatus {
    Active,
    Inactive,
    Alumni,
    Withdrawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParentInfo {
    pub name: String,
    pub occupation: String,
    pub education: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub address_line: String,
    pub city: String,
    pub pin_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcademicInfo {
    pub date_of_admission: Option<NaiveDate>,
    pub previous_school: Option<String>,
    pub roll_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
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
    pub status: StudentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeacherStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAssignment {
    pub class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
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
    pub status: TeacherStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_class: Option<ClassAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeComponent {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub mandatory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeeStructureStatus {
    Draft,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStructure {
    pub id: String,
    pub class_id: String,
    pub academic_year: String,
    pub components: Vec<FeeComponent>,
    pub status: FeeStructureStatus,
    pub created_at: DateTime<Utc>,
}

impl FeeStructure {
    pub fn snapshot(&self) -> Vec<ComponentSnapshot> {
        self.components
            .iter()
            .map(|c| ComponentSnapshot {
                name: c.name.clone(),
                amount: c.amount,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSnapshot {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLedger {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub academic_year: String,
    pub base_components: Vec<ComponentSnapshot>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Discount,
    Concession,
    Waiver,
    Extra,
    LateFee,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAdjustment {
    pub id: String,
    pub ledger_id: String,
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    pub amount: f64,
    pub reason: String,
    pub approved_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMode {
    Cash,
    Upi,
    Card,
    Bank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub ledger_id: String,
    pub student_id: String,
    pub amount: f64,
    pub mode: PaymentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub collected_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_late_settlement: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_in_year: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpenseCategory {
    Salary,
    Utility,
    Maintenance,
    Purchase,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseCategory::Salary => "SALARY",
            ExpenseCategory::Utility => "UTILITY",
            ExpenseCategory::Maintenance => "MAINTENANCE",
            ExpenseCategory::Purchase => "PURCHASE",
            ExpenseCategory::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpenseMode {
    Cash,
    Bank,
    Upi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub category: ExpenseCategory,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub expense_date: NaiveDate,
    pub paid_to: String,
    pub mode: ExpenseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemLogEvent {
    AcademicYearClosed,
    BulkPromotionRun,
    FeeStructureActivated,
    BackupRestored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemLog {
    pub id: String,
    pub event: SystemLogEvent,
    pub academic_year: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
