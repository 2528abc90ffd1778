pub mod backup;
pub mod classes;
pub mod core;
pub mod expenses;
pub mod fees;
pub mod ledger;
pub mod logs;
pub mod promotion;
pub mod reports;
pub mod setup;
pub mod students;
pub mod teachers;
pub mod years;
