use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_LOG: &str = "SKAD_LOG";
pub const ENV_WORKSPACE: &str = "SKAD_WORKSPACE";

/// Process-level configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_filter = lookup(ENV_LOG)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        let workspace = lookup(ENV_WORKSPACE)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        Config {
            log_filter,
            workspace,
        }
    }
}

/// Workspace settings persisted under the `settings` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub school: SchoolSettings,
    pub reports: ReportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolSettings {
    pub name: String,
    pub receipt_prefix: String,
    pub currency_symbol: String,
}

impl Default for SchoolSettings {
    fn default() -> Self {
        SchoolSettings {
            name: "Smart Kids Academy".to_string(),
            receipt_prefix: "SKA".to_string(),
            currency_symbol: "₹".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportSettings {
    pub show_generated_at: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            show_generated_at: true,
        }
    }
}
