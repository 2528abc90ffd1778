use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;

pub const DB_FILE: &str = "skad.sqlite3";

/// Fixed keys each top-level collection is stored under.
pub mod keys {
    pub const ACADEMIC_YEAR: &str = "academicYear";
    pub const ACADEMIC_YEAR_META: &str = "academicYearMeta";
    pub const PROMOTION_LOCKED: &str = "promotionLocked";
    pub const PROMOTION_SUMMARY: &str = "promotionSummary";
    pub const AUTO_PROMOTION_REQUEST: &str = "autoPromotionRequest";
    pub const CLASSES: &str = "classes";
    pub const SECTIONS: &str = "sections";
    pub const STUDENTS: &str = "students";
    pub const TEACHERS: &str = "teachers";
    pub const FEE_STRUCTURES: &str = "feeStructures";
    pub const LEDGERS: &str = "ledgers";
    pub const ADJUSTMENTS: &str = "adjustments";
    pub const PAYMENTS: &str = "payments";
    pub const EXPENSES: &str = "expenses";
    pub const SYSTEM_LOGS: &str = "systemLogs";
    pub const SETTINGS: &str = "settings";
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub fn get_raw(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let v = conn
        .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |r| {
            r.get::<_, String>(0)
        })
        .optional()
        .with_context(|| format!("failed to read key {}", key))?;
    Ok(v)
}

/// Reads `key` as JSON. A missing key or an unreadable value falls back to
/// `default`; the stored value is left as is until the next write.
pub fn load_or<T: DeserializeOwned>(conn: &Connection, key: &str, default: T) -> anyhow::Result<T> {
    let Some(raw) = get_raw(conn, key)? else {
        return Ok(default);
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(v) => Ok(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "stored value is not readable, using default");
            Ok(default)
        }
    }
}

/// Writes every entry in a single transaction.
pub fn write_batch(conn: &Connection, entries: &[(&str, serde_json::Value)]) -> anyhow::Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let now = Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .context("failed to start transaction")?;
    for (key, value) in entries {
        let text = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize {}", key))?;
        tx.execute(
            "INSERT INTO kv_store(key, value, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, &text, &now),
        )
        .with_context(|| format!("failed to write key {}", key))?;
    }
    tx.commit().context("failed to commit")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init_schema(&conn).expect("schema");
        conn
    }

    #[test]
    fn missing_key_yields_default() {
        let conn = mem();
        let v: Vec<String> = load_or(&conn, keys::STUDENTS, vec!["x".into()]).expect("load");
        assert_eq!(v, vec!["x".to_string()]);
    }

    #[test]
    fn batch_write_overwrites_previous_values() {
        let conn = mem();
        write_batch(&conn, &[(keys::ACADEMIC_YEAR, json!("2025-26"))]).expect("write");
        write_batch(
            &conn,
            &[
                (keys::ACADEMIC_YEAR, json!("2026-27")),
                (keys::PROMOTION_LOCKED, json!({ "2025-26": true })),
            ],
        )
        .expect("write");

        let year: String = load_or(&conn, keys::ACADEMIC_YEAR, String::new()).expect("load");
        assert_eq!(year, "2026-27");
        assert_eq!(
            get_raw(&conn, keys::PROMOTION_LOCKED).expect("raw").as_deref(),
            Some("{\"2025-26\":true}")
        );
    }

    #[test]
    fn corrupt_value_falls_back_to_default() {
        let conn = mem();
        conn.execute(
            "INSERT INTO kv_store(key, value, updated_at) VALUES('ledgers', 'not json', '')",
            [],
        )
        .expect("insert");
        let v: Vec<u32> = load_or(&conn, keys::LEDGERS, Vec::new()).expect("load");
        assert!(v.is_empty());
    }
}
