use crate::error::Error;
use crate::model::*;
use crate::school::new_id;
use crate::store::{self, keys};
use crate::years;
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const BACKUP_APP: &str = "SKA-School-Management";
pub const BACKUP_VERSION: u32 = 1;

/// Keys carried by a backup document, in export order.
pub const BACKUP_KEYS: [&str; 10] = [
    keys::ACADEMIC_YEAR,
    keys::STUDENTS,
    keys::TEACHERS,
    keys::CLASSES,
    keys::SECTIONS,
    keys::FEE_STRUCTURES,
    keys::LEDGERS,
    keys::ADJUSTMENTS,
    keys::PAYMENTS,
    keys::EXPENSES,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMeta {
    pub app: String,
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub meta: BackupMeta,
    pub data: Map<String, Value>,
}

/// Hex SHA-256 over the compact JSON of `data`. Object keys serialize in
/// sorted order, so the digest does not depend on the caller's key order.
pub fn checksum(data: &Map<String, Value>) -> anyhow::Result<String> {
    let text = serde_json::to_string(data).context("failed to serialize backup data")?;
    Ok(format!("{:x}", Sha256::digest(text.as_bytes())))
}

pub fn export_document(conn: &Connection, now: DateTime<Utc>) -> anyhow::Result<BackupDocument> {
    let mut data = Map::new();
    for key in BACKUP_KEYS {
        let value = match store::get_raw(conn, key)? {
            Some(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("stored value for {} is not valid JSON", key))?,
            None => Value::Null,
        };
        data.insert(key.to_string(), value);
    }
    let checksum = checksum(&data)?;
    Ok(BackupDocument {
        meta: BackupMeta {
            app: BACKUP_APP.to_string(),
            version: BACKUP_VERSION,
            exported_at: now,
            checksum: Some(checksum),
        },
        data,
    })
}

fn check_shape<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> Result<(), Error> {
    serde_json::from_value::<T>(value.clone())
        .map(|_| ())
        .map_err(|e| Error::BadInput(format!("backup key {} is malformed: {}", key, e)))
}

/// Parses and checks a backup document without touching the store.
pub fn validate_document(value: &Value) -> Result<BackupDocument, Error> {
    let doc: BackupDocument = serde_json::from_value(value.clone())
        .map_err(|e| Error::BadInput(format!("not a backup document: {}", e)))?;
    if doc.meta.app != BACKUP_APP {
        return Err(Error::BadInput(format!("backup was made by {}", doc.meta.app)));
    }
    if doc.meta.version > BACKUP_VERSION {
        return Err(Error::BadInput(format!(
            "backup version {} is newer than supported version {}",
            doc.meta.version, BACKUP_VERSION
        )));
    }
    if let Some(expected) = doc.meta.checksum.as_deref() {
        let actual = checksum(&doc.data).map_err(|e| Error::BadInput(e.to_string()))?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::BadInput("backup checksum does not match its data".into()));
        }
    }
    for (key, value) in doc.data.iter().filter(|(_, v)| !v.is_null()) {
        match key.as_str() {
            keys::ACADEMIC_YEAR => {
                let label: String = serde_json::from_value(value.clone())
                    .map_err(|e| Error::BadInput(format!("backup key {} is malformed: {}", key, e)))?;
                if years::parse_start(&label).is_none() {
                    return Err(Error::BadInput(format!("invalid academic year in backup: {}", label)));
                }
            }
            keys::STUDENTS => check_shape::<Vec<Student>>(key, value)?,
            keys::TEACHERS => check_shape::<Vec<Teacher>>(key, value)?,
            keys::CLASSES => check_shape::<Vec<SchoolClass>>(key, value)?,
            keys::SECTIONS => check_shape::<Vec<Section>>(key, value)?,
            keys::FEE_STRUCTURES => check_shape::<Vec<FeeStructure>>(key, value)?,
            keys::LEDGERS => check_shape::<Vec<FeeLedger>>(key, value)?,
            keys::ADJUSTMENTS => check_shape::<Vec<LedgerAdjustment>>(key, value)?,
            keys::PAYMENTS => check_shape::<Vec<Payment>>(key, value)?,
            keys::EXPENSES => check_shape::<Vec<Expense>>(key, value)?,
            _ => {}
        }
    }
    Ok(doc)
}

/// Keys a restore of `doc` would overwrite.
pub fn restorable_keys(doc: &BackupDocument) -> Vec<&'static str> {
    BACKUP_KEYS
        .iter()
        .copied()
        .filter(|k| doc.data.get(*k).is_some_and(|v| !v.is_null()))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub restored_keys: Vec<&'static str>,
    pub academic_year: String,
}

/// Overwrites every non-null listed key and appends a `BACKUP_RESTORED` log
/// entry, all in one transaction. Keys absent from the document keep their
/// current values.
pub fn restore_document(conn: &Connection, doc: &BackupDocument, now: DateTime<Utc>) -> anyhow::Result<RestoreSummary> {
    let restored_keys = restorable_keys(doc);
    let mut entries: Vec<(&str, Value)> = restored_keys
        .iter()
        .filter_map(|k| doc.data.get(*k).map(|v| (*k, v.clone())))
        .collect();

    let academic_year = match doc.data.get(keys::ACADEMIC_YEAR).and_then(Value::as_str) {
        Some(y) => y.to_string(),
        None => store::load_or(
            conn,
            keys::ACADEMIC_YEAR,
            years::academic_year_for_date(now.date_naive()),
        )?,
    };
    let mut logs: Vec<SystemLog> = store::load_or(conn, keys::SYSTEM_LOGS, Vec::new())?;
    logs.push(SystemLog {
        id: new_id(),
        event: SystemLogEvent::BackupRestored,
        academic_year: academic_year.clone(),
        timestamp: now,
        details: Some(format!(
            "restored {} keys from backup exported {}",
            restored_keys.len(),
            doc.meta.exported_at.to_rfc3339()
        )),
    });
    entries.push((
        keys::SYSTEM_LOGS,
        serde_json::to_value(&logs).context("failed to serialize system logs")?,
    ));
    store::write_batch(conn, &entries).context("failed to restore backup")?;

    tracing::info!(keys = restored_keys.len(), academic_year = %academic_year, "backup restored");
    Ok(RestoreSummary {
        restored_keys,
        academic_year,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        store::init_schema(&conn).expect("schema");
        conn
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-15T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    #[test]
    fn export_covers_fixed_keys_with_nulls() {
        let conn = mem();
        store::write_batch(&conn, &[(keys::ACADEMIC_YEAR, json!("2025-26"))]).expect("write");
        let doc = export_document(&conn, now()).expect("export");
        assert_eq!(doc.meta.app, BACKUP_APP);
        assert_eq!(doc.data.len(), BACKUP_KEYS.len());
        assert_eq!(doc.data[keys::ACADEMIC_YEAR], json!("2025-26"));
        assert!(doc.data[keys::STUDENTS].is_null());
        assert_eq!(doc.meta.checksum, Some(checksum(&doc.data).expect("checksum")));
    }

    #[test]
    fn tampered_data_fails_checksum() {
        let conn = mem();
        store::write_batch(&conn, &[(keys::EXPENSES, json!([]))]).expect("write");
        let doc = export_document(&conn, now()).expect("export");
        let mut value = serde_json::to_value(&doc).expect("to value");
        assert!(validate_document(&value).is_ok());

        value["data"][keys::ACADEMIC_YEAR] = json!("2030-31");
        assert!(matches!(validate_document(&value), Err(Error::BadInput(_))));

        value["meta"]["checksum"] = Value::Null;
        assert!(validate_document(&value).is_ok());
    }

    #[test]
    fn foreign_or_malformed_documents_are_rejected() {
        let foreign = json!({
            "meta": {"app": "Other", "version": 1, "exportedAt": "2026-01-01T00:00:00Z"},
            "data": {}
        });
        assert!(validate_document(&foreign).is_err());
        let malformed = json!({
            "meta": {"app": BACKUP_APP, "version": 1, "exportedAt": "2026-01-01T00:00:00Z"},
            "data": {"students": [{"id": 5}]}
        });
        assert!(validate_document(&malformed).is_err());
    }

    #[test]
    fn restore_overwrites_present_keys_and_logs() {
        let conn = mem();
        store::write_batch(
            &conn,
            &[
                (keys::ACADEMIC_YEAR, json!("2025-26")),
                (keys::TEACHERS, json!([])),
                (keys::EXPENSES, json!([{"bogus": true}])),
            ],
        )
        .expect("seed");
        let doc = validate_document(&json!({
            "meta": {"app": BACKUP_APP, "version": 1, "exportedAt": "2025-12-01T00:00:00Z"},
            "data": {"academicYear": "2024-25", "expenses": [], "teachers": null}
        }))
        .expect("valid");

        let summary = restore_document(&conn, &doc, now()).expect("restore");
        assert_eq!(summary.restored_keys, vec![keys::ACADEMIC_YEAR, keys::EXPENSES]);
        assert_eq!(store::get_raw(&conn, keys::EXPENSES).expect("read").as_deref(), Some("[]"));
        assert_eq!(store::get_raw(&conn, keys::TEACHERS).expect("read").as_deref(), Some("[]"));

        let logs: Vec<SystemLog> = store::load_or(&conn, keys::SYSTEM_LOGS, Vec::new()).expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event, SystemLogEvent::BackupRestored);
        assert_eq!(logs[0].academic_year, "2024-25");
    }
}
