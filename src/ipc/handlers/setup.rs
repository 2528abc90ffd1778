use crate::config::Settings;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{to_value, with_school};
use crate::ipc::types::{AppState, Request};
use crate::store::keys;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    School,
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    settings: &mut Settings,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    for (k, v) in patch {
        match section {
            SetupSection::School => match k.as_str() {
                "name" => settings.school.name = parse_string_max(v, k, 120)?,
                "receiptPrefix" => {
                    let p = parse_string_max(v, k, 12)?.to_ascii_uppercase();
                    if !p.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                        return Err("receiptPrefix may only contain letters, digits and '-'".into());
                    }
                    settings.school.receipt_prefix = p;
                }
                "currencySymbol" => settings.school.currency_symbol = parse_string_max(v, k, 8)?,
                _ => return Err(format!("unknown school field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "showGeneratedAt" => settings.reports.show_generated_at = parse_bool(v, k)?,
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| to_value(&school.settings))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    with_school(state, req, |school, _, _| {
        let section_raw = req
            .params
            .get("section")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
        let section =
            SetupSection::parse(section_raw).ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
        let patch = req
            .params
            .get("patch")
            .and_then(|v| v.as_object())
            .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

        // Validate the whole patch before touching the stored settings.
        let mut next = school.settings.clone();
        merge_section_patch(section, &mut next, patch).map_err(HandlerErr::bad_params)?;
        if next != school.settings {
            school.settings = next;
            school.touch(keys::SETTINGS);
        }
        Ok(json!({ "settings": to_value(&school.settings)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
