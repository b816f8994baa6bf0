use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

const MIB: i64 = 1024 * 1024;

#[derive(Clone, Copy)]
enum SetupSection {
    Validation,
    Registry,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Validation, SetupSection::Registry];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "validation" => Some(Self::Validation),
            "registry" => Some(Self::Registry),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Registry => "registry",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Validation => "setup.validation",
            Self::Registry => "setup.registry",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Validation => json!({
            "maxFileBytes": 64 * MIB,
            "maxQrImageBytes": 16 * MIB
        }),
        SetupSection::Registry => json!({
            "defaultPageSize": 50,
            "maxPageSize": 500
        }),
    }
}

/// Effective limits used by the validation and document handlers.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_file_bytes: u64,
    pub max_qr_image_bytes: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

pub fn load_limits(conn: &rusqlite::Connection) -> anyhow::Result<Limits> {
    let validation = load_section(conn, SetupSection::Validation)?;
    let registry = load_section(conn, SetupSection::Registry)?;
    let num = |v: &Value, k: &str| v.get(k).and_then(|x| x.as_u64()).unwrap_or(0);
    Ok(Limits {
        max_file_bytes: num(&validation, "maxFileBytes"),
        max_qr_image_bytes: num(&validation, "maxQrImageBytes"),
        default_page_size: num(&registry, "defaultPageSize") as usize,
        max_page_size: num(&registry, "maxPageSize") as usize,
    })
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Validation => match k.as_str() {
                "maxFileBytes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 1024 * MIB)?));
                }
                "maxQrImageBytes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 256 * MIB)?));
                }
                _ => return Err(format!("unknown validation field: {}", k)),
            },
            SetupSection::Registry => match k.as_str() {
                "defaultPageSize" | "maxPageSize" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10_000)?));
                }
                _ => return Err(format!("unknown registry field: {}", k)),
            },
        }
    }

    if let SetupSection::Registry = section {
        let page = obj.get("defaultPageSize").and_then(|v| v.as_i64());
        let max = obj.get("maxPageSize").and_then(|v| v.as_i64());
        if let (Some(page), Some(max)) = (page, max) {
            if page > max {
                return Err("defaultPageSize must not exceed maxPageSize".into());
            }
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values fall back to defaults rather than failing.
            let mut candidate = current.clone();
            if merge_section_patch(section, &mut candidate, saved_obj).is_ok() {
                current = candidate;
            } else {
                tracing::warn!(section = section.name(), "ignoring invalid stored settings");
            }
        }
    }
    Ok(current)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    if let Some(raw) = req.params.get("section").and_then(|v| v.as_str()) {
        let Some(section) = SetupSection::parse(raw) else {
            return err(&req.id, "bad_params", "unknown section", None);
        };
        return match load_section(conn, section) {
            Ok(values) => ok(&req.id, json!({ "section": section.name(), "values": values })),
            Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
        };
    }

    let mut all = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                all.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(all))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.name(), "settings updated");
    ok(&req.id, json!({ "section": section.name(), "values": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
