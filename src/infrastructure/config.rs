use crate::infrastructure::error::PlannerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const PLANNER_JSON: &str = "planner.json";

const DEFAULT_CASCADE_PREVIEW_LIMIT: usize = 5;
const DEFAULT_PATTERN_LABEL: &str = "Plan A";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub planner: serde_json::Value,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Tripweave",
                "defaultPatternLabel": DEFAULT_PATTERN_LABEL
            }),
        ),
        (
            PLANNER_JSON,
            serde_json::json!({
                "schema": 1,
                "cascadePreviewLimit": DEFAULT_CASCADE_PREVIEW_LIMIT,
                "autoStatusEnabled": true
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), PlannerError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, PlannerError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| {
            PlannerError::InvalidInput(format!("missing schema in {}", path.display()))
        })?;
    if schema != 1 {
        return Err(PlannerError::InvalidInput(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, PlannerError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        planner: read_config(&config_dir.join(PLANNER_JSON))?,
    })
}

/// How many before/after rows a cascade preview shows before collapsing the
/// rest into a "+N more" summary.
pub fn read_cascade_preview_limit(config_dir: &Path) -> usize {
    read_config(&config_dir.join(PLANNER_JSON))
        .ok()
        .and_then(|planner| {
            planner
                .get("cascadePreviewLimit")
                .and_then(serde_json::Value::as_u64)
        })
        .map(|value| value as usize)
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_CASCADE_PREVIEW_LIMIT)
}

pub fn read_auto_status_enabled(config_dir: &Path) -> bool {
    read_config(&config_dir.join(PLANNER_JSON))
        .ok()
        .and_then(|planner| {
            planner
                .get("autoStatusEnabled")
                .and_then(serde_json::Value::as_bool)
        })
        .unwrap_or(true)
}

pub fn read_default_pattern_label(config_dir: &Path) -> Result<String, PlannerError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let label = app
        .get("defaultPatternLabel")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_PATTERN_LABEL);
    Ok(label.to_string())
}
