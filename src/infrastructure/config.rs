use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_STORAGE_SCOPE: &str = "web";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub api_url: Option<String>,
    pub storage_scope: String,
    pub sync_on_load: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: Some(DEFAULT_API_URL.to_string()),
            storage_scope: DEFAULT_STORAGE_SCOPE.to_string(),
            sync_on_load: true,
        }
    }
}

/// Writes the default `app.json` unless one already exists.
pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    if config_dir.join(APP_JSON).exists() {
        return Ok(());
    }
    save_app_config(config_dir, &AppConfig::default())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_trimmed(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

/// Reads `app.json`. A blank or null `apiUrl` disables remote sync; a blank scope falls
/// back to the default one.
pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let defaults = AppConfig::default();
    let api_url = match app.get("apiUrl") {
        None => defaults.api_url,
        Some(_) => read_trimmed(&app, "apiUrl"),
    };
    Ok(AppConfig {
        api_url,
        storage_scope: read_trimmed(&app, "storageScope").unwrap_or(defaults.storage_scope),
        sync_on_load: app
            .get("syncOnLoad")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(defaults.sync_on_load),
    })
}

pub fn save_app_config(config_dir: &Path, config: &AppConfig) -> Result<(), InfraError> {
    let mut value = serde_json::to_value(config)?;
    let object = value.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig("app config did not serialize to an object".to_string())
    })?;
    object.insert("schema".to_string(), serde_json::json!(1));
    let formatted = serde_json::to_string_pretty(&value)?;
    fs::write(config_dir.join(APP_JSON), format!("{formatted}\n"))?;
    Ok(())
}
