use crate::domain::time::DisplayZone;
use crate::infrastructure::error::InfraError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use url::Url;

const APP_JSON: &str = "app.json";
const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_TOKEN_SERVICE: &str = "appointment-scheduler";
const DEFAULT_TOKEN_ACCOUNT: &str = "token";
const DEFAULT_DURATION_MINUTES: i64 = 60;
const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;

const ENV_API_BASE_URL: &str = "SCHEDULER_API_BASE_URL";
const ENV_TIMEZONE: &str = "SCHEDULER_TIMEZONE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: Url,
    pub display_zone: DisplayZone,
    pub token_service: String,
    pub token_account: String,
    pub refetch_after_mutation: bool,
    pub default_duration_minutes: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppConfigFile {
    api_base_url: Option<String>,
    timezone: Option<String>,
    token_service: Option<String>,
    token_account: Option<String>,
    refetch_after_mutation: Option<bool>,
    default_duration_minutes: Option<i64>,
}

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "apiBaseUrl": DEFAULT_API_BASE_URL,
        "timezone": "UTC",
        "tokenService": DEFAULT_TOKEN_SERVICE,
        "tokenAccount": DEFAULT_TOKEN_ACCOUNT,
        "refetchAfterMutation": true,
        "defaultDurationMinutes": DEFAULT_DURATION_MINUTES
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<AppConfigFile, InfraError> {
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
    Ok(serde_json::from_value(parsed)?)
}

pub fn load_config(config_dir: &Path) -> Result<ClientConfig, InfraError> {
    load_config_with_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn load_config_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<ClientConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let file = read_config(&config_dir.join(APP_JSON))?;
    let api_base_url = lookup_value(&lookup, ENV_API_BASE_URL)
        .or_else(|| non_empty(file.api_base_url))
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    let timezone = lookup_value(&lookup, ENV_TIMEZONE)
        .or_else(|| non_empty(file.timezone))
        .unwrap_or_else(|| "UTC".to_string());

    let default_duration_minutes = file
        .default_duration_minutes
        .unwrap_or(DEFAULT_DURATION_MINUTES);
    if !(1..=MAX_DURATION_MINUTES).contains(&default_duration_minutes) {
        return Err(InfraError::InvalidConfig(format!(
            "defaultDurationMinutes must be between 1 and {MAX_DURATION_MINUTES}"
        )));
    }

    Ok(ClientConfig {
        api_base_url: parse_base_url(&api_base_url)?,
        display_zone: DisplayZone::parse(&timezone)
            .map_err(|error| InfraError::InvalidConfig(error.to_string()))?,
        token_service: non_empty(file.token_service)
            .unwrap_or_else(|| DEFAULT_TOKEN_SERVICE.to_string()),
        token_account: non_empty(file.token_account)
            .unwrap_or_else(|| DEFAULT_TOKEN_ACCOUNT.to_string()),
        refetch_after_mutation: file.refetch_after_mutation.unwrap_or(true),
        default_duration_minutes,
    })
}

fn parse_base_url(value: &str) -> Result<Url, InfraError> {
    // a trailing slash keeps Url::join from dropping the last path segment
    let normalized = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    };
    let url = Url::parse(&normalized).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid apiBaseUrl '{value}': {error}"))
    })?;
    if url.cannot_be_a_base() {
        return Err(InfraError::InvalidConfig(format!(
            "apiBaseUrl '{value}' cannot be a base"
        )));
    }
    Ok(url)
}

fn lookup_value<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup(key))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
