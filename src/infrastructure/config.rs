use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const REMINDERS_JSON: &str = "reminders.json";

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:4000/api/";

/// Lead times, in minutes before the item's timestamp, at which a local
/// notification fires. Each (item, lead) pair fires at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderThresholds {
    pub task_lead_minutes: Vec<i64>,
    pub event_lead_minutes: Vec<i64>,
}

impl Default for ReminderThresholds {
    fn default() -> Self {
        Self {
            task_lead_minutes: vec![24 * 60, 60],
            event_lead_minutes: vec![30, 10],
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "PlanWise",
                "timezone": "UTC",
                "apiBaseUrl": DEFAULT_API_BASE_URL
            }),
        ),
        (
            REMINDERS_JSON,
            serde_json::json!({
                "schema": 1,
                "taskLeadMinutes": [1440, 60],
                "eventLeadMinutes": [30, 10]
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidInput(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidInput(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Falls back to UTC when the config value is missing or not a known IANA
/// name; local-day arithmetic must always have some timezone to work with.
pub fn read_timezone(config_dir: &Path) -> Result<Tz, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::UTC))
}

pub fn read_api_base_url(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("apiBaseUrl")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_API_BASE_URL)
        .to_string())
}

pub fn read_reminder_thresholds(config_dir: &Path) -> Result<ReminderThresholds, InfraError> {
    let parsed = read_config(&config_dir.join(REMINDERS_JSON))?;
    let mut thresholds = ReminderThresholds::default();

    if let Some(values) = read_lead_minutes(&parsed, "taskLeadMinutes") {
        thresholds.task_lead_minutes = values;
    }
    if let Some(values) = read_lead_minutes(&parsed, "eventLeadMinutes") {
        thresholds.event_lead_minutes = values;
    }
    Ok(thresholds)
}

fn read_lead_minutes(parsed: &serde_json::Value, field: &str) -> Option<Vec<i64>> {
    let values = parsed
        .get(field)?
        .as_array()?
        .iter()
        .filter_map(serde_json::Value::as_i64)
        .filter(|minutes| *minutes > 0)
        .collect::<Vec<_>>();
    if values.is_empty() { None } else { Some(values) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "planwise-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_created_and_readable() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("defaults");

        assert_eq!(read_timezone(&dir.path).expect("timezone"), chrono_tz::UTC);
        assert_eq!(
            read_api_base_url(&dir.path).expect("api base url"),
            DEFAULT_API_BASE_URL
        );
        assert_eq!(
            read_reminder_thresholds(&dir.path).expect("thresholds"),
            ReminderThresholds::default()
        );
    }

    #[test]
    fn configured_timezone_is_parsed() {
        let dir = TempConfigDir::new();
        fs::write(
            dir.path.join(APP_JSON),
            r#"{"schema": 1, "timezone": "America/New_York"}"#,
        )
        .expect("write app.json");
        let tz = read_timezone(&dir.path).expect("timezone");
        assert_eq!(tz.name(), "America/New_York");
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let dir = TempConfigDir::new();
        fs::write(
            dir.path.join(APP_JSON),
            r#"{"schema": 1, "timezone": "Mars/Olympus"}"#,
        )
        .expect("write app.json");
        assert_eq!(read_timezone(&dir.path).expect("timezone"), chrono_tz::UTC);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempConfigDir::new();
        fs::write(dir.path.join(APP_JSON), r#"{"schema": 2}"#).expect("write app.json");
        assert!(read_timezone(&dir.path).is_err());
    }

    #[test]
    fn non_positive_lead_minutes_are_ignored() {
        let dir = TempConfigDir::new();
        fs::write(
            dir.path.join(REMINDERS_JSON),
            r#"{"schema": 1, "taskLeadMinutes": [0, -5], "eventLeadMinutes": [15]}"#,
        )
        .expect("write reminders.json");
        let thresholds = read_reminder_thresholds(&dir.path).expect("thresholds");
        assert_eq!(
            thresholds.task_lead_minutes,
            ReminderThresholds::default().task_lead_minutes
        );
        assert_eq!(thresholds.event_lead_minutes, vec![15]);
    }
}
