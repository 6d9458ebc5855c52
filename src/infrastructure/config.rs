use crate::domain::segmenter::SegmentPolicy;
use crate::infrastructure::error::CoreError;
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SCHEDULER_JSON: &str = "scheduler.json";
const SERVICES_JSON: &str = "services.json";
const CALENDARS_JSON: &str = "calendars.json";

const DEFAULT_TIMEZONE: &str = "America/Denver";
const DEFAULT_DAY_END: &str = "17:00";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub schema: u8,
}

/// Typed view of `scheduler.json`. Every knob has a default so a freshly
/// seeded config directory works without edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub timezone: Tz,
    pub day_end: NaiveTime,
    pub safety_margin_minutes: i64,
    pub long_block_minutes: i64,
    pub long_gap_minutes: i64,
    pub short_block_minutes: i64,
    pub short_gap_minutes: i64,
    pub approval_delay_seconds: u64,
    pub force_late_afternoon_block: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Denver,
            day_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            safety_margin_minutes: 5,
            long_block_minutes: 50,
            long_gap_minutes: 10,
            short_block_minutes: 25,
            short_gap_minutes: 5,
            approval_delay_seconds: 15,
            force_late_afternoon_block: true,
        }
    }
}

impl SchedulerConfig {
    pub fn segment_policy(&self) -> SegmentPolicy {
        SegmentPolicy {
            long_minutes: self.long_block_minutes,
            long_gap_minutes: self.long_gap_minutes,
            short_minutes: self.short_block_minutes,
            short_gap_minutes: self.short_gap_minutes,
            force_late_afternoon_block: self.force_late_afternoon_block,
        }
    }
}

/// Typed view of `services.json`: side-effect endpoints for the approval
/// workflow. Empty lists mean the service is unconfigured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicesConfig {
    pub webhook_url: Option<String>,
    pub alarm_endpoints: Vec<String>,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "FocusBlock",
                "timezone": DEFAULT_TIMEZONE
            }),
        ),
        (
            SCHEDULER_JSON,
            serde_json::json!({
                "schema": 1,
                "dayEnd": DEFAULT_DAY_END,
                "safetyMarginMinutes": 5,
                "longBlockMinutes": 50,
                "longGapMinutes": 10,
                "shortBlockMinutes": 25,
                "shortGapMinutes": 5,
                "approvalDelaySeconds": 15,
                "forceLateAfternoonBlock": true
            }),
        ),
        (
            SERVICES_JSON,
            serde_json::json!({
                "schema": 1,
                "webhookUrl": null,
                "alarmEndpoints": []
            }),
        ),
        (
            CALENDARS_JSON,
            serde_json::json!({
                "schema": 1,
                "busyCalendarIds": ["primary"]
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), CoreError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, CoreError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| CoreError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(CoreError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_string(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(ToOwned::to_owned)
}

fn read_minutes(value: &serde_json::Value, key: &str, fallback: i64) -> i64 {
    value
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .filter(|minutes| *minutes >= 0)
        .unwrap_or(fallback)
}

pub fn load_scheduler_config(config_dir: &Path) -> Result<SchedulerConfig, CoreError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let scheduler = read_config(&config_dir.join(SCHEDULER_JSON))?;
    let defaults = SchedulerConfig::default();

    let timezone_raw = read_string(&app, "timezone").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone: Tz = timezone_raw
        .parse()
        .map_err(|_| CoreError::InvalidConfig(format!("unknown timezone '{timezone_raw}'")))?;

    let day_end_raw =
        read_string(&scheduler, "dayEnd").unwrap_or_else(|| DEFAULT_DAY_END.to_string());
    let day_end = NaiveTime::parse_from_str(&day_end_raw, "%H:%M")
        .map_err(|error| CoreError::InvalidConfig(format!("invalid dayEnd '{day_end_raw}': {error}")))?;

    let approval_delay_seconds = scheduler
        .get("approvalDelaySeconds")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(defaults.approval_delay_seconds);

    Ok(SchedulerConfig {
        timezone,
        day_end,
        safety_margin_minutes: read_minutes(
            &scheduler,
            "safetyMarginMinutes",
            defaults.safety_margin_minutes,
        ),
        long_block_minutes: read_minutes(
            &scheduler,
            "longBlockMinutes",
            defaults.long_block_minutes,
        ),
        long_gap_minutes: read_minutes(&scheduler, "longGapMinutes", defaults.long_gap_minutes),
        short_block_minutes: read_minutes(
            &scheduler,
            "shortBlockMinutes",
            defaults.short_block_minutes,
        ),
        short_gap_minutes: read_minutes(&scheduler, "shortGapMinutes", defaults.short_gap_minutes),
        approval_delay_seconds,
        force_late_afternoon_block: scheduler
            .get("forceLateAfternoonBlock")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(defaults.force_late_afternoon_block),
    })
}

pub fn load_services_config(config_dir: &Path) -> Result<ServicesConfig, CoreError> {
    let services = read_config(&config_dir.join(SERVICES_JSON))?;
    let alarm_endpoints = services
        .get("alarmEndpoints")
        .and_then(serde_json::Value::as_array)
        .map(|endpoints| {
            endpoints
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|endpoint| !endpoint.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Ok(ServicesConfig {
        webhook_url: read_string(&services, "webhookUrl"),
        alarm_endpoints,
    })
}

pub fn read_busy_calendar_ids(config_dir: &Path) -> Result<Vec<String>, CoreError> {
    let calendars = read_config(&config_dir.join(CALENDARS_JSON))?;
    Ok(calendars
        .get("busyCalendarIds")
        .and_then(serde_json::Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default())
}
