//! Key/value settings with typed, validated reads.
//!
//! Values are stored as strings in the `settings` table. Reads parse each
//! key; anything unparsable or out of range silently falls back to the
//! default, so a bad row can never take the engine down.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::monitoring::state_machine::StateThresholds;

pub const LOCALES: &[&str] = &["auto", "en", "zh-CN", "zh-TW", "ja", "es"];
pub const OVERVIEW_RANGES: &[&str] = &["24h", "7d"];
pub const MONITOR_RANGES: &[&str] = &["24h", "7d", "30d", "90d"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub site_title: String,
    pub site_description: String,
    pub site_locale: String,
    pub site_timezone: String,

    pub retention_check_results_days: u32,

    pub state_failures_to_down_from_up: u32,
    pub state_successes_to_up_from_down: u32,

    pub admin_default_overview_range: String,
    pub admin_default_monitor_range: String,

    pub uptime_rating_level: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_title: "Uptimer".to_string(),
            site_description: String::new(),
            site_locale: "auto".to_string(),
            site_timezone: "UTC".to_string(),
            retention_check_results_days: 7,
            state_failures_to_down_from_up: 2,
            state_successes_to_up_from_down: 2,
            admin_default_overview_range: "24h".to_string(),
            admin_default_monitor_range: "24h".to_string(),
            uptime_rating_level: 3,
        }
    }
}

impl Settings {
    pub fn state_thresholds(&self) -> StateThresholds {
        StateThresholds {
            failures_to_down: self.state_failures_to_down_from_up,
            successes_to_up: self.state_successes_to_up_from_down,
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsPatch {
    pub site_title: Option<String>,
    pub site_description: Option<String>,
    pub site_locale: Option<String>,
    pub site_timezone: Option<String>,
    pub retention_check_results_days: Option<u32>,
    pub state_failures_to_down_from_up: Option<u32>,
    pub state_successes_to_up_from_down: Option<u32>,
    pub admin_default_overview_range: Option<String>,
    pub admin_default_monitor_range: Option<String>,
    pub uptime_rating_level: Option<u8>,
}

fn parse_int_setting(raw: Option<&String>, min: i64, max: i64) -> Option<i64> {
    let n: i64 = raw?.trim().parse().ok()?;
    if n < min || n > max {
        return None;
    }
    Some(n)
}

fn parse_string_setting(raw: Option<&String>, max: usize, allow_empty: bool) -> Option<String> {
    let s = raw?;
    if !allow_empty && s.is_empty() {
        return None;
    }
    if s.chars().count() > max {
        return None;
    }
    Some(s.clone())
}

fn parse_enum_setting(raw: Option<&String>, allowed: &[&str]) -> Option<String> {
    let s = raw?;
    allowed.contains(&s.as_str()).then(|| s.clone())
}

/// Read all settings, applying defaults and validation per key.
pub async fn read_settings(db: &dyn Database) -> Result<Settings> {
    let rows = db.read_setting_rows().await?;
    let map: std::collections::HashMap<String, String> = rows.into_iter().collect();
    let defaults = Settings::default();

    Ok(Settings {
        site_title: parse_string_setting(map.get("site_title"), 100, false)
            .unwrap_or(defaults.site_title),
        site_description: parse_string_setting(map.get("site_description"), 500, true)
            .unwrap_or(defaults.site_description),
        site_locale: parse_enum_setting(map.get("site_locale"), LOCALES)
            .unwrap_or(defaults.site_locale),
        site_timezone: parse_string_setting(map.get("site_timezone"), 64, false)
            .unwrap_or(defaults.site_timezone),
        retention_check_results_days: parse_int_setting(
            map.get("retention_check_results_days"),
            1,
            365,
        )
        .map(|n| n as u32)
        .unwrap_or(defaults.retention_check_results_days),
        state_failures_to_down_from_up: parse_int_setting(
            map.get("state_failures_to_down_from_up"),
            1,
            10,
        )
        .map(|n| n as u32)
        .unwrap_or(defaults.state_failures_to_down_from_up),
        state_successes_to_up_from_down: parse_int_setting(
            map.get("state_successes_to_up_from_down"),
            1,
            10,
        )
        .map(|n| n as u32)
        .unwrap_or(defaults.state_successes_to_up_from_down),
        admin_default_overview_range: parse_enum_setting(
            map.get("admin_default_overview_range"),
            OVERVIEW_RANGES,
        )
        .unwrap_or(defaults.admin_default_overview_range),
        admin_default_monitor_range: parse_enum_setting(
            map.get("admin_default_monitor_range"),
            MONITOR_RANGES,
        )
        .unwrap_or(defaults.admin_default_monitor_range),
        uptime_rating_level: parse_int_setting(map.get("uptime_rating_level"), 1, 5)
            .map(|n| n as u8)
            .unwrap_or(defaults.uptime_rating_level),
    })
}

fn validate_patch(patch: &SettingsPatch) -> AppResult<Vec<(&'static str, String)>> {
    let mut pairs: Vec<(&'static str, String)> = Vec::new();

    if let Some(v) = &patch.site_title {
        if v.is_empty() || v.chars().count() > 100 {
            return Err(AppError::invalid_argument("site_title must be 1-100 characters"));
        }
        pairs.push(("site_title", v.clone()));
    }
    if let Some(v) = &patch.site_description {
        if v.chars().count() > 500 {
            return Err(AppError::invalid_argument("site_description must be at most 500 characters"));
        }
        pairs.push(("site_description", v.clone()));
    }
    if let Some(v) = &patch.site_locale {
        if !LOCALES.contains(&v.as_str()) {
            return Err(AppError::invalid_argument("site_locale is not a supported locale"));
        }
        pairs.push(("site_locale", v.clone()));
    }
    if let Some(v) = &patch.site_timezone {
        if v.is_empty() || v.chars().count() > 64 {
            return Err(AppError::invalid_argument("site_timezone must be 1-64 characters"));
        }
        pairs.push(("site_timezone", v.clone()));
    }
    if let Some(v) = patch.retention_check_results_days {
        if !(1..=365).contains(&v) {
            return Err(AppError::invalid_argument(
                "retention_check_results_days must be between 1 and 365",
            ));
        }
        pairs.push(("retention_check_results_days", v.to_string()));
    }
    if let Some(v) = patch.state_failures_to_down_from_up {
        if !(1..=10).contains(&v) {
            return Err(AppError::invalid_argument(
                "state_failures_to_down_from_up must be between 1 and 10",
            ));
        }
        pairs.push(("state_failures_to_down_from_up", v.to_string()));
    }
    if let Some(v) = patch.state_successes_to_up_from_down {
        if !(1..=10).contains(&v) {
            return Err(AppError::invalid_argument(
                "state_successes_to_up_from_down must be between 1 and 10",
            ));
        }
        pairs.push(("state_successes_to_up_from_down", v.to_string()));
    }
    if let Some(v) = &patch.admin_default_overview_range {
        if !OVERVIEW_RANGES.contains(&v.as_str()) {
            return Err(AppError::invalid_argument("admin_default_overview_range must be 24h or 7d"));
        }
        pairs.push(("admin_default_overview_range", v.clone()));
    }
    if let Some(v) = &patch.admin_default_monitor_range {
        if !MONITOR_RANGES.contains(&v.as_str()) {
            return Err(AppError::invalid_argument(
                "admin_default_monitor_range must be one of 24h, 7d, 30d, 90d",
            ));
        }
        pairs.push(("admin_default_monitor_range", v.clone()));
    }
    if let Some(v) = patch.uptime_rating_level {
        if !(1..=5).contains(&v) {
            return Err(AppError::invalid_argument("uptime_rating_level must be between 1 and 5"));
        }
        pairs.push(("uptime_rating_level", v.to_string()));
    }

    if pairs.is_empty() {
        return Err(AppError::invalid_argument("At least one field must be provided"));
    }

    Ok(pairs)
}

/// Validate and apply a settings patch.
pub async fn patch_settings(db: &dyn Database, patch: &SettingsPatch) -> AppResult<()> {
    let pairs = validate_patch(patch)?;
    for (key, value) in pairs {
        db.upsert_setting(key, &value).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::tests::test_db;

    #[tokio::test]
    async fn defaults_when_table_is_empty() {
        let (_dir, db) = test_db().await;
        let settings = read_settings(&db).await.unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.state_thresholds(), StateThresholds::default());
    }

    #[tokio::test]
    async fn out_of_range_values_fall_back_to_defaults() {
        let (_dir, db) = test_db().await;
        db.upsert_setting("retention_check_results_days", "0").await.unwrap();
        db.upsert_setting("state_failures_to_down_from_up", "99").await.unwrap();
        db.upsert_setting("site_locale", "klingon").await.unwrap();
        db.upsert_setting("uptime_rating_level", "not-a-number").await.unwrap();

        let settings = read_settings(&db).await.unwrap();
        assert_eq!(settings.retention_check_results_days, 7);
        assert_eq!(settings.state_failures_to_down_from_up, 2);
        assert_eq!(settings.site_locale, "auto");
        assert_eq!(settings.uptime_rating_level, 3);
    }

    #[tokio::test]
    async fn patch_round_trips_through_storage() {
        let (_dir, db) = test_db().await;

        let patch = SettingsPatch {
            site_title: Some("My Status Page".to_string()),
            state_failures_to_down_from_up: Some(3),
            state_successes_to_up_from_down: Some(1),
            retention_check_results_days: Some(30),
            ..Default::default()
        };
        patch_settings(&db, &patch).await.unwrap();

        let settings = read_settings(&db).await.unwrap();
        assert_eq!(settings.site_title, "My Status Page");
        assert_eq!(settings.retention_check_results_days, 30);
        assert_eq!(
            settings.state_thresholds(),
            StateThresholds { failures_to_down: 3, successes_to_up: 1 }
        );
        // Untouched keys keep their defaults.
        assert_eq!(settings.site_timezone, "UTC");
    }

    #[tokio::test]
    async fn patch_rejects_invalid_values() {
        let (_dir, db) = test_db().await;

        let empty = SettingsPatch::default();
        let err = patch_settings(&db, &empty).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");

        let bad = SettingsPatch { uptime_rating_level: Some(9), ..Default::default() };
        let err = patch_settings(&db, &bad).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");

        let bad = SettingsPatch { site_title: Some(String::new()), ..Default::default() };
        assert!(patch_settings(&db, &bad).await.is_err());
    }
}
