//! Engine configuration and its environment overrides.

use std::collections::HashSet;
use std::env;
use std::ops::RangeInclusive;

use chrono_tz::Tz;

use crate::features::FeatureError;
use crate::schema::FEATURE_SCHEMA_VERSION;

pub const DEFAULT_SLA_HOURS: f64 = 72.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEngineConfig {
    pub window_days: Vec<u32>,
    /// Short and long window of the volume ratio feature.
    pub ratio_windows: (u32, u32),
    pub sla_hours: f64,
    pub business_hours: RangeInclusive<u32>,
    pub calendar_tz: Tz,
    pub schema_version: u32,
}

impl Default for FeatureEngineConfig {
    fn default() -> Self {
        Self {
            window_days: vec![3, 7, 14],
            ratio_windows: (3, 7),
            sla_hours: DEFAULT_SLA_HOURS,
            business_hours: 9..=17,
            calendar_tz: Tz::UTC,
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

impl FeatureEngineConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.window_days.is_empty() {
            return Err(FeatureError::InvalidConfig(
                "at least one rolling window must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for window in &self.window_days {
            if *window == 0 {
                return Err(FeatureError::InvalidConfig(
                    "window_days entries must be > 0".to_string(),
                ));
            }
            if !seen.insert(*window) {
                return Err(FeatureError::InvalidConfig(
                    "window_days entries must be unique".to_string(),
                ));
            }
        }

        let (short, long) = self.ratio_windows;
        if !seen.contains(&short) || !seen.contains(&long) {
            return Err(FeatureError::InvalidConfig(format!(
                "ratio windows ({short}d, {long}d) must both be configured rolling windows"
            )));
        }

        if !(self.sla_hours.is_finite() && self.sla_hours > 0.0) {
            return Err(FeatureError::InvalidConfig(
                "sla_hours must be a positive number".to_string(),
            ));
        }

        if self.business_hours.is_empty() || *self.business_hours.end() > 23 {
            return Err(FeatureError::InvalidConfig(
                "business_hours must be a non-empty range within 0..=23".to_string(),
            ));
        }

        if self.schema_version != FEATURE_SCHEMA_VERSION {
            return Err(FeatureError::InvalidConfig(format!(
                "schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
            )));
        }

        Ok(())
    }

    pub fn window_ms(window_days: u32) -> i64 {
        i64::from(window_days) * 86_400_000
    }
}

pub fn engine_config_from_env() -> FeatureEngineConfig {
    let mut config = FeatureEngineConfig::default();

    if let Ok(raw) = env::var("CIVICOPS_WINDOW_DAYS") {
        if let Some(windows) = parse_window_list(&raw) {
            config.window_days = windows;
        }
    }

    if let Ok(raw) = env::var("CIVICOPS_CALENDAR_TZ") {
        if let Ok(tz) = raw.trim().parse::<Tz>() {
            config.calendar_tz = tz;
        }
    }

    if let Ok(raw) = env::var("CIVICOPS_SLA_HOURS") {
        if let Ok(hours) = raw.trim().parse::<f64>() {
            config.sla_hours = hours;
        }
    }

    config
}

fn parse_window_list(raw: &str) -> Option<Vec<u32>> {
    let windows: Option<Vec<u32>> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u32>().ok())
        .collect();
    windows.filter(|list| !list.is_empty())
}
