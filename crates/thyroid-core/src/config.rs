//! Tracker configuration.
//!
//! Read once when the core is opened. Runtime preferences stored in the
//! database (reminder lead days, notifications on/off) take precedence over
//! the matching defaults here.

use serde::{Deserialize, Serialize};
use thyroid_ocr::DateExtractor;

/// Core configuration, deserialized from JSON. Missing keys take defaults;
/// unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Days before the due date a reminder fires
    pub reminder_lead_days: u32,
    /// Local hour (0-23) reminders fire at
    pub reminder_hour: u32,
    /// Records allowed without an entitlement
    pub max_free_records: u32,
    /// Exports allowed without an entitlement
    pub max_free_exports: u32,
    /// Report dates may lie at most this many days in the future
    pub date_max_future_days: u32,
    /// Report dates may lie at most this many years in the past
    pub date_max_past_years: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reminder_lead_days: 3,
            reminder_hour: 9,
            max_free_records: 10,
            max_free_exports: 3,
            date_max_future_days: 2,
            date_max_past_years: 15,
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        if config.reminder_hour > 23 {
            return Err(serde::de::Error::custom(format!(
                "reminder_hour must be 0-23, got {}",
                config.reminder_hour
            )));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Date extractor using this config's plausibility window.
    pub fn date_extractor(&self) -> DateExtractor {
        DateExtractor::new(
            u64::from(self.date_max_future_days),
            self.date_max_past_years,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = TrackerConfig::from_json("{}").unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = TrackerConfig::from_json(r#"{"reminder_lead_days": 7}"#).unwrap();
        assert_eq!(config.reminder_lead_days, 7);
        assert_eq!(config.max_free_records, 10);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(TrackerConfig::from_json(r#"{"lead": 7}"#).is_err());
    }

    #[test]
    fn test_hour_validated() {
        assert!(TrackerConfig::from_json(r#"{"reminder_hour": 24}"#).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = TrackerConfig {
            max_free_exports: 5,
            ..TrackerConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(TrackerConfig::from_json(&json).unwrap(), config);
    }
}
