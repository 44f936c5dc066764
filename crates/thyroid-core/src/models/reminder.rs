//! Per-type reminder settings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::checkup::CheckupType;

/// Reminder override for one checkup type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderSetting {
    pub checkup_type: CheckupType,
    /// User-chosen due date
    pub custom_date: Option<NaiveDate>,
    /// The custom date only applies while enabled
    pub is_enabled: bool,
    /// Last update timestamp
    pub updated_at: String,
}

impl ReminderSetting {
    pub fn new(checkup_type: CheckupType) -> Self {
        Self {
            checkup_type,
            custom_date: None,
            is_enabled: false,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// The override date, if it is in effect.
    pub fn effective_custom_date(&self) -> Option<NaiveDate> {
        if self.is_enabled {
            self.custom_date
        } else {
            None
        }
    }
}
