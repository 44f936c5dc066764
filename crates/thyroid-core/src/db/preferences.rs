//! Key/value preferences (usage counters, reminder preferences).

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Database, DbResult};

/// Free-tier record counter mirror.
pub const PREF_RECORD_COUNT: &str = "usage.record_count";
/// Free-tier export counter.
pub const PREF_EXPORT_COUNT: &str = "usage.export_count";
/// Reminder lead days chosen by the user.
pub const PREF_REMINDER_LEAD_DAYS: &str = "reminder.lead_days";
/// Master switch for checkup reminders.
pub const PREF_NOTIFICATIONS_ENABLED: &str = "reminder.notifications_enabled";

impl Database {
    /// Read a preference, `None` when unset.
    pub fn get_preference<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM preferences WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write a preference as JSON.
    pub fn set_preference<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            r#"
            INSERT INTO preferences (key, value, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, json],
        )?;
        tracing::debug!(key, "Preference updated");
        Ok(())
    }

    /// Remove a preference.
    pub fn delete_preference(&self, key: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM preferences WHERE key = ?", [key])?;
        Ok(rows_affected > 0)
    }
}
