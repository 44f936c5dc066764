//! Reminder setting database operations.

use rusqlite::{params, OptionalExtension};

use super::records::string_to_checkup_type;
use super::{date_to_string, string_to_date, Database, DbError, DbResult};
use crate::models::{CheckupType, ReminderSetting};

impl Database {
    /// Insert or replace the setting for its checkup type.
    pub fn upsert_reminder_setting(&self, setting: &ReminderSetting) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO reminder_settings (checkup_type, custom_date, is_enabled, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(checkup_type) DO UPDATE SET
                custom_date = excluded.custom_date,
                is_enabled = excluded.is_enabled,
                updated_at = excluded.updated_at
            "#,
            params![
                setting.checkup_type.as_str(),
                setting.custom_date.as_ref().map(date_to_string),
                setting.is_enabled,
                setting.updated_at,
            ],
        )?;
        tracing::info!(
            checkup_type = setting.checkup_type.as_str(),
            enabled = setting.is_enabled,
            "Saved reminder setting"
        );
        Ok(())
    }

    /// Get the setting for a checkup type.
    pub fn get_reminder_setting(
        &self,
        checkup_type: CheckupType,
    ) -> DbResult<Option<ReminderSetting>> {
        self.conn
            .query_row(
                r#"
                SELECT checkup_type, custom_date, is_enabled, updated_at
                FROM reminder_settings
                WHERE checkup_type = ?
                "#,
                [checkup_type.as_str()],
                map_setting_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

fn map_setting_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SettingRow> {
    Ok(SettingRow {
        checkup_type: row.get(0)?,
        custom_date: row.get(1)?,
        is_enabled: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Intermediate row struct for database mapping.
struct SettingRow {
    checkup_type: String,
    custom_date: Option<String>,
    is_enabled: bool,
    updated_at: String,
}

impl TryFrom<SettingRow> for ReminderSetting {
    type Error = DbError;

    fn try_from(row: SettingRow) -> Result<Self, Self::Error> {
        Ok(ReminderSetting {
            checkup_type: string_to_checkup_type(&row.checkup_type)?,
            custom_date: row.custom_date.as_deref().map(string_to_date).transpose()?,
            is_enabled: row.is_enabled,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_upsert_and_get() {
        let db = Database::open_in_memory().unwrap();
        assert!(db
            .get_reminder_setting(CheckupType::Ultrasound)
            .unwrap()
            .is_none());

        let mut setting = ReminderSetting::new(CheckupType::Ultrasound);
        setting.custom_date = NaiveDate::from_ymd_opt(2024, 9, 1);
        setting.is_enabled = true;
        db.upsert_reminder_setting(&setting).unwrap();

        let retrieved = db
            .get_reminder_setting(CheckupType::Ultrasound)
            .unwrap()
            .unwrap();
        assert_eq!(retrieved, setting);

        setting.is_enabled = false;
        setting.custom_date = None;
        db.upsert_reminder_setting(&setting).unwrap();
        let retrieved = db
            .get_reminder_setting(CheckupType::Ultrasound)
            .unwrap()
            .unwrap();
        assert!(!retrieved.is_enabled);
        assert_eq!(retrieved.custom_date, None);
    }
}
