//! Saving new records with the free-tier gate and same-day duplicate check.

use serde::{Deserialize, Serialize};

use crate::db::{Database, DbResult};
use crate::models::CheckupRecord;
use crate::usage::{UsageGate, UsageLimits};

/// Result of trying to save a new record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    /// Records of the same type already exist on that day. Nothing was
    /// written; save again with confirmation to keep both.
    NeedsConfirmation { existing_ids: Vec<String> },
    /// The free record limit is used up and there is no entitlement.
    LimitReached,
}

/// Save a new record.
///
/// Order of checks: usage limit, then duplicates. A confirmed save always
/// inserts a new row; existing records are never overwritten.
pub fn save_new_record(
    db: &mut Database,
    record: &CheckupRecord,
    confirmed: bool,
    limits: UsageLimits,
    entitled: bool,
) -> DbResult<SaveOutcome> {
    if !UsageGate::new(db, limits).can_add_record(entitled)? {
        tracing::info!(record_id = %record.id, "Free record limit reached");
        return Ok(SaveOutcome::LimitReached);
    }

    let existing_ids = db.find_records_on_day(record.date, record.checkup_type)?;
    if !existing_ids.is_empty() && !confirmed {
        tracing::debug!(
            date = %record.date,
            checkup_type = record.checkup_type.as_str(),
            existing = existing_ids.len(),
            "Same-day record exists, asking for confirmation"
        );
        return Ok(SaveOutcome::NeedsConfirmation { existing_ids });
    }

    db.insert_record(record)?;
    UsageGate::new(db, limits).sync_record_count()?;
    Ok(SaveOutcome::Saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckupType;
    use chrono::NaiveDate;

    fn limits(max_free_records: u32) -> UsageLimits {
        UsageLimits {
            max_free_records,
            max_free_exports: 3,
        }
    }

    fn record(day: u32, checkup_type: CheckupType) -> CheckupRecord {
        CheckupRecord::new(NaiveDate::from_ymd_opt(2024, 5, day).unwrap(), checkup_type)
    }

    #[test]
    fn test_duplicate_needs_confirmation() {
        let mut db = Database::open_in_memory().unwrap();
        let first = record(20, CheckupType::Comprehensive);
        assert_eq!(
            save_new_record(&mut db, &first, false, limits(10), false).unwrap(),
            SaveOutcome::Saved
        );

        let second = record(20, CheckupType::Comprehensive);
        let outcome = save_new_record(&mut db, &second, false, limits(10), false).unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::NeedsConfirmation {
                existing_ids: vec![first.id.clone()]
            }
        );
        assert_eq!(db.count_records().unwrap(), 1);
        assert!(db.get_record(&second.id).unwrap().is_none());

        assert_eq!(
            save_new_record(&mut db, &second, true, limits(10), false).unwrap(),
            SaveOutcome::Saved
        );
        assert_eq!(db.count_records().unwrap(), 2);
        assert!(db.get_record(&first.id).unwrap().is_some());
    }

    #[test]
    fn test_other_type_or_day_is_not_duplicate() {
        let mut db = Database::open_in_memory().unwrap();
        save_new_record(&mut db, &record(20, CheckupType::Comprehensive), false, limits(10), false)
            .unwrap();

        let other_type = record(20, CheckupType::Ultrasound);
        assert_eq!(
            save_new_record(&mut db, &other_type, false, limits(10), false).unwrap(),
            SaveOutcome::Saved
        );
        let other_day = record(21, CheckupType::Comprehensive);
        assert_eq!(
            save_new_record(&mut db, &other_day, false, limits(10), false).unwrap(),
            SaveOutcome::Saved
        );
    }

    #[test]
    fn test_limit_checked_first() {
        let mut db = Database::open_in_memory().unwrap();
        save_new_record(&mut db, &record(1, CheckupType::Comprehensive), false, limits(1), false)
            .unwrap();

        let next = record(2, CheckupType::Comprehensive);
        assert_eq!(
            save_new_record(&mut db, &next, false, limits(1), false).unwrap(),
            SaveOutcome::LimitReached
        );
        assert_eq!(
            save_new_record(&mut db, &next, false, limits(1), true).unwrap(),
            SaveOutcome::Saved
        );
    }
}
