//! Free-tier usage limits.
//!
//! Counters live in the preferences table. An active purchase entitlement,
//! as reported by the host, lifts every limit.

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::db::{Database, DbResult, PREF_EXPORT_COUNT, PREF_RECORD_COUNT};

/// Host purchase verification.
pub trait EntitlementVerifier: Send + Sync {
    fn has_active_entitlement(&self) -> bool;
}

/// Free-tier thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageLimits {
    pub max_free_records: u32,
    pub max_free_exports: u32,
}

impl From<&TrackerConfig> for UsageLimits {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            max_free_records: config.max_free_records,
            max_free_exports: config.max_free_exports,
        }
    }
}

/// Snapshot of usage against the limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageStatus {
    pub record_count: u32,
    pub export_count: u32,
    pub max_free_records: u32,
    pub max_free_exports: u32,
    pub entitled: bool,
    pub can_add_record: bool,
    pub can_export: bool,
}

/// Usage gate over the preference counters.
pub struct UsageGate<'a> {
    db: &'a Database,
    limits: UsageLimits,
}

impl<'a> UsageGate<'a> {
    pub fn new(db: &'a Database, limits: UsageLimits) -> Self {
        Self { db, limits }
    }

    /// Mirror the actual record count into the counter.
    pub fn sync_record_count(&self) -> DbResult<u32> {
        let count = self.db.count_records()?;
        self.db.set_preference(PREF_RECORD_COUNT, &count)?;
        tracing::debug!(count, "Synced record counter");
        Ok(count)
    }

    pub fn record_count(&self) -> DbResult<u32> {
        Ok(self.db.get_preference::<u32>(PREF_RECORD_COUNT)?.unwrap_or(0))
    }

    pub fn export_count(&self) -> DbResult<u32> {
        Ok(self.db.get_preference::<u32>(PREF_EXPORT_COUNT)?.unwrap_or(0))
    }

    pub fn can_add_record(&self, entitled: bool) -> DbResult<bool> {
        Ok(entitled || self.record_count()? < self.limits.max_free_records)
    }

    pub fn can_export(&self, entitled: bool) -> DbResult<bool> {
        Ok(entitled || self.export_count()? < self.limits.max_free_exports)
    }

    /// Count one completed export.
    pub fn record_export(&self) -> DbResult<u32> {
        let count = self.export_count()?.saturating_add(1);
        self.db.set_preference(PREF_EXPORT_COUNT, &count)?;
        tracing::info!(count, "Export counted");
        Ok(count)
    }

    pub fn status(&self, entitled: bool) -> DbResult<UsageStatus> {
        let record_count = self.record_count()?;
        let export_count = self.export_count()?;
        Ok(UsageStatus {
            record_count,
            export_count,
            max_free_records: self.limits.max_free_records,
            max_free_exports: self.limits.max_free_exports,
            entitled,
            can_add_record: entitled || record_count < self.limits.max_free_records,
            can_export: entitled || export_count < self.limits.max_free_exports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckupRecord, CheckupType};
    use chrono::NaiveDate;

    fn limits() -> UsageLimits {
        UsageLimits {
            max_free_records: 2,
            max_free_exports: 1,
        }
    }

    #[test]
    fn test_record_limit() {
        let mut db = Database::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        for _ in 0..2 {
            db.insert_record(&CheckupRecord::new(day, CheckupType::Comprehensive))
                .unwrap();
        }

        let gate = UsageGate::new(&db, limits());
        assert!(gate.can_add_record(false).unwrap());
        assert_eq!(gate.sync_record_count().unwrap(), 2);
        assert!(!gate.can_add_record(false).unwrap());
        assert!(gate.can_add_record(true).unwrap());
    }

    #[test]
    fn test_export_limit() {
        let db = Database::open_in_memory().unwrap();
        let gate = UsageGate::new(&db, limits());
        assert!(gate.can_export(false).unwrap());
        assert_eq!(gate.record_export().unwrap(), 1);
        assert!(!gate.can_export(false).unwrap());
        assert!(gate.can_export(true).unwrap());

        let status = gate.status(false).unwrap();
        assert_eq!(status.export_count, 1);
        assert!(!status.can_export);
        assert!(status.can_add_record);
    }
}
