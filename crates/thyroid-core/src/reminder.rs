//! Next-due computation and checkup reminder scheduling.
//!
//! Reminders are always rebuilt from scratch: every identifier is cancelled
//! and the current plans are handed to the host scheduler again.

use chrono::{Days, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::{CheckupType, ReminderSetting};

/// Reminder errors.
#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Invalid reminder time: {0}")]
    InvalidTime(String),
}

pub type ReminderResult<T> = Result<T, ReminderError>;

/// A local notification to hand to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRequest {
    pub identifier: String,
    pub title: String,
    pub body: String,
    /// Local wall-clock time
    pub fire_at: NaiveDateTime,
}

/// Host notification facility.
pub trait NotificationScheduler: Send + Sync {
    fn schedule(&self, request: &NotificationRequest) -> ReminderResult<()>;

    fn cancel(&self, identifiers: &[String]) -> ReminderResult<()>;
}

/// Notification identifier for a checkup type.
pub fn reminder_identifier(checkup_type: CheckupType) -> String {
    format!("checkup-reminder-{}", checkup_type.as_str())
}

/// When the next checkup of this type is due.
///
/// An enabled custom date wins; otherwise the last checkup plus the type's
/// default interval. `None` when there is neither.
pub fn next_due(
    setting: Option<&ReminderSetting>,
    last_record_date: Option<NaiveDate>,
    checkup_type: CheckupType,
) -> Option<NaiveDate> {
    if let Some(custom) = setting.and_then(ReminderSetting::effective_custom_date) {
        return Some(custom);
    }
    last_record_date.and_then(|last| checkup_type.next_after(last))
}

/// Reminder state for one checkup type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderPlan {
    pub checkup_type: CheckupType,
    pub identifier: String,
    pub due: NaiveDate,
    /// `None` when overdue; no notification is scheduled then
    pub fire_at: Option<NaiveDateTime>,
    pub overdue: bool,
    pub title: String,
    pub body: String,
}

impl ReminderPlan {
    pub fn notification(&self) -> Option<NotificationRequest> {
        self.fire_at.map(|fire_at| NotificationRequest {
            identifier: self.identifier.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            fire_at,
        })
    }
}

/// Turns due dates into reminder plans.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderPlanner {
    lead_days: u32,
    fire_time: NaiveTime,
}

impl ReminderPlanner {
    pub fn new(lead_days: u32, hour: u32) -> ReminderResult<Self> {
        let fire_time = NaiveTime::from_hms_opt(hour, 0, 0)
            .ok_or_else(|| ReminderError::InvalidTime(format!("hour {}", hour)))?;
        Ok(Self {
            lead_days,
            fire_time,
        })
    }

    /// Plan the reminder for a due date as seen at `now`.
    pub fn plan(&self, checkup_type: CheckupType, due: NaiveDate, now: NaiveDateTime) -> ReminderPlan {
        let today = now.date();
        let name = checkup_type.display_name();
        let identifier = reminder_identifier(checkup_type);

        if due < today {
            return ReminderPlan {
                checkup_type,
                identifier,
                due,
                fire_at: None,
                overdue: true,
                title: format!("{} overdue", name),
                body: format!("Your {} was due on {}.", name, due),
            };
        }

        let fire_day = due
            .checked_sub_days(Days::new(u64::from(self.lead_days)))
            .unwrap_or(NaiveDate::MIN);
        let mut fire_at = fire_day.and_time(self.fire_time);
        if fire_at <= now {
            // Never past the end of the due day
            let end_of_due =
                due.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::nanoseconds(1);
            fire_at = (now + Duration::minutes(1)).min(end_of_due);
        }

        let body = match (due - today).num_days() {
            0 => format!("Your {} is due today.", name),
            1 => format!("Your {} is due tomorrow.", name),
            _ => format!("Your {} is due on {}.", name, due),
        };

        ReminderPlan {
            checkup_type,
            identifier,
            due,
            fire_at: Some(fire_at),
            overdue: false,
            title: "Checkup reminder".to_string(),
            body,
        }
    }

    /// Plans for every checkup type that has a due date.
    pub fn plan_all(&self, db: &Database, now: NaiveDateTime) -> ReminderResult<Vec<ReminderPlan>> {
        let mut plans = Vec::new();
        for checkup_type in CheckupType::ALL {
            let setting = db.get_reminder_setting(checkup_type)?;
            let last = db.latest_record_date(checkup_type)?;
            if let Some(due) = next_due(setting.as_ref(), last, checkup_type) {
                plans.push(self.plan(checkup_type, due, now));
            }
        }
        Ok(plans)
    }
}

/// Cancel every checkup reminder, then schedule `plans`.
///
/// Needs no database access, so callers can release their connection before
/// calling into the host. Scheduler failures are logged and the remaining
/// reminders are still attempted. With `enabled` false all reminders are
/// cancelled and nothing is scheduled.
pub fn schedule_plans(scheduler: &dyn NotificationScheduler, plans: &[ReminderPlan], enabled: bool) {
    let identifiers: Vec<String> = CheckupType::ALL
        .into_iter()
        .map(reminder_identifier)
        .collect();
    if let Err(e) = scheduler.cancel(&identifiers) {
        tracing::warn!(error = %e, "Failed to cancel checkup reminders");
    }

    if !enabled {
        tracing::info!("Checkup reminders disabled, nothing scheduled");
        return;
    }

    let mut scheduled = 0;
    for plan in plans {
        let Some(request) = plan.notification() else {
            tracing::debug!(identifier = %plan.identifier, due = %plan.due, "Checkup overdue, no reminder");
            continue;
        };
        match scheduler.schedule(&request) {
            Ok(()) => scheduled += 1,
            Err(e) => tracing::warn!(
                identifier = %request.identifier,
                error = %e,
                "Failed to schedule checkup reminder"
            ),
        }
    }

    tracing::info!(plans = plans.len(), scheduled, "Rescheduled checkup reminders");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckupRecord;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    /// Records calls; fails scheduling for identifiers in `failing`.
    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<NotificationRequest>>,
        cancelled: Mutex<Vec<String>>,
        failing: Vec<String>,
    }

    impl NotificationScheduler for RecordingScheduler {
        fn schedule(&self, request: &NotificationRequest) -> ReminderResult<()> {
            if self.failing.contains(&request.identifier) {
                return Err(ReminderError::Scheduler("denied".into()));
            }
            self.scheduled.lock().unwrap().push(request.clone());
            Ok(())
        }

        fn cancel(&self, identifiers: &[String]) -> ReminderResult<()> {
            self.cancelled.lock().unwrap().extend_from_slice(identifiers);
            Ok(())
        }
    }

    fn reschedule_all(
        db: &Database,
        scheduler: &RecordingScheduler,
        planner: &ReminderPlanner,
        now: NaiveDateTime,
        enabled: bool,
    ) -> ReminderResult<Vec<ReminderPlan>> {
        let plans = planner.plan_all(db, now)?;
        schedule_plans(scheduler, &plans, enabled);
        Ok(plans)
    }

    #[test]
    fn test_next_due_from_last_record() {
        let last = Some(date(2024, 1, 15));
        assert_eq!(
            next_due(None, last, CheckupType::Comprehensive),
            Some(date(2024, 7, 15))
        );
        assert_eq!(next_due(None, None, CheckupType::Comprehensive), None);
    }

    #[test]
    fn test_next_due_custom_override() {
        let mut setting = ReminderSetting::new(CheckupType::Ultrasound);
        setting.custom_date = Some(date(2024, 9, 1));

        // Disabled override is ignored
        assert_eq!(
            next_due(Some(&setting), Some(date(2024, 1, 15)), CheckupType::Ultrasound),
            Some(date(2025, 1, 15))
        );

        setting.is_enabled = true;
        assert_eq!(
            next_due(Some(&setting), Some(date(2024, 1, 15)), CheckupType::Ultrasound),
            Some(date(2024, 9, 1))
        );
        assert_eq!(
            next_due(Some(&setting), None, CheckupType::Ultrasound),
            Some(date(2024, 9, 1))
        );
    }

    #[test]
    fn test_plan_fires_lead_days_before() {
        let planner = ReminderPlanner::new(3, 9).unwrap();
        let plan = planner.plan(CheckupType::Comprehensive, date(2024, 7, 15), at(2024, 6, 1, 12, 0));
        assert_eq!(plan.identifier, "checkup-reminder-comprehensive");
        assert_eq!(plan.fire_at, Some(at(2024, 7, 12, 9, 0)));
        assert!(!plan.overdue);
    }

    #[test]
    fn test_plan_past_fire_time_clamped() {
        let planner = ReminderPlanner::new(3, 9).unwrap();
        let now = at(2024, 7, 14, 18, 30);
        let plan = planner.plan(CheckupType::Comprehensive, date(2024, 7, 15), now);
        assert_eq!(plan.fire_at, Some(at(2024, 7, 14, 18, 31)));
        assert!(plan.body.contains("tomorrow"));

        let plan = planner.plan(CheckupType::Comprehensive, date(2024, 7, 14), now);
        assert_eq!(plan.fire_at, Some(at(2024, 7, 14, 18, 31)));
        assert!(plan.body.contains("today"));
    }

    #[test]
    fn test_plan_late_on_due_day_stays_on_due_day() {
        let planner = ReminderPlanner::new(3, 9).unwrap();
        let now = at(2024, 7, 15, 23, 59);
        let plan = planner.plan(CheckupType::Comprehensive, date(2024, 7, 15), now);
        let fire_at = plan.fire_at.unwrap();
        assert!(fire_at > now);
        assert_eq!(fire_at.date(), date(2024, 7, 15));
        assert!(plan.body.contains("today"));
    }

    #[test]
    fn test_plan_overdue() {
        let planner = ReminderPlanner::new(3, 9).unwrap();
        let plan = planner.plan(CheckupType::Thyroglobulin, date(2024, 5, 1), at(2024, 6, 1, 8, 0));
        assert!(plan.overdue);
        assert_eq!(plan.fire_at, None);
        assert!(plan.notification().is_none());
    }

    #[test]
    fn test_invalid_hour() {
        assert!(matches!(
            ReminderPlanner::new(3, 24),
            Err(ReminderError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_reschedule_all_cancels_then_schedules() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_record(&CheckupRecord::new(date(2024, 5, 20), CheckupType::Comprehensive))
            .unwrap();
        db.insert_record(&CheckupRecord::new(date(2024, 1, 2), CheckupType::Thyroglobulin))
            .unwrap();
        let mut setting = ReminderSetting::new(CheckupType::Ultrasound);
        setting.custom_date = Some(date(2024, 8, 1));
        setting.is_enabled = true;
        db.upsert_reminder_setting(&setting).unwrap();

        let scheduler = RecordingScheduler::default();
        let planner = ReminderPlanner::new(3, 9).unwrap();
        let plans = reschedule_all(&db, &scheduler, &planner, at(2024, 6, 1, 10, 0), true).unwrap();

        assert_eq!(plans.len(), 3);
        assert_eq!(scheduler.cancelled.lock().unwrap().len(), 3);

        // Thyroglobulin was due 2024-04-02: overdue, not scheduled
        let scheduled = scheduler.scheduled.lock().unwrap();
        let ids: Vec<&str> = scheduled.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(
            ids,
            vec!["checkup-reminder-comprehensive", "checkup-reminder-ultrasound"]
        );
        assert_eq!(scheduled[0].fire_at, at(2024, 11, 17, 9, 0));
        assert_eq!(scheduled[1].fire_at, at(2024, 7, 29, 9, 0));
    }

    #[test]
    fn test_reschedule_swallows_scheduler_failures() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_record(&CheckupRecord::new(date(2024, 5, 20), CheckupType::Comprehensive))
            .unwrap();
        db.insert_record(&CheckupRecord::new(date(2024, 5, 20), CheckupType::Ultrasound))
            .unwrap();

        let scheduler = RecordingScheduler {
            failing: vec![reminder_identifier(CheckupType::Comprehensive)],
            ..Default::default()
        };
        let planner = ReminderPlanner::new(3, 9).unwrap();
        let plans = reschedule_all(&db, &scheduler, &planner, at(2024, 6, 1, 10, 0), true).unwrap();

        assert_eq!(plans.len(), 2);
        assert_eq!(scheduler.scheduled.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_schedule_plans_without_database() {
        let planner = ReminderPlanner::new(3, 9).unwrap();
        let now = at(2024, 6, 1, 10, 0);
        let plans = vec![
            planner.plan(CheckupType::Comprehensive, date(2024, 7, 15), now),
            planner.plan(CheckupType::Thyroglobulin, date(2024, 5, 1), now),
        ];

        let scheduler = RecordingScheduler::default();
        schedule_plans(&scheduler, &plans, true);
        assert_eq!(scheduler.cancelled.lock().unwrap().len(), 3);
        let scheduled = scheduler.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].fire_at, at(2024, 7, 12, 9, 0));
    }

    #[test]
    fn test_reschedule_disabled_only_cancels() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_record(&CheckupRecord::new(date(2024, 5, 20), CheckupType::Comprehensive))
            .unwrap();

        let scheduler = RecordingScheduler::default();
        let planner = ReminderPlanner::new(3, 9).unwrap();
        reschedule_all(&db, &scheduler, &planner, at(2024, 6, 1, 10, 0), false).unwrap();

        assert_eq!(scheduler.cancelled.lock().unwrap().len(), 3);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_enabled_override_always_wins(
            last_offset in 0i64..3000,
            custom_offset in 0i64..3000,
        ) {
            let base = date(2010, 1, 1);
            let last = base + Duration::days(last_offset);
            let custom = base + Duration::days(custom_offset);
            let mut setting = ReminderSetting::new(CheckupType::Comprehensive);
            setting.custom_date = Some(custom);
            setting.is_enabled = true;
            prop_assert_eq!(
                next_due(Some(&setting), Some(last), CheckupType::Comprehensive),
                Some(custom)
            );
        }

        #[test]
        fn prop_fire_time_never_in_past(
            due_offset in 0i64..400,
            lead in 0u32..30,
            minute in 0u32..1440,
        ) {
            let now = at(2024, 6, 1, 0, 0) + Duration::minutes(i64::from(minute));
            let due = date(2024, 6, 1) + Duration::days(due_offset);
            let planner = ReminderPlanner::new(lead, 9).unwrap();
            let plan = planner.plan(CheckupType::Ultrasound, due, now);
            let fire_at = plan.fire_at.unwrap();
            prop_assert!(fire_at > now);
            prop_assert!(fire_at.date() <= due);
        }
    }
}
