//! Thyroid Tracker Core Library
//!
//! Local-first storage and domain logic for tracking thyroid checkups.
//!
//! # Architecture
//!
//! ```text
//! Camera/Photos → Platform OCR → thyroid-ocr (rows, indicators, report date)
//!                                          │
//!                                   user confirms
//!                                          │
//!                      ┌───────────────────▼───────────────────┐
//!                      │   ThyroidCore (UniFFI object)         │
//!                      │   usage gate → duplicate check → save │
//!                      └───────────────────┬───────────────────┘
//!                                          │
//!               ┌──────────────────────────┼──────────────────────────┐
//!               │                          │                          │
//!               ▼                          ▼                          ▼
//!          SQLite store           Reminder planning            CSV / JSON / PDF
//!                               (host scheduler callback)          export
//! ```
//!
//! # Core Principle
//!
//! **Indicator status is always derived.** It is recomputed from value and
//! reference range on every construction and write, never stored on its own.
//!
//! # Modules
//!
//! - [`db`]: SQLite persistence
//! - [`models`]: Domain types (CheckupRecord, Indicator, HistoryRecord, etc.)
//! - [`duplicates`]: Saving new records with the duplicate check
//! - [`reminder`]: Next-due dates and notification scheduling
//! - [`usage`]: Free-tier limits
//! - [`export`]: CSV, JSON and PDF export
//! - [`config`]: Tracker configuration

pub mod config;
pub mod db;
pub mod duplicates;
pub mod export;
pub mod models;
pub mod reminder;
pub mod usage;

// Re-export commonly used types
pub use config::TrackerConfig;
pub use db::Database;
pub use duplicates::{save_new_record, SaveOutcome};
pub use export::{ExportFormat, RecordExport, RecordExporter};
pub use models::{
    suggest_checkup_type, CheckupRecord, CheckupType, HistoryRecord, Indicator, IndicatorStatus,
    ReminderSetting,
};
pub use reminder::{
    next_due, schedule_plans, NotificationRequest, NotificationScheduler, ReminderPlan,
    ReminderPlanner,
};
pub use usage::{EntitlementVerifier, UsageGate, UsageLimits, UsageStatus};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDate, NaiveDateTime};
use thyroid_ocr::{parse_observations, ExtractedIndicator, OcrExtraction, ReportExtractor};
use tracing_subscriber::EnvFilter;

use db::{PREF_NOTIFICATIONS_ENABLED, PREF_REMINDER_LEAD_DAYS};
use models::HistoryImage;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DEFAULT_LOG_FILTER: &str = "thyroid_core=info,thyroid_ocr=info";

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ThyroidError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("Limit reached: {0}")]
    LimitReached(String),

    #[error("Callback error: {0}")]
    CallbackError(String),
}

impl From<db::DbError> for ThyroidError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(id) => ThyroidError::NotFound(id),
            db::DbError::Constraint(msg) => ThyroidError::InvalidInput(msg),
            other => ThyroidError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ThyroidError {
    fn from(e: serde_json::Error) -> Self {
        ThyroidError::SerializationError(e.to_string())
    }
}

impl From<export::ExportError> for ThyroidError {
    fn from(e: export::ExportError) -> Self {
        match e {
            export::ExportError::Database(e) => e.into(),
            export::ExportError::LimitReached => {
                ThyroidError::LimitReached("free export limit".to_string())
            }
            other => ThyroidError::ExportError(other.to_string()),
        }
    }
}

impl From<reminder::ReminderError> for ThyroidError {
    fn from(e: reminder::ReminderError) -> Self {
        match e {
            reminder::ReminderError::Database(e) => e.into(),
            reminder::ReminderError::InvalidTime(msg) => ThyroidError::InvalidInput(msg),
            reminder::ReminderError::Scheduler(msg) => ThyroidError::CallbackError(msg),
        }
    }
}

impl From<thyroid_ocr::ExtractionError> for ThyroidError {
    fn from(e: thyroid_ocr::ExtractionError) -> Self {
        ThyroidError::InvalidInput(e.to_string())
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for ThyroidError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        ThyroidError::CallbackError(e.reason)
    }
}

impl<T> From<std::sync::PoisonError<T>> for ThyroidError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ThyroidError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install the log subscriber. `filter` uses `RUST_LOG` syntax; when absent
/// the environment is consulted, then the crate defaults. Later calls are
/// no-ops.
#[uniffi::export]
pub fn init_logging(filter: Option<String>) {
    let filter = filter
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
    {
        tracing::info!("Logging initialized");
    }
}

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ThyroidCore>, ThyroidError> {
    let db = Database::open(&path)?;
    ThyroidCore::new(db, TrackerConfig::default())
}

/// Open or create a database with a JSON configuration.
#[uniffi::export]
pub fn open_database_with_config(
    path: String,
    config_json: String,
) -> Result<Arc<ThyroidCore>, ThyroidError> {
    let config = TrackerConfig::from_json(&config_json)?;
    let db = Database::open(&path)?;
    ThyroidCore::new(db, config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ThyroidCore>, ThyroidError> {
    let db = Database::open_in_memory()?;
    ThyroidCore::new(db, TrackerConfig::default())
}

// =========================================================================
// Host Callbacks
// =========================================================================

/// Local notification facility implemented by the host.
#[uniffi::export(with_foreign)]
pub trait FfiNotificationScheduler: Send + Sync {
    fn schedule(&self, request: FfiNotificationRequest) -> Result<(), ThyroidError>;

    fn cancel(&self, identifiers: Vec<String>) -> Result<(), ThyroidError>;
}

/// Purchase verification implemented by the host.
#[uniffi::export(with_foreign)]
pub trait FfiEntitlementVerifier: Send + Sync {
    fn has_active_entitlement(&self) -> bool;
}

struct SchedulerAdapter(Arc<dyn FfiNotificationScheduler>);

impl NotificationScheduler for SchedulerAdapter {
    fn schedule(&self, request: &NotificationRequest) -> reminder::ReminderResult<()> {
        self.0
            .schedule(request.into())
            .map_err(|e| reminder::ReminderError::Scheduler(e.to_string()))
    }

    fn cancel(&self, identifiers: &[String]) -> reminder::ReminderResult<()> {
        self.0
            .cancel(identifiers.to_vec())
            .map_err(|e| reminder::ReminderError::Scheduler(e.to_string()))
    }
}

struct EntitlementAdapter(Arc<dyn FfiEntitlementVerifier>);

impl EntitlementVerifier for EntitlementAdapter {
    fn has_active_entitlement(&self) -> bool {
        self.0.has_active_entitlement()
    }
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe core for FFI.
#[derive(uniffi::Object)]
pub struct ThyroidCore {
    db: Arc<Mutex<Database>>,
    config: TrackerConfig,
    scheduler: Mutex<Option<Arc<dyn NotificationScheduler>>>,
    entitlement: Mutex<Option<Arc<dyn EntitlementVerifier>>>,
}

impl ThyroidCore {
    fn new(db: Database, config: TrackerConfig) -> Result<Arc<Self>, ThyroidError> {
        let count = UsageGate::new(&db, UsageLimits::from(&config)).sync_record_count()?;
        tracing::info!(records = count, "Opened thyroid tracker");
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            config,
            scheduler: Mutex::new(None),
            entitlement: Mutex::new(None),
        }))
    }

    fn limits(&self) -> UsageLimits {
        UsageLimits::from(&self.config)
    }

    fn is_entitled(&self) -> Result<bool, ThyroidError> {
        let verifier = self.entitlement.lock()?;
        Ok(verifier
            .as_ref()
            .map(|v| v.has_active_entitlement())
            .unwrap_or(false))
    }

    /// Lead days from preferences, falling back to the config.
    fn planner(&self, db: &Database) -> Result<ReminderPlanner, ThyroidError> {
        let lead_days = db
            .get_preference::<u32>(PREF_REMINDER_LEAD_DAYS)?
            .unwrap_or(self.config.reminder_lead_days);
        Ok(ReminderPlanner::new(lead_days, self.config.reminder_hour)?)
    }

    fn notifications_enabled(&self, db: &Database) -> Result<bool, ThyroidError> {
        Ok(db
            .get_preference::<bool>(PREF_NOTIFICATIONS_ENABLED)?
            .unwrap_or(true))
    }

    /// Rebuild reminders. The database guard is released before the host
    /// scheduler is called, so the host may call back into the core.
    fn reschedule(&self, db: MutexGuard<'_, Database>) -> Result<Vec<ReminderPlan>, ThyroidError> {
        let planner = self.planner(&db)?;
        let enabled = self.notifications_enabled(&db)?;
        let plans = planner.plan_all(&db, Local::now().naive_local())?;
        drop(db);

        let scheduler = self.scheduler.lock()?.clone();
        match scheduler {
            Some(scheduler) => schedule_plans(scheduler.as_ref(), &plans, enabled),
            None => tracing::debug!("No notification scheduler registered"),
        }
        Ok(plans)
    }
}

#[uniffi::export]
impl ThyroidCore {
    // =========================================================================
    // Host Callbacks
    // =========================================================================

    /// Register the notification scheduler and schedule current reminders.
    pub fn set_notification_scheduler(
        &self,
        scheduler: Arc<dyn FfiNotificationScheduler>,
    ) -> Result<Vec<FfiReminderPlan>, ThyroidError> {
        *self.scheduler.lock()? = Some(Arc::new(SchedulerAdapter(scheduler)));
        let plans = self.reschedule(self.db.lock()?)?;
        Ok(plans.into_iter().map(|p| p.into()).collect())
    }

    /// Register the purchase verifier.
    pub fn set_entitlement_verifier(
        &self,
        verifier: Arc<dyn FfiEntitlementVerifier>,
    ) -> Result<(), ThyroidError> {
        *self.entitlement.lock()? = Some(Arc::new(EntitlementAdapter(verifier)));
        Ok(())
    }

    // =========================================================================
    // Checkup Record Operations
    // =========================================================================

    /// Save a new record. Same-day records of the same type must be
    /// confirmed first.
    pub fn save_record(
        &self,
        record: FfiCheckupRecord,
        confirmed: bool,
    ) -> Result<FfiSaveOutcome, ThyroidError> {
        let record = CheckupRecord::try_from(record)?;
        let entitled = self.is_entitled()?;
        let mut db = self.db.lock()?;

        let outcome = save_new_record(&mut db, &record, confirmed, self.limits(), entitled)?;
        Ok(match outcome {
            SaveOutcome::Saved => {
                let saved = db
                    .get_record(&record.id)?
                    .ok_or_else(|| ThyroidError::NotFound(record.id.clone()))?;
                self.reschedule(db)?;
                FfiSaveOutcome::Saved {
                    record: saved.into(),
                }
            }
            SaveOutcome::NeedsConfirmation { existing_ids } => {
                FfiSaveOutcome::NeedsConfirmation { existing_ids }
            }
            SaveOutcome::LimitReached => FfiSaveOutcome::LimitReached,
        })
    }

    /// Replace an existing record's fields and indicators.
    pub fn update_record(&self, record: FfiCheckupRecord) -> Result<bool, ThyroidError> {
        let record = CheckupRecord::try_from(record)?;
        let mut db = self.db.lock()?;
        let updated = db.update_record(&record)?;
        if updated {
            self.reschedule(db)?;
        }
        Ok(updated)
    }

    /// Get a record by ID.
    pub fn get_record(&self, id: String) -> Result<Option<FfiCheckupRecord>, ThyroidError> {
        let db = self.db.lock()?;
        let record = db.get_record(&id)?;
        Ok(record.map(|r| r.into()))
    }

    /// Delete a record with its indicators.
    pub fn delete_record(&self, id: String) -> Result<bool, ThyroidError> {
        let db = self.db.lock()?;
        let deleted = db.delete_record(&id)?;
        if deleted {
            UsageGate::new(&db, self.limits()).sync_record_count()?;
            self.reschedule(db)?;
        }
        Ok(deleted)
    }

    /// All records, newest first.
    pub fn list_records(&self) -> Result<Vec<FfiCheckupRecord>, ThyroidError> {
        let db = self.db.lock()?;
        let records = db.list_records()?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    /// Records of one type, newest first.
    pub fn list_records_by_type(
        &self,
        checkup_type: String,
    ) -> Result<Vec<FfiCheckupRecord>, ThyroidError> {
        let checkup_type = parse_checkup_type(&checkup_type)?;
        let db = self.db.lock()?;
        let records = db.list_records_by_type(checkup_type)?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    /// IDs of records that a new record on `date` of this type would
    /// duplicate.
    pub fn find_duplicates(
        &self,
        date: String,
        checkup_type: String,
    ) -> Result<Vec<String>, ThyroidError> {
        let date = parse_date(&date)?;
        let checkup_type = parse_checkup_type(&checkup_type)?;
        let db = self.db.lock()?;
        Ok(db.find_records_on_day(date, checkup_type)?)
    }

    // =========================================================================
    // Reminder Operations
    // =========================================================================

    /// Next due date for a checkup type, as `YYYY-MM-DD`.
    pub fn next_due_date(&self, checkup_type: String) -> Result<Option<String>, ThyroidError> {
        let checkup_type = parse_checkup_type(&checkup_type)?;
        let db = self.db.lock()?;
        let setting = db.get_reminder_setting(checkup_type)?;
        let last = db.latest_record_date(checkup_type)?;
        Ok(next_due(setting.as_ref(), last, checkup_type).map(|d| format_date(&d)))
    }

    /// Reminder setting for a type; a disabled default when none is stored.
    pub fn get_reminder_setting(
        &self,
        checkup_type: String,
    ) -> Result<FfiReminderSetting, ThyroidError> {
        let checkup_type = parse_checkup_type(&checkup_type)?;
        let db = self.db.lock()?;
        let setting = db
            .get_reminder_setting(checkup_type)?
            .unwrap_or_else(|| ReminderSetting::new(checkup_type));
        Ok(setting.into())
    }

    /// Store a reminder setting and reschedule.
    pub fn set_reminder_setting(
        &self,
        setting: FfiReminderSetting,
    ) -> Result<Vec<FfiReminderPlan>, ThyroidError> {
        let setting = ReminderSetting::try_from(setting)?;
        let db = self.db.lock()?;
        db.upsert_reminder_setting(&setting)?;
        let plans = self.reschedule(db)?;
        Ok(plans.into_iter().map(|p| p.into()).collect())
    }

    /// Turn checkup notifications on or off and reschedule.
    pub fn set_notifications_enabled(
        &self,
        enabled: bool,
    ) -> Result<Vec<FfiReminderPlan>, ThyroidError> {
        let db = self.db.lock()?;
        db.set_preference(PREF_NOTIFICATIONS_ENABLED, &enabled)?;
        let plans = self.reschedule(db)?;
        Ok(plans.into_iter().map(|p| p.into()).collect())
    }

    /// Change how many days ahead reminders fire and reschedule.
    pub fn set_reminder_lead_days(
        &self,
        lead_days: u32,
    ) -> Result<Vec<FfiReminderPlan>, ThyroidError> {
        let db = self.db.lock()?;
        db.set_preference(PREF_REMINDER_LEAD_DAYS, &lead_days)?;
        let plans = self.reschedule(db)?;
        Ok(plans.into_iter().map(|p| p.into()).collect())
    }

    /// Cancel and schedule all reminders from scratch.
    pub fn reschedule_reminders(&self) -> Result<Vec<FfiReminderPlan>, ThyroidError> {
        let db = self.db.lock()?;
        let plans = self.reschedule(db)?;
        Ok(plans.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // History Operations
    // =========================================================================

    /// Create a history record. Identical images are stored once.
    pub fn create_history_record(
        &self,
        date: String,
        title: String,
        notes: String,
        images: Vec<Vec<u8>>,
    ) -> Result<FfiHistoryRecord, ThyroidError> {
        if images.is_empty() {
            return Err(ThyroidError::InvalidInput(
                "history record needs at least one image".to_string(),
            ));
        }
        let mut record = HistoryRecord::new(parse_date(&date)?, title);
        record.notes = notes;
        for image in images {
            record.add_image(image);
        }

        let mut db = self.db.lock()?;
        db.insert_history_record(&record)?;
        Ok(record.into())
    }

    /// Update title, date and notes.
    pub fn update_history_record(
        &self,
        id: String,
        date: String,
        title: String,
        notes: String,
    ) -> Result<bool, ThyroidError> {
        let date = parse_date(&date)?;
        let db = self.db.lock()?;
        let Some(mut record) = db.get_history_record(&id)? else {
            return Ok(false);
        };
        record.date = date;
        record.title = title;
        record.notes = notes;
        Ok(db.update_history_record(&record)?)
    }

    /// Attach an image. Returns false when identical bytes are already
    /// attached.
    pub fn add_history_image(&self, id: String, data: Vec<u8>) -> Result<bool, ThyroidError> {
        let db = self.db.lock()?;
        Ok(db.add_history_image(&id, &data)?)
    }

    /// Detach an image by digest. The last image of a record cannot be
    /// removed.
    pub fn remove_history_image(&self, id: String, digest: String) -> Result<bool, ThyroidError> {
        let db = self.db.lock()?;
        Ok(db.remove_history_image(&id, &digest)?)
    }

    /// Get a history record with image bytes.
    pub fn get_history_record(&self, id: String) -> Result<Option<FfiHistoryRecord>, ThyroidError> {
        let db = self.db.lock()?;
        let record = db.get_history_record(&id)?;
        Ok(record.map(|r| r.into()))
    }

    /// All history records, newest first. Image bytes are not loaded.
    pub fn list_history_records(&self) -> Result<Vec<FfiHistoryRecord>, ThyroidError> {
        let db = self.db.lock()?;
        let records = db.list_history_records()?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    /// Delete a history record with its images.
    pub fn delete_history_record(&self, id: String) -> Result<bool, ThyroidError> {
        let db = self.db.lock()?;
        Ok(db.delete_history_record(&id)?)
    }

    // =========================================================================
    // Usage Operations
    // =========================================================================

    /// Usage counters against the free-tier limits.
    pub fn usage_status(&self) -> Result<FfiUsageStatus, ThyroidError> {
        let entitled = self.is_entitled()?;
        let db = self.db.lock()?;
        let status = UsageGate::new(&db, self.limits()).status(entitled)?;
        Ok(status.into())
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    /// Export all records as `csv` (UTF-8 with BOM), `json` or `pdf`.
    ///
    /// Gated by the free export limit; a successful export is counted.
    pub fn export_records(&self, format: String) -> Result<FfiExportFile, ThyroidError> {
        let format = ExportFormat::parse(&format)
            .ok_or_else(|| ThyroidError::InvalidInput(format!("Unknown export format: {}", format)))?;
        let entitled = self.is_entitled()?;
        let db = self.db.lock()?;
        let gate = UsageGate::new(&db, self.limits());
        if !gate.can_export(entitled)? {
            return Err(export::ExportError::LimitReached.into());
        }

        let today = Local::now().date_naive();
        let batch = RecordExporter::new(&db).export_all()?;
        let data = batch.render(format, today)?;
        gate.record_export()?;
        tracing::info!(
            format = format.file_extension(),
            records = batch.records.len(),
            bytes = data.len(),
            "Exported records"
        );

        Ok(FfiExportFile {
            file_name: format!("thyroid-records-{}.{}", format_date(&today), format.file_extension()),
            mime_type: format.mime_type().to_string(),
            exported_at: batch.exported_at,
            record_count: batch.records.len() as u32,
            data,
        })
    }

    // =========================================================================
    // OCR Operations
    // =========================================================================

    /// Rebuild indicator readings from recognizer observations (JSON array
    /// of `{text, confidence, bounds: {x, y, width, height}}`).
    pub fn extract_report(
        &self,
        observations_json: String,
    ) -> Result<FfiOcrExtraction, ThyroidError> {
        let observations = parse_observations(&observations_json)?;
        let extractor = ReportExtractor::with_date_extractor(self.config.date_extractor());
        let extraction = extractor.extract(&observations);
        Ok(extraction.into())
    }
}

// =========================================================================
// Conversion Helpers
// =========================================================================

fn parse_date(s: &str) -> Result<NaiveDate, ThyroidError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| ThyroidError::InvalidInput(format!("Invalid date {}: {}", s, e)))
}

fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_date_time(at: &NaiveDateTime) -> String {
    at.format(DATE_TIME_FORMAT).to_string()
}

fn parse_checkup_type(s: &str) -> Result<CheckupType, ThyroidError> {
    CheckupType::parse(s)
        .ok_or_else(|| ThyroidError::InvalidInput(format!("Unknown checkup type: {}", s)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe indicator. `status` is output only; it is derived on save.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiIndicator {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub normal_range: String,
    pub status: String,
}

impl From<Indicator> for FfiIndicator {
    fn from(indicator: Indicator) -> Self {
        Self {
            name: indicator.name,
            value: indicator.value,
            unit: indicator.unit,
            normal_range: indicator.normal_range,
            status: indicator.status.as_str().to_string(),
        }
    }
}

/// FFI-safe checkup record. An empty `id` gets a fresh UUID on save.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCheckupRecord {
    pub id: String,
    pub date: String,
    pub checkup_type: String,
    pub notes: Option<String>,
    pub indicators: Vec<FfiIndicator>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CheckupRecord> for FfiCheckupRecord {
    fn from(record: CheckupRecord) -> Self {
        Self {
            id: record.id,
            date: format_date(&record.date),
            checkup_type: record.checkup_type.as_str().to_string(),
            notes: record.notes,
            indicators: record.indicators.into_iter().map(|i| i.into()).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl TryFrom<FfiCheckupRecord> for CheckupRecord {
    type Error = ThyroidError;

    fn try_from(record: FfiCheckupRecord) -> Result<Self, Self::Error> {
        let mut converted =
            CheckupRecord::new(parse_date(&record.date)?, parse_checkup_type(&record.checkup_type)?);
        if !record.id.trim().is_empty() {
            converted.id = record.id;
        }
        if !record.created_at.is_empty() {
            converted.created_at = record.created_at;
        }
        converted.notes = record.notes.filter(|n| !n.trim().is_empty());
        for indicator in record.indicators {
            if !indicator.value.is_finite() {
                return Err(ThyroidError::InvalidInput(format!(
                    "Indicator {} has a non-finite value",
                    indicator.name
                )));
            }
            converted.add_indicator(
                indicator.name.trim(),
                indicator.value,
                indicator.unit.trim(),
                indicator.normal_range.trim(),
            );
        }
        Ok(converted)
    }
}

/// FFI-safe save outcome.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiSaveOutcome {
    Saved { record: FfiCheckupRecord },
    NeedsConfirmation { existing_ids: Vec<String> },
    LimitReached,
}

/// FFI-safe reminder setting.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReminderSetting {
    pub checkup_type: String,
    pub custom_date: Option<String>,
    pub is_enabled: bool,
}

impl From<ReminderSetting> for FfiReminderSetting {
    fn from(setting: ReminderSetting) -> Self {
        Self {
            checkup_type: setting.checkup_type.as_str().to_string(),
            custom_date: setting.custom_date.as_ref().map(format_date),
            is_enabled: setting.is_enabled,
        }
    }
}

impl TryFrom<FfiReminderSetting> for ReminderSetting {
    type Error = ThyroidError;

    fn try_from(setting: FfiReminderSetting) -> Result<Self, Self::Error> {
        let mut converted = ReminderSetting::new(parse_checkup_type(&setting.checkup_type)?);
        converted.custom_date = setting.custom_date.as_deref().map(parse_date).transpose()?;
        converted.is_enabled = setting.is_enabled;
        Ok(converted)
    }
}

/// FFI-safe reminder plan.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReminderPlan {
    pub checkup_type: String,
    pub identifier: String,
    pub due_date: String,
    /// Local time `YYYY-MM-DDTHH:MM:SS`; absent when overdue
    pub fire_at: Option<String>,
    pub overdue: bool,
    pub title: String,
    pub body: String,
}

impl From<ReminderPlan> for FfiReminderPlan {
    fn from(plan: ReminderPlan) -> Self {
        Self {
            checkup_type: plan.checkup_type.as_str().to_string(),
            identifier: plan.identifier,
            due_date: format_date(&plan.due),
            fire_at: plan.fire_at.as_ref().map(format_date_time),
            overdue: plan.overdue,
            title: plan.title,
            body: plan.body,
        }
    }
}

/// FFI-safe notification request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNotificationRequest {
    pub identifier: String,
    pub title: String,
    pub body: String,
    /// Local time `YYYY-MM-DDTHH:MM:SS`
    pub fire_at: String,
}

impl From<&NotificationRequest> for FfiNotificationRequest {
    fn from(request: &NotificationRequest) -> Self {
        Self {
            identifier: request.identifier.clone(),
            title: request.title.clone(),
            body: request.body.clone(),
            fire_at: format_date_time(&request.fire_at),
        }
    }
}

/// FFI-safe history image.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiHistoryImage {
    pub digest: String,
    pub position: u32,
    /// Empty in list results
    pub data: Vec<u8>,
}

impl From<HistoryImage> for FfiHistoryImage {
    fn from(image: HistoryImage) -> Self {
        Self {
            digest: image.digest,
            position: image.position,
            data: image.data,
        }
    }
}

/// FFI-safe history record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiHistoryRecord {
    pub id: String,
    pub date: String,
    pub title: String,
    pub notes: String,
    pub images: Vec<FfiHistoryImage>,
    pub created_at: String,
}

impl From<HistoryRecord> for FfiHistoryRecord {
    fn from(record: HistoryRecord) -> Self {
        Self {
            id: record.id,
            date: format_date(&record.date),
            title: record.title,
            notes: record.notes,
            images: record.images.into_iter().map(|i| i.into()).collect(),
            created_at: record.created_at,
        }
    }
}

/// FFI-safe usage status.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUsageStatus {
    pub record_count: u32,
    pub export_count: u32,
    pub max_free_records: u32,
    pub max_free_exports: u32,
    pub entitled: bool,
    pub can_add_record: bool,
    pub can_export: bool,
}

/// A rendered export, ready to share or save.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiExportFile {
    pub file_name: String,
    pub mime_type: String,
    pub exported_at: String,
    pub record_count: u32,
    pub data: Vec<u8>,
}

impl From<UsageStatus> for FfiUsageStatus {
    fn from(status: UsageStatus) -> Self {
        Self {
            record_count: status.record_count,
            export_count: status.export_count,
            max_free_records: status.max_free_records,
            max_free_exports: status.max_free_exports,
            entitled: status.entitled,
            can_add_record: status.can_add_record,
            can_export: status.can_export,
        }
    }
}

/// FFI-safe extracted indicator, with the status its value would get.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiExtractedIndicator {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub normal_range: String,
    pub status: String,
    pub confidence: f64,
    pub method: String,
}

impl From<ExtractedIndicator> for FfiExtractedIndicator {
    fn from(indicator: ExtractedIndicator) -> Self {
        let status = IndicatorStatus::derive(indicator.value, &indicator.normal_range);
        Self {
            name: indicator.name,
            value: indicator.value,
            unit: indicator.unit,
            normal_range: indicator.normal_range,
            status: status.as_str().to_string(),
            confidence: indicator.confidence,
            method: format!("{:?}", indicator.method),
        }
    }
}

/// FFI-safe OCR extraction.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOcrExtraction {
    pub indicators: Vec<FfiExtractedIndicator>,
    pub report_date: Option<String>,
    pub suggested_type: String,
    pub missing: Vec<String>,
    pub needs_manual_completion: bool,
    pub text: String,
}

impl From<OcrExtraction> for FfiOcrExtraction {
    fn from(extraction: OcrExtraction) -> Self {
        let suggested_type = suggest_checkup_type(&extraction);
        Self {
            report_date: extraction.report_date.as_ref().map(format_date),
            suggested_type: suggested_type.as_str().to_string(),
            missing: extraction.missing,
            needs_manual_completion: extraction.needs_manual_completion,
            text: extraction.text,
            indicators: extraction.indicators.into_iter().map(|i| i.into()).collect(),
        }
    }
}
