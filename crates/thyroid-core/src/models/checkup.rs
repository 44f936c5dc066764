//! Checkup records and their indicator readings.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thyroid_ocr::{OcrExtraction, ReportKind};

use super::status::IndicatorStatus;

/// Kind of checkup. Each kind recurs on its own schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CheckupType {
    /// Thyroid function panel (TSH, FT3, FT4, antibodies)
    Comprehensive,
    /// Thyroglobulin follow-up
    Thyroglobulin,
    /// Thyroid ultrasound
    Ultrasound,
}

impl CheckupType {
    pub const ALL: [CheckupType; 3] = [
        CheckupType::Comprehensive,
        CheckupType::Thyroglobulin,
        CheckupType::Ultrasound,
    ];

    /// Stable storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckupType::Comprehensive => "comprehensive",
            CheckupType::Thyroglobulin => "thyroglobulin",
            CheckupType::Ultrasound => "ultrasound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comprehensive" => Some(CheckupType::Comprehensive),
            "thyroglobulin" => Some(CheckupType::Thyroglobulin),
            "ultrasound" => Some(CheckupType::Ultrasound),
            _ => None,
        }
    }

    /// Name shown in exports and notifications.
    pub fn display_name(&self) -> &'static str {
        match self {
            CheckupType::Comprehensive => "Thyroid Function Panel",
            CheckupType::Thyroglobulin => "Thyroglobulin",
            CheckupType::Ultrasound => "Thyroid Ultrasound",
        }
    }

    /// Default recurrence interval in months.
    pub fn default_interval_months(&self) -> u32 {
        match self {
            CheckupType::Comprehensive => 6,
            CheckupType::Thyroglobulin => 3,
            CheckupType::Ultrasound => 12,
        }
    }

    /// `last` plus the default interval. Month arithmetic clamps to the end
    /// of shorter months (Aug 31 + 6 months = Feb 28/29).
    pub fn next_after(&self, last: NaiveDate) -> Option<NaiveDate> {
        last.checked_add_months(Months::new(self.default_interval_months()))
    }
}

impl From<ReportKind> for CheckupType {
    fn from(kind: ReportKind) -> Self {
        match kind {
            ReportKind::ThyroidPanel => CheckupType::Comprehensive,
            ReportKind::Thyroglobulin => CheckupType::Thyroglobulin,
            ReportKind::Ultrasound => CheckupType::Ultrasound,
        }
    }
}

/// Guess the checkup type of a scanned report from the indicators found and
/// the page text.
pub fn suggest_checkup_type(extraction: &OcrExtraction) -> CheckupType {
    thyroid_ocr::suggest_kind(&extraction.indicators, &extraction.text).into()
}

/// One lab reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Indicator {
    /// Unique indicator ID
    pub id: String,
    /// Owning record
    pub record_id: String,
    /// Indicator name (e.g. "TSH")
    pub name: String,
    pub value: f64,
    pub unit: String,
    /// Reference range as printed, e.g. "0.27-4.2" or "<34"
    pub normal_range: String,
    /// Always `IndicatorStatus::derive(value, normal_range)`
    pub status: IndicatorStatus,
}

impl Indicator {
    /// Create an indicator; status is derived from the value and range.
    pub fn new(
        record_id: String,
        name: String,
        value: f64,
        unit: String,
        normal_range: String,
    ) -> Self {
        let status = IndicatorStatus::derive(value, &normal_range);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            record_id,
            name,
            value,
            unit,
            normal_range,
            status,
        }
    }

    /// Recompute the status from the current value and range.
    pub fn refresh_status(&mut self) {
        self.status = IndicatorStatus::derive(self.value, &self.normal_range);
    }
}

/// One checkup event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckupRecord {
    /// Unique record ID (client-generated)
    pub id: String,
    /// Calendar day of the checkup
    pub date: NaiveDate,
    pub checkup_type: CheckupType,
    pub notes: Option<String>,
    /// Readings owned by this record
    pub indicators: Vec<Indicator>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl CheckupRecord {
    /// Create an empty record.
    pub fn new(date: NaiveDate, checkup_type: CheckupType) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            checkup_type,
            notes: None,
            indicators: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Add a reading owned by this record.
    pub fn add_indicator(
        &mut self,
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        normal_range: impl Into<String>,
    ) -> &Indicator {
        let indicator = Indicator::new(
            self.id.clone(),
            name.into(),
            value,
            unit.into(),
            normal_range.into(),
        );
        self.indicators.push(indicator);
        &self.indicators[self.indicators.len() - 1]
    }

    /// Re-point indicators at this record and recompute their status.
    pub fn normalize_indicators(&mut self) {
        for indicator in &mut self.indicators {
            indicator.record_id = self.id.clone();
            indicator.refresh_status();
        }
    }

    pub fn abnormal_count(&self) -> usize {
        self.indicators
            .iter()
            .filter(|i| i.status.is_abnormal())
            .count()
    }
}
