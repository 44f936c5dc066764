//! Record export as CSV, JSON and PDF.

mod csv;
mod json;
mod pdf;

pub use csv::*;
pub use json::*;
pub use pdf::*;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::CheckupRecord;

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Free export limit reached")]
    LimitReached,
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
    Pdf,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// Snapshot of every record at export time.
#[derive(Debug, Clone)]
pub struct RecordExport {
    /// Export timestamp
    pub exported_at: String,
    /// Records, newest first
    pub records: Vec<CheckupRecord>,
    /// Total indicator count across records
    pub total_indicators: usize,
}

impl RecordExport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        records_to_json(&self.records)
    }

    pub fn to_csv(&self) -> String {
        records_to_csv(&self.records)
    }

    pub fn to_pdf(&self, generated_on: NaiveDate) -> ExportResult<Vec<u8>> {
        records_to_pdf(&self.records, generated_on)
    }

    /// Render in the given format. Text formats are returned as UTF-8 bytes.
    pub fn render(&self, format: ExportFormat, generated_on: NaiveDate) -> ExportResult<Vec<u8>> {
        match format {
            ExportFormat::Csv => Ok(self.to_csv().into_bytes()),
            ExportFormat::Json => Ok(self.to_json()?.into_bytes()),
            ExportFormat::Pdf => self.to_pdf(generated_on),
        }
    }
}

/// Record exporter.
pub struct RecordExporter<'a> {
    db: &'a Database,
}

impl<'a> RecordExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Load every record with its indicators.
    pub fn export_all(&self) -> ExportResult<RecordExport> {
        let records = self.db.list_records()?;
        let total_indicators = records.iter().map(|r| r.indicators.len()).sum();
        tracing::debug!(records = records.len(), total_indicators, "Loaded records for export");

        Ok(RecordExport {
            exported_at: chrono::Utc::now().to_rfc3339(),
            records,
            total_indicators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckupType;

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();

        let mut panel = CheckupRecord::new(
            NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            CheckupType::Comprehensive,
        );
        panel.notes = Some("fasting, morning draw".into());
        panel.add_indicator("TSH", 5.1, "mIU/L", "0.27-4.2");
        panel.add_indicator("FT4", 16.2, "pmol/L", "12-22");
        panel.add_indicator("TPOAb", 40.0, "IU/mL", "<34");
        db.insert_record(&panel).unwrap();

        let mut tg = CheckupRecord::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            CheckupType::Thyroglobulin,
        );
        tg.add_indicator("Tg", 0.04, "ng/mL", "3.5-77");
        db.insert_record(&tg).unwrap();

        db.insert_record(&CheckupRecord::new(
            NaiveDate::from_ymd_opt(2023, 11, 3).unwrap(),
            CheckupType::Ultrasound,
        ))
        .unwrap();

        db
    }

    type Tuple = (String, String, f64, String, String, String);

    fn expected_tuples(export: &RecordExport) -> Vec<Tuple> {
        export
            .records
            .iter()
            .flat_map(|r| {
                r.indicators.iter().map(move |i| {
                    (
                        r.date.format("%Y-%m-%d").to_string(),
                        i.name.clone(),
                        i.value,
                        i.unit.clone(),
                        i.normal_range.clone(),
                        i.status.label().to_string(),
                    )
                })
            })
            .collect()
    }

    #[test]
    fn test_csv_round_trip() {
        let db = seeded_db();
        let export = RecordExporter::new(&db).export_all().unwrap();
        assert_eq!(export.total_indicators, 4);

        let rows = parse_csv(&export.to_csv()).unwrap();
        assert_eq!(rows.len(), export.total_indicators);

        let parsed: Vec<Tuple> = rows
            .into_iter()
            .map(|r| (r.date, r.indicator, r.value, r.unit, r.range, r.status))
            .collect();
        assert_eq!(parsed, expected_tuples(&export));
    }

    #[test]
    fn test_json_round_trip() {
        let db = seeded_db();
        let export = RecordExporter::new(&db).export_all().unwrap();

        let records = parse_json(&export.to_json().unwrap()).unwrap();
        assert_eq!(records.len(), 3);
        let indicator_count: usize = records.iter().map(|r| r.indicators.len()).sum();
        assert_eq!(indicator_count, export.total_indicators);

        let parsed: Vec<Tuple> = records
            .iter()
            .flat_map(|r| {
                r.indicators.iter().map(move |i| {
                    (
                        r.date.format("%Y-%m-%d").to_string(),
                        i.name.clone(),
                        i.value,
                        i.unit.clone(),
                        i.normal_range.clone(),
                        i.status.label().to_string(),
                    )
                })
            })
            .collect();
        assert_eq!(parsed, expected_tuples(&export));
    }

    #[test]
    fn test_render_formats() {
        let db = seeded_db();
        let export = RecordExporter::new(&db).export_all().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let csv = export.render(ExportFormat::Csv, today).unwrap();
        assert!(csv.starts_with(UTF8_BOM.as_bytes()));
        let json = export.render(ExportFormat::Json, today).unwrap();
        assert_eq!(parse_json(std::str::from_utf8(&json).unwrap()).unwrap().len(), 3);
        let pdf = export.render(ExportFormat::Pdf, today).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ExportFormat::parse(" PDF "), Some(ExportFormat::Pdf));
        assert_eq!(ExportFormat::parse("csv").unwrap().mime_type(), "text/csv");
        assert_eq!(ExportFormat::parse("json").unwrap().file_extension(), "json");
        assert_eq!(ExportFormat::parse("xlsx"), None);
    }

    #[test]
    fn test_empty_export() {
        let db = Database::open_in_memory().unwrap();
        let export = RecordExporter::new(&db).export_all().unwrap();
        assert_eq!(export.total_indicators, 0);
        assert!(parse_csv(&export.to_csv()).unwrap().is_empty());
        assert_eq!(export.to_json().unwrap(), "[]");
    }
}
