//! JSON export: an array of record dictionaries with nested indicators.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{CheckupRecord, CheckupType, IndicatorStatus};

/// Exported record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRecord {
    pub id: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub checkup_type: CheckupType,
    pub notes: Option<String>,
    pub indicators: Vec<JsonIndicator>,
}

/// Exported indicator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonIndicator {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub normal_range: String,
    pub status: IndicatorStatus,
}

impl From<&CheckupRecord> for JsonRecord {
    fn from(record: &CheckupRecord) -> Self {
        Self {
            id: record.id.clone(),
            date: record.date,
            checkup_type: record.checkup_type,
            notes: record.notes.clone(),
            indicators: record
                .indicators
                .iter()
                .map(|i| JsonIndicator {
                    name: i.name.clone(),
                    value: i.value,
                    unit: i.unit.clone(),
                    normal_range: i.normal_range.clone(),
                    status: i.status,
                })
                .collect(),
        }
    }
}

/// Export to JSON.
pub fn records_to_json(records: &[CheckupRecord]) -> Result<String, serde_json::Error> {
    let exported: Vec<JsonRecord> = records.iter().map(JsonRecord::from).collect();
    serde_json::to_string_pretty(&exported)
}

/// Parse an export produced by [`records_to_json`].
pub fn parse_json(json: &str) -> Result<Vec<JsonRecord>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let mut record = CheckupRecord::new(
            NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            CheckupType::Thyroglobulin,
        );
        record.add_indicator("Tg", 0.21, "ng/mL", "3.5-77");

        let json = records_to_json(&[record.clone()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["date"], "2024-05-20");
        assert_eq!(value[0]["type"], "thyroglobulin");
        assert_eq!(value[0]["indicators"][0]["status"], "low");

        let parsed = parse_json(&json).unwrap();
        assert_eq!(parsed, vec![JsonRecord::from(&record)]);
    }
}
