//! CSV export: UTF-8 with BOM, one row per indicator.

use serde::{Deserialize, Serialize};

use super::{ExportError, ExportResult};
use crate::models::CheckupRecord;

/// Byte order mark so spreadsheet apps detect UTF-8.
pub const UTF8_BOM: &str = "\u{FEFF}";

/// Fixed column order.
pub const CSV_HEADER: [&str; 8] = [
    "date",
    "type",
    "indicator",
    "value",
    "unit",
    "range",
    "status",
    "notes",
];

/// One exported line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsvRow {
    pub date: String,
    pub checkup_type: String,
    pub indicator: String,
    pub value: f64,
    pub unit: String,
    pub range: String,
    pub status: String,
    pub notes: String,
}

/// Render records as CSV. Records without indicators produce no rows.
pub fn records_to_csv(records: &[CheckupRecord]) -> String {
    let mut csv = String::from(UTF8_BOM);

    // Header
    csv.push_str(&CSV_HEADER.join(","));
    csv.push_str("\r\n");

    for record in records {
        let date = record.date.format("%Y-%m-%d").to_string();
        let notes = record.notes.as_deref().unwrap_or("");
        for indicator in &record.indicators {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{}\r\n",
                date,
                escape_csv(record.checkup_type.display_name()),
                escape_csv(&indicator.name),
                indicator.value,
                escape_csv(&indicator.unit),
                escape_csv(&indicator.normal_range),
                indicator.status.label(),
                escape_csv(notes),
            ));
        }
    }

    csv
}

/// Escape a value for CSV.
pub fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Parse an export produced by [`records_to_csv`].
pub fn parse_csv(text: &str) -> ExportResult<Vec<CsvRow>> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let mut lines = split_records(text)?.into_iter();

    let header = lines
        .next()
        .ok_or_else(|| ExportError::Csv("missing header".into()))?;
    if header != CSV_HEADER {
        return Err(ExportError::Csv(format!("unexpected header {:?}", header)));
    }

    let mut rows = Vec::new();
    for (index, fields) in lines.enumerate() {
        let line = index + 2;
        let [date, checkup_type, indicator, value, unit, range, status, notes]: [String; 8] =
            fields.try_into().map_err(|fields: Vec<String>| {
                ExportError::Csv(format!("line {}: expected 8 fields, got {}", line, fields.len()))
            })?;
        let value = value
            .parse::<f64>()
            .map_err(|_| ExportError::Csv(format!("line {}: invalid value {:?}", line, value)))?;
        rows.push(CsvRow {
            date,
            checkup_type,
            indicator,
            value,
            unit,
            range,
            status,
            notes,
        });
    }
    Ok(rows)
}

/// Split CSV text into records of fields, honoring quotes.
fn split_records(text: &str) -> ExportResult<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut fields));
            }
            other => field.push(other),
        }
    }

    if in_quotes {
        return Err(ExportError::Csv("unterminated quoted field".into()));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(fields);
    }
    Ok(records)
}
