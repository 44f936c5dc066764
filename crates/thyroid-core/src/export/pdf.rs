//! Paginated A4 PDF report.

use std::io::BufWriter;

use chrono::NaiveDate;
use printpdf::*;

use super::{ExportError, ExportResult};
use crate::models::CheckupRecord;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM_MARGIN: f32 = 20.0;
const LEFT: f32 = 20.0;
const LINE: f32 = 5.0;

/// Table columns: (header, x offset in mm).
const COLUMNS: [(&str, f32); 5] = [
    ("Indicator", 25.0),
    ("Value", 70.0),
    ("Unit", 95.0),
    ("Range", 125.0),
    ("Status", 165.0),
];

/// Writes text top to bottom and starts a new page when the cursor
/// reaches the bottom margin.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> ExportResult<Self> {
        let (doc, page1, layer1) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Pdf(format!("font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Pdf(format!("font error: {e}")))?;
        Ok(Self {
            doc,
            layer,
            font,
            bold,
            y: TOP,
            pages: 1,
        })
    }

    /// Make room for `height` mm, breaking the page if needed.
    fn reserve(&mut self, height: f32) {
        if self.y - height < BOTTOM_MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
            self.pages += 1;
        }
    }

    fn text(&self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.font };
        self.layer
            .use_text(pdf_safe(text), size, Mm(x), Mm(self.y), font);
    }

    fn advance(&mut self, height: f32) {
        self.y -= height;
    }

    fn finish(self) -> ExportResult<Vec<u8>> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| ExportError::Pdf(format!("save error: {e}")))?;
        buf.into_inner()
            .map_err(|e| ExportError::Pdf(format!("buffer error: {e}")))
    }
}

/// Render records into PDF bytes.
pub fn records_to_pdf(records: &[CheckupRecord], generated_on: NaiveDate) -> ExportResult<Vec<u8>> {
    layout(records, generated_on)?.finish()
}

fn layout(records: &[CheckupRecord], generated_on: NaiveDate) -> ExportResult<PageWriter> {
    let title = "Thyroid Checkup Report";
    let mut writer = PageWriter::new(title)?;

    writer.text(title, 16.0, LEFT, true);
    writer.advance(7.0);
    writer.text(&format!("Generated {}", generated_on), 9.0, LEFT, false);
    writer.advance(LINE);
    writer.text(&format!("{} records", records.len()), 9.0, LEFT, false);
    writer.advance(LINE * 2.0);

    for record in records {
        // Keep the record heading with its table header.
        writer.reserve(LINE * 3.0);
        writer.text(
            &format!("{}  {}", record.date, record.checkup_type.display_name()),
            11.0,
            LEFT,
            true,
        );
        writer.advance(LINE + 1.0);

        if let Some(notes) = record.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            for line in wrap_text(notes, 90) {
                writer.reserve(LINE);
                writer.text(&line, 9.0, LEFT + 5.0, false);
                writer.advance(LINE);
            }
        }

        if !record.indicators.is_empty() {
            writer.reserve(LINE);
            for (header, x) in COLUMNS {
                writer.text(header, 9.0, x, true);
            }
            writer.advance(LINE);

            for indicator in &record.indicators {
                writer.reserve(LINE);
                let value = indicator.value.to_string();
                let cells = [
                    indicator.name.as_str(),
                    value.as_str(),
                    indicator.unit.as_str(),
                    indicator.normal_range.as_str(),
                    indicator.status.label(),
                ];
                for (i, ((_, x), cell)) in COLUMNS.iter().zip(cells).enumerate() {
                    // Abnormal status in bold
                    let bold = i == COLUMNS.len() - 1 && indicator.status.is_abnormal();
                    writer.text(cell, 9.0, *x, bold);
                }
                writer.advance(LINE);
            }
        }
        writer.advance(LINE);
    }

    tracing::debug!(records = records.len(), pages = writer.pages, "Laid out PDF report");
    Ok(writer)
}

/// Builtin PDF fonts only cover Latin-1; anything else is replaced.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| if (c as u32) < 0x100 && !c.is_control() { c } else { '?' })
        .collect()
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckupType;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_pdf_bytes() {
        let mut record = CheckupRecord::new(day(), CheckupType::Comprehensive);
        record.notes = Some("复查 after dose change".into());
        record.add_indicator("TSH", 5.1, "mIU/L", "0.27-4.2");

        let bytes = records_to_pdf(&[record], day()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    fn panels(count: usize) -> Vec<CheckupRecord> {
        (0..count)
            .map(|_| {
                let mut record = CheckupRecord::new(day(), CheckupType::Comprehensive);
                for name in ["TSH", "FT3", "FT4", "TPOAb", "TgAb"] {
                    record.add_indicator(name, 1.0, "u", "0-2");
                }
                record
            })
            .collect()
    }

    #[test]
    fn test_single_record_fits_one_page() {
        let writer = layout(&panels(1), day()).unwrap();
        assert_eq!(writer.pages, 1);
        assert!(writer.y >= BOTTOM_MARGIN);
    }

    #[test]
    fn test_many_records_paginate() {
        let records = panels(40);
        let writer = layout(&records, day()).unwrap();
        // Each panel needs about 41mm of a 260mm page
        assert!(writer.pages >= 6, "only {} pages", writer.pages);

        let bytes = writer.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_pdf_safe_replaces_cjk() {
        assert_eq!(pdf_safe("TSH 促甲状腺"), "TSH ????");
        assert_eq!(pdf_safe("µIU/mL"), "µIU/mL");
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
        assert!(wrap_text("", 10).is_empty());
    }
}
