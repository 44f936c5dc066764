//! Indicator extraction from clustered OCR rows.

use std::collections::HashSet;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use thiserror::Error;

use crate::catalog::{alias_occurrences, IndicatorSpec, INDICATORS};
use crate::date::DateExtractor;
use crate::layout::{cluster_rows, row_tolerance, value_column, Fragment, Row, COLUMN_TOLERANCE};
use crate::numeric::{
    attached_unit, find_range, find_unit, is_range_like, parse_bound_token, parse_value_token,
};
use crate::observation::TextObservation;

/// Minimum Jaro-Winkler similarity for a fuzzy name match.
const FUZZY_NAME_THRESHOLD: f64 = 0.88;

/// Fuzzy matching only considers aliases at least this long.
const FUZZY_MIN_ALIAS_LEN: usize = 4;

/// Rows above and below the name row searched by the nearby-row pass.
const NEARBY_ROW_SPAN: usize = 2;

/// Rows above and below the name row searched by the confidence-ranked pass.
const RANKED_ROW_SPAN: usize = 1;

/// Vertical band (in row tolerances) searched by the column pass.
const COLUMN_BAND_FACTOR: f64 = 2.5;

/// Extraction errors.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid observation at index {index}: {reason}")]
    InvalidObservation { index: usize, reason: String },
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Which pass accepted a value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchMethod {
    /// Number to the right of the name on the same row
    SameRow,
    /// Number on a row just above or below, right of the name
    NearbyRow,
    /// Highest-confidence plausible number near the name row
    ConfidenceRanked,
    /// Number in the detected result column at the name's height
    ColumnInference,
}

/// Kind of report the text most likely came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReportKind {
    ThyroidPanel,
    Thyroglobulin,
    Ultrasound,
}

/// One indicator reading recovered from the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedIndicator {
    /// Canonical indicator name
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub normal_range: String,
    /// Recognizer confidence of the value fragment
    pub confidence: f64,
    pub method: MatchMethod,
}

/// Everything recovered from one report image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrExtraction {
    pub indicators: Vec<ExtractedIndicator>,
    pub report_date: Option<NaiveDate>,
    pub suggested_kind: ReportKind,
    /// Indicators whose name was found but whose value was not
    pub missing: Vec<String>,
    /// Set when the user has to fill in or confirm values by hand
    pub needs_manual_completion: bool,
    /// Reconstructed page text, one line per row
    pub text: String,
}

impl OcrExtraction {
    /// Empty extraction that asks for manual entry.
    pub fn manual_fallback(text: String) -> Self {
        Self {
            indicators: Vec::new(),
            report_date: None,
            suggested_kind: ReportKind::ThyroidPanel,
            missing: Vec::new(),
            needs_manual_completion: true,
            text,
        }
    }

    pub fn indicator(&self, name: &str) -> Option<&ExtractedIndicator> {
        self.indicators
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }
}

/// Parse host-supplied observations and reject malformed entries.
pub fn parse_observations(json: &str) -> ExtractionResult<Vec<TextObservation>> {
    let observations: Vec<TextObservation> = serde_json::from_str(json)?;
    for (index, obs) in observations.iter().enumerate() {
        if !obs.confidence.is_finite() || !(0.0..=1.0).contains(&obs.confidence) {
            return Err(ExtractionError::InvalidObservation {
                index,
                reason: format!("confidence {} outside 0..1", obs.confidence),
            });
        }
        if !obs.bounds.is_valid() {
            return Err(ExtractionError::InvalidObservation {
                index,
                reason: "bounding box outside the unit square".into(),
            });
        }
    }
    Ok(observations)
}

/// A located indicator name.
#[derive(Debug, Clone)]
struct Anchor {
    spec: &'static IndicatorSpec,
    row: usize,
    /// Index into `rows[row].fragments`
    position: usize,
    /// Text of the name fragment after the name, up to the next claimed name
    tail: String,
}

/// Byte span of a claimed name inside a fragment.
#[derive(Debug, Clone, Copy)]
struct Claim {
    fragment_id: usize,
    start: usize,
    end: usize,
}

/// An accepted reading before it is turned into an `ExtractedIndicator`.
struct Reading {
    value: f64,
    unit: Option<String>,
    range: Option<String>,
    confidence: f64,
    fragment_id: usize,
}

/// Rebuilds indicator readings from OCR observations.
#[derive(Debug, Clone, Default)]
pub struct ReportExtractor {
    dates: DateExtractor,
}

impl ReportExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_extractor(dates: DateExtractor) -> Self {
        Self { dates }
    }

    /// Extract relative to the local calendar day.
    pub fn extract(&self, observations: &[TextObservation]) -> OcrExtraction {
        self.extract_relative_to(observations, Local::now().date_naive())
    }

    /// Extract, judging date plausibility against `today`.
    pub fn extract_relative_to(
        &self,
        observations: &[TextObservation],
        today: NaiveDate,
    ) -> OcrExtraction {
        let rows = cluster_rows(observations);
        let text = rows.iter().map(Row::text).collect::<Vec<_>>().join("\n");

        if rows.is_empty() {
            tracing::info!("No usable OCR text, falling back to manual entry");
            return OcrExtraction::manual_fallback(text);
        }

        let anchors = find_anchors(&rows);
        let claimed_fragments: HashSet<usize> = anchors
            .iter()
            .map(|a| rows[a.row].fragments[a.position].id)
            .collect();

        let mut consumed = claimed_fragments.clone();
        let mut readings: Vec<Option<(Reading, MatchMethod)>> =
            anchors.iter().map(|_| None).collect();

        // Each pass runs over every unresolved anchor before the next, looser
        // pass starts, so a reliable match is never stolen by a guess.
        for (i, anchor) in anchors.iter().enumerate() {
            if let Some(reading) = same_row(&rows, anchor, &claimed_fragments, &consumed) {
                consumed.insert(reading.fragment_id);
                readings[i] = Some((reading, MatchMethod::SameRow));
            }
        }
        for (i, anchor) in anchors.iter().enumerate() {
            if readings[i].is_some() {
                continue;
            }
            if let Some(reading) = nearby_row(&rows, anchor, &anchors, &consumed) {
                consumed.insert(reading.fragment_id);
                readings[i] = Some((reading, MatchMethod::NearbyRow));
            }
        }
        for (i, anchor) in anchors.iter().enumerate() {
            if readings[i].is_some() {
                continue;
            }
            if let Some(reading) = confidence_ranked(&rows, anchor, &consumed) {
                consumed.insert(reading.fragment_id);
                readings[i] = Some((reading, MatchMethod::ConfidenceRanked));
            }
        }
        if let Some(column_x) = value_column(&rows) {
            let tolerance = row_tolerance(
                &rows
                    .iter()
                    .flat_map(|r| r.fragments.iter().cloned())
                    .collect::<Vec<Fragment>>(),
            );
            for (i, anchor) in anchors.iter().enumerate() {
                if readings[i].is_some() {
                    continue;
                }
                if let Some(reading) =
                    column_inference(&rows, anchor, column_x, tolerance, &consumed)
                {
                    consumed.insert(reading.fragment_id);
                    readings[i] = Some((reading, MatchMethod::ColumnInference));
                }
            }
        }

        let mut indicators = Vec::new();
        let mut missing = Vec::new();
        for (anchor, reading) in anchors.iter().zip(readings) {
            match reading {
                Some((reading, method)) => {
                    tracing::debug!(
                        indicator = anchor.spec.name,
                        value = reading.value,
                        ?method,
                        "Accepted indicator value"
                    );
                    indicators.push(ExtractedIndicator {
                        name: anchor.spec.name.to_string(),
                        value: reading.value,
                        unit: reading
                            .unit
                            .unwrap_or_else(|| anchor.spec.default_unit.to_string()),
                        normal_range: reading
                            .range
                            .unwrap_or_else(|| anchor.spec.default_range.to_string()),
                        confidence: reading.confidence,
                        method,
                    });
                }
                None => missing.push(anchor.spec.name.to_string()),
            }
        }

        let report_date = self.dates.extract_relative_to(&text, today);
        let suggested_kind = suggest_kind(&indicators, &text);
        let needs_manual_completion = indicators.is_empty() || !missing.is_empty();

        tracing::info!(
            found = indicators.len(),
            missing = missing.len(),
            has_date = report_date.is_some(),
            "OCR extraction finished"
        );

        OcrExtraction {
            indicators,
            report_date,
            suggested_kind,
            missing,
            needs_manual_completion,
            text,
        }
    }
}

/// Guess the report kind from what was found.
pub fn suggest_kind(indicators: &[ExtractedIndicator], text: &str) -> ReportKind {
    const ULTRASOUND_KEYWORDS: &[&str] = &["超声", "彩超", "B超", "ULTRASOUND", "SONOGRA", "ECHO"];
    const PANEL: &[&str] = &["TSH", "FT3", "FT4", "T3", "T4"];

    let upper = text.to_uppercase();
    if indicators.is_empty() && ULTRASOUND_KEYWORDS.iter().any(|k| upper.contains(k)) {
        return ReportKind::Ultrasound;
    }

    let has_tg = indicators.iter().any(|i| i.name == "Tg" || i.name == "TgAb");
    let has_panel = indicators.iter().any(|i| PANEL.contains(&i.name.as_str()));
    if has_tg && !has_panel {
        ReportKind::Thyroglobulin
    } else {
        ReportKind::ThyroidPanel
    }
}

/// Locate at most one name per indicator, most specific indicators first.
fn find_anchors(rows: &[Row]) -> Vec<Anchor> {
    let mut claims: Vec<Claim> = Vec::new();
    let mut located: Vec<(&'static IndicatorSpec, usize, usize, usize)> = Vec::new();

    for spec in INDICATORS {
        if let Some((row, position, end)) = find_exact(rows, spec, &claims) {
            claim_all_aliases(&rows[row].fragments[position], spec, &mut claims);
            located.push((spec, row, position, end));
        }
    }

    for spec in INDICATORS {
        if located.iter().any(|(s, ..)| s.name == spec.name) {
            continue;
        }
        if let Some((row, position, end)) = find_fuzzy(rows, spec, &claims) {
            let fragment = &rows[row].fragments[position];
            claims.push(Claim {
                fragment_id: fragment.id,
                start: 0,
                end,
            });
            located.push((spec, row, position, end));
        }
    }

    let mut anchors: Vec<Anchor> = located
        .into_iter()
        .map(|(spec, row, position, end)| {
            let fragment = &rows[row].fragments[position];
            let stop = claims
                .iter()
                .filter(|c| c.fragment_id == fragment.id && c.start >= end)
                .map(|c| c.start)
                .min()
                .unwrap_or(fragment.text.len());
            Anchor {
                spec,
                row,
                position,
                tail: fragment.text[end..stop].to_string(),
            }
        })
        .collect();

    // Keep catalog priority but walk the page top to bottom within it.
    anchors.sort_by_key(|a| (a.row, a.position));
    tracing::debug!(anchors = anchors.len(), "Located indicator names");
    anchors
}

/// First unclaimed exact alias occurrence: (row, fragment position, name end).
fn find_exact(
    rows: &[Row],
    spec: &IndicatorSpec,
    claims: &[Claim],
) -> Option<(usize, usize, usize)> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (position, fragment) in row.fragments.iter().enumerate() {
            for alias in spec.aliases {
                for start in alias_occurrences(&fragment.text, alias) {
                    let end = start + alias.len();
                    if !overlaps_claim(claims, fragment.id, start, end) {
                        return Some((row_idx, position, end));
                    }
                }
            }
        }
    }
    None
}

fn overlaps_claim(claims: &[Claim], fragment_id: usize, start: usize, end: usize) -> bool {
    claims
        .iter()
        .any(|c| c.fragment_id == fragment_id && start < c.end && c.start < end)
}

/// Claim every alias of `spec` inside the fragment so less specific names
/// (`TSH` inside `TSH受体抗体(TRAb)`) cannot reuse it.
fn claim_all_aliases(fragment: &Fragment, spec: &IndicatorSpec, claims: &mut Vec<Claim>) {
    for alias in spec.aliases {
        for start in alias_occurrences(&fragment.text, alias) {
            claims.push(Claim {
                fragment_id: fragment.id,
                start,
                end: start + alias.len(),
            });
        }
    }
}

/// Leading name-like key of a fragment and the byte offset where it ends.
///
/// `FT 4 15.2` yields `FT4`: a lone digit after an alphabetic word is glued on.
fn leading_key(text: &str) -> Option<(String, usize)> {
    let trimmed_start = text.len() - text.trim_start().len();
    let rest = &text[trimmed_start..];
    let first_len = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let first = &rest[..first_len];
    let mut end = trimmed_start + first_len;
    let mut key: String = first
        .trim_end_matches(|c: char| matches!(c, '.' | ':' | '*' | ')' | ','))
        .to_string();

    let after = &text[end..];
    let after_trimmed = after.trim_start();
    let gap = after.len() - after_trimmed.len();
    let mut chars = after_trimmed.chars();
    if let (Some(d), next) = (chars.next(), chars.next()) {
        let lone_digit = d.is_ascii_digit() && next.map_or(true, char::is_whitespace);
        if lone_digit && !key.is_empty() && key.chars().all(|c| c.is_ascii_alphabetic()) {
            key.push(d);
            end += gap + 1;
        }
    }

    if key.is_empty() || !key.is_ascii() {
        None
    } else {
        Some((key.to_uppercase(), end))
    }
}

/// Best fuzzy match of a fragment's leading key against `spec`'s aliases.
fn find_fuzzy(
    rows: &[Row],
    spec: &IndicatorSpec,
    claims: &[Claim],
) -> Option<(usize, usize, usize)> {
    let mut best: Option<(f64, usize, usize, usize)> = None;

    for (row_idx, row) in rows.iter().enumerate() {
        for (position, fragment) in row.fragments.iter().enumerate() {
            if claims.iter().any(|c| c.fragment_id == fragment.id) {
                continue;
            }
            let Some((key, end)) = leading_key(&fragment.text) else {
                continue;
            };
            if parse_value_token(&key).is_some() {
                continue;
            }
            for alias in spec.aliases.iter().filter(|a| a.is_ascii()) {
                let alias_upper = alias.to_uppercase();
                let score = if key == alias_upper {
                    1.0
                } else if alias.len() >= FUZZY_MIN_ALIAS_LEN {
                    jaro_winkler(&key, &alias_upper)
                } else {
                    0.0
                };
                if score >= FUZZY_NAME_THRESHOLD && best.map_or(true, |(s, ..)| score > s) {
                    best = Some((score, row_idx, position, end));
                }
            }
        }
    }

    if let Some((score, ..)) = best {
        tracing::debug!(indicator = spec.name, score, "Fuzzy indicator name match");
    }
    best.map(|(_, row, position, end)| (row, position, end))
}

/// Pass 1: first number right of the name on the same row.
fn same_row(
    rows: &[Row],
    anchor: &Anchor,
    claimed: &HashSet<usize>,
    consumed: &HashSet<usize>,
) -> Option<Reading> {
    let row = &rows[anchor.row];
    let name_fragment = &row.fragments[anchor.position];

    // (token, fragment id, confidence)
    let mut tokens: Vec<(String, usize, f64)> = anchor
        .tail
        .split_whitespace()
        .map(|t| (t.to_string(), name_fragment.id, name_fragment.confidence))
        .collect();
    for fragment in &row.fragments[anchor.position + 1..] {
        if claimed.contains(&fragment.id) {
            break;
        }
        if consumed.contains(&fragment.id) {
            continue;
        }
        tokens.extend(
            fragment
                .text
                .split_whitespace()
                .map(|t| (t.to_string(), fragment.id, fragment.confidence)),
        );
    }

    let value_at = tokens
        .iter()
        .position(|(t, ..)| parse_value_token(t).is_some() && !is_range_like(t));

    let (value, index) = match value_at {
        Some(index) => (parse_value_token(&tokens[index].0)?, index),
        None => {
            // `<10.0 IU/mL <115`: a bound reading followed by a bound range.
            let bounds: Vec<usize> = tokens
                .iter()
                .enumerate()
                .filter(|(_, (t, ..))| parse_bound_token(t).is_some())
                .map(|(i, _)| i)
                .collect();
            if bounds.len() < 2 {
                return None;
            }
            (parse_bound_token(&tokens[bounds[0]].0)?, bounds[0])
        }
    };

    let (token, fragment_id, confidence) = &tokens[index];
    let rest = tokens[index + 1..]
        .iter()
        .map(|(t, ..)| t.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    Some(Reading {
        value,
        unit: attached_unit(token).or_else(|| find_unit(&rest)),
        range: find_range(&rest),
        confidence: *confidence,
        fragment_id: *fragment_id,
    })
}

/// Unit and range from whatever follows a fragment on its row.
fn row_context(row: &Row, fragment: &Fragment) -> (Option<String>, Option<String>) {
    let rest = row
        .fragments
        .iter()
        .filter(|f| f.bounds.x > fragment.bounds.x)
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let unit = attached_unit(&fragment.text).or_else(|| find_unit(&rest));
    (unit, find_range(&rest))
}

fn first_token_value(fragment: &Fragment) -> Option<f64> {
    let token = fragment.text.split_whitespace().next()?;
    if is_range_like(token) {
        return None;
    }
    parse_value_token(token)
}

/// Pass 2: rows just below/above, right of the name, not holding another name.
fn nearby_row(
    rows: &[Row],
    anchor: &Anchor,
    anchors: &[Anchor],
    consumed: &HashSet<usize>,
) -> Option<Reading> {
    let name_fragment = &rows[anchor.row].fragments[anchor.position];
    let min_x = name_fragment.bounds.right() - 0.01;

    for distance in 1..=NEARBY_ROW_SPAN {
        let below = anchor.row + distance;
        let above = anchor.row.checked_sub(distance);
        for row_idx in [Some(below), above].into_iter().flatten() {
            let Some(row) = rows.get(row_idx) else {
                continue;
            };
            if anchors.iter().any(|a| a.row == row_idx) {
                continue;
            }
            for fragment in &row.fragments {
                if fragment.bounds.x < min_x || consumed.contains(&fragment.id) {
                    continue;
                }
                let Some(value) = first_token_value(fragment) else {
                    continue;
                };
                if !anchor.spec.is_plausible(value) {
                    continue;
                }
                let (unit, range) = row_context(row, fragment);
                return Some(Reading {
                    value,
                    unit,
                    range,
                    confidence: fragment.confidence,
                    fragment_id: fragment.id,
                });
            }
        }
    }
    None
}

/// Pass 3: most confident plausible number on or next to the name row.
fn confidence_ranked(rows: &[Row], anchor: &Anchor, consumed: &HashSet<usize>) -> Option<Reading> {
    let first = anchor.row.saturating_sub(RANKED_ROW_SPAN);
    let last = (anchor.row + RANKED_ROW_SPAN).min(rows.len() - 1);

    let mut candidates: Vec<(usize, &Fragment, f64)> = Vec::new();
    for (row_idx, row) in rows.iter().enumerate().take(last + 1).skip(first) {
        for fragment in &row.fragments {
            if consumed.contains(&fragment.id) {
                continue;
            }
            if let Some(value) = first_token_value(fragment) {
                if anchor.spec.is_plausible(value) {
                    candidates.push((row_idx, fragment, value));
                }
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.1.confidence
            .total_cmp(&a.1.confidence)
            .then_with(|| a.0.abs_diff(anchor.row).cmp(&b.0.abs_diff(anchor.row)))
    });

    let (row_idx, fragment, value) = candidates.into_iter().next()?;
    let (unit, range) = row_context(&rows[row_idx], fragment);
    Some(Reading {
        value,
        unit,
        range,
        confidence: fragment.confidence,
        fragment_id: fragment.id,
    })
}

/// Pass 4: the fragment sitting in the result column at the name's height.
fn column_inference(
    rows: &[Row],
    anchor: &Anchor,
    column_x: f64,
    tolerance: f64,
    consumed: &HashSet<usize>,
) -> Option<Reading> {
    let center_y = rows[anchor.row].center_y();
    let band = tolerance * COLUMN_BAND_FACTOR;

    let mut best: Option<(f64, usize, &Fragment, f64)> = None;
    for (row_idx, row) in rows.iter().enumerate() {
        for fragment in &row.fragments {
            if consumed.contains(&fragment.id) {
                continue;
            }
            let dy = (fragment.bounds.center_y() - center_y).abs();
            let dx = (fragment.bounds.center_x() - column_x).abs();
            if dy > band || dx > COLUMN_TOLERANCE {
                continue;
            }
            let Some(value) = first_token_value(fragment) else {
                continue;
            };
            if best.map_or(true, |(best_dy, ..)| dy < best_dy) {
                best = Some((dy, row_idx, fragment, value));
            }
        }
    }

    let (_, row_idx, fragment, value) = best?;
    let (unit, range) = row_context(&rows[row_idx], fragment);
    Some(Reading {
        value,
        unit,
        range,
        confidence: fragment.confidence,
        fragment_id: fragment.id,
    })
}
