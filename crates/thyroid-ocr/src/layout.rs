//! Table reconstruction: fragments → rows, and result-column detection.

use crate::numeric::{normalize_text, parse_value_token};
use crate::observation::{BoundingBox, TextObservation};

/// Fraction of the median fragment height two centers may differ by and
/// still sit on the same row.
const ROW_TOLERANCE_FACTOR: f64 = 0.6;

/// Lower bound on the row tolerance, for pages with tiny glyph boxes.
const MIN_ROW_TOLERANCE: f64 = 0.004;

/// Maximum horizontal distance between numeric fragment centers in one column.
pub const COLUMN_TOLERANCE: f64 = 0.05;

/// Minimum numeric fragments needed before a column counts as the result column.
const MIN_COLUMN_MEMBERS: usize = 2;

/// A usable observation with a stable id (its index in the input slice).
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id: usize,
    /// Text after full-width/half-width normalization
    pub text: String,
    pub confidence: f64,
    pub bounds: BoundingBox,
}

/// Fragments sharing a vertical band, ordered left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub fragments: Vec<Fragment>,
    center_y: f64,
}

impl Row {
    fn start(fragment: Fragment) -> Self {
        let center_y = fragment.bounds.center_y();
        Self {
            fragments: vec![fragment],
            center_y,
        }
    }

    fn push(&mut self, fragment: Fragment) {
        let n = self.fragments.len() as f64;
        self.center_y = (self.center_y * n + fragment.bounds.center_y()) / (n + 1.0);
        self.fragments.push(fragment);
    }

    /// Mean vertical center of the row.
    pub fn center_y(&self) -> f64 {
        self.center_y
    }

    /// Row text, fragments joined by a single space.
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Group observations into rows by vertical proximity.
///
/// Unusable observations (empty text, bad confidence, broken boxes) are
/// dropped. Rows come back top to bottom.
pub fn cluster_rows(observations: &[TextObservation]) -> Vec<Row> {
    let mut fragments: Vec<Fragment> = observations
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_usable())
        .map(|(id, o)| Fragment {
            id,
            text: normalize_text(o.text.trim()),
            confidence: o.confidence,
            bounds: o.bounds,
        })
        .collect();

    if fragments.is_empty() {
        return Vec::new();
    }

    let tolerance = row_tolerance(&fragments);
    fragments.sort_by(|a, b| a.bounds.center_y().total_cmp(&b.bounds.center_y()));

    let mut rows: Vec<Row> = Vec::new();
    for fragment in fragments {
        match rows.last_mut() {
            Some(row) if (fragment.bounds.center_y() - row.center_y()).abs() <= tolerance => {
                row.push(fragment)
            }
            _ => rows.push(Row::start(fragment)),
        }
    }

    for row in &mut rows {
        row.fragments.sort_by(|a, b| a.bounds.x.total_cmp(&b.bounds.x));
    }

    tracing::debug!(rows = rows.len(), tolerance, "Clustered OCR fragments into rows");
    rows
}

/// Row tolerance derived from the median fragment height.
pub fn row_tolerance(fragments: &[Fragment]) -> f64 {
    let mut heights: Vec<f64> = fragments.iter().map(|f| f.bounds.height).collect();
    if heights.is_empty() {
        return MIN_ROW_TOLERANCE;
    }
    heights.sort_by(f64::total_cmp);
    let median = heights[heights.len() / 2];
    (median * ROW_TOLERANCE_FACTOR).max(MIN_ROW_TOLERANCE)
}

/// Detect the horizontal center of the result column.
///
/// Takes the center x of every fragment that parses as a value and returns
/// the mean of the most populated cluster, provided it spans at least two
/// rows.
pub fn value_column(rows: &[Row]) -> Option<f64> {
    let positions: Vec<(usize, f64)> = rows
        .iter()
        .enumerate()
        .flat_map(|(row_idx, row)| {
            row.fragments
                .iter()
                .filter(|f| parse_value_token(&f.text).is_some())
                .map(move |f| (row_idx, f.bounds.center_x()))
        })
        .collect();

    let mut best: Option<(f64, usize)> = None;
    for &(_, x) in &positions {
        let members: Vec<&(usize, f64)> = positions
            .iter()
            .filter(|(_, other)| (other - x).abs() <= COLUMN_TOLERANCE)
            .collect();

        let mut member_rows: Vec<usize> = members.iter().map(|(r, _)| *r).collect();
        member_rows.dedup();
        if member_rows.len() < MIN_COLUMN_MEMBERS {
            continue;
        }

        let count = members.len();
        if best.map_or(true, |(_, best_count)| count > best_count) {
            let mean = members.iter().map(|(_, x)| x).sum::<f64>() / count as f64;
            best = Some((mean, count));
        }
    }

    best.map(|(x, _)| x)
}
