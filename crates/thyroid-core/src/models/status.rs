//! Indicator status derived from a reference range string.

use serde::{Deserialize, Serialize};

/// Where a reading sits relative to its reference range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorStatus {
    Low,
    Normal,
    High,
}

/// A parsed reference range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceRange {
    /// `a-b`
    Between { low: f64, high: f64 },
    /// `<x`
    Below { high: f64 },
}

impl ReferenceRange {
    /// Parse a range as printed on reports.
    ///
    /// Accepts `a-b` (also with `–`, `~` or full-width separators) and `<x`
    /// (also `<=x`, `≤x`, `＜x`). Whitespace is ignored. Anything else,
    /// including `a-b` with `a > b`, is `None`.
    pub fn parse(range: &str) -> Option<Self> {
        let cleaned: String = range
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '－' | '–' | '—' | '~' | '～' | '〜' => '-',
                '＜' | '≤' => '<',
                '．' => '.',
                other => other,
            })
            .collect();

        if let Some(rest) = cleaned.strip_prefix('<') {
            let rest = rest.strip_prefix('=').unwrap_or(rest);
            let high = parse_bound(rest)?;
            return Some(ReferenceRange::Below { high });
        }

        let (low, high) = cleaned.split_once('-')?;
        let low = parse_bound(low)?;
        let high = parse_bound(high)?;
        if low > high {
            return None;
        }
        Some(ReferenceRange::Between { low, high })
    }

    pub fn classify(&self, value: f64) -> IndicatorStatus {
        match *self {
            ReferenceRange::Between { low, .. } if value < low => IndicatorStatus::Low,
            ReferenceRange::Between { high, .. } | ReferenceRange::Below { high }
                if value > high =>
            {
                IndicatorStatus::High
            }
            _ => IndicatorStatus::Normal,
        }
    }
}

fn parse_bound(s: &str) -> Option<f64> {
    let value: f64 = s.parse().ok()?;
    value.is_finite().then_some(value)
}

impl IndicatorStatus {
    /// Status of `value` against `range`. Unparseable ranges and non-finite
    /// values are `Normal`.
    pub fn derive(value: f64, range: &str) -> Self {
        if !value.is_finite() {
            return IndicatorStatus::Normal;
        }
        ReferenceRange::parse(range)
            .map(|r| r.classify(value))
            .unwrap_or(IndicatorStatus::Normal)
    }

    /// Storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorStatus::Low => "low",
            IndicatorStatus::Normal => "normal",
            IndicatorStatus::High => "high",
        }
    }

    /// Label used in exported reports.
    pub fn label(&self) -> &'static str {
        match self {
            IndicatorStatus::Low => "Low",
            IndicatorStatus::Normal => "Normal",
            IndicatorStatus::High => "High",
        }
    }

    /// Parse a storage key or report label.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(IndicatorStatus::Low),
            "normal" => Some(IndicatorStatus::Normal),
            "high" => Some(IndicatorStatus::High),
            _ => None,
        }
    }

    pub fn is_abnormal(&self) -> bool {
        !matches!(self, IndicatorStatus::Normal)
    }
}
