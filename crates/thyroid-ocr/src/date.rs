//! Report date extraction from OCR text.
//!
//! Patterns are tried in a fixed order (labeled date, Chinese long form,
//! year-first numeric, Western orderings). The first match that parses into
//! a calendar date inside the plausibility window wins.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{Days, Local, Months, NaiveDate};
use regex::{Captures, Regex};

use crate::numeric::normalize_text;

/// Default number of days a report date may lie in the future.
pub const DEFAULT_MAX_FUTURE_DAYS: u64 = 2;

/// Default number of years a report date may lie in the past.
pub const DEFAULT_MAX_PAST_YEARS: u32 = 15;

/// How the numeric groups of a pattern map onto year, month and day.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Layout {
    /// Groups: year, month, day
    YearMonthDay,
    /// Groups: a, b, year. Tried as month/day, then day/month.
    AmbiguousWithYearLast,
    /// Groups: month name, day, year
    MonthNameDayYear,
    /// Groups: day, month name, year
    DayMonthNameYear,
}

struct DatePattern {
    regex: Regex,
    layout: Layout,
}

/// Labels that introduce the report date on Chinese and English reports.
static LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:报告日期|报告时间|采样日期|采样时间|采集日期|采集时间|检验日期|送检日期|检查日期|接收日期|\breport(?:ed)?\b(?:\s*date\b)?|\bcollect(?:ed|ion)\b(?:\s*date\b)?|\bsample\s*date\b|\bdate\b)\s*[:]?\s*",
    )
    .unwrap()
});

/// Birth-date labels. Dates they introduce are never the report date.
static BIRTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:出生日期|出生年月日?|出生|\bbirth\s*(?:date|day)?\b|\bdate\s+of\s+birth\b|\bd\.?o\.?b\b\.?)\s*[:]?\s*",
    )
    .unwrap()
});

/// Bytes of slack between a birth label and the date it introduces.
const BIRTH_SLACK: usize = 3;

/// Unlabeled patterns in priority order.
static PATTERNS: LazyLock<Vec<DatePattern>> = LazyLock::new(|| {
    vec![
        // 2024年3月15日
        DatePattern {
            regex: Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日?").unwrap(),
            layout: Layout::YearMonthDay,
        },
        // 2024-03-15, 2024/3/15, 2024.03.15
        DatePattern {
            regex: Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").unwrap(),
            layout: Layout::YearMonthDay,
        },
        // 03/15/2024, 15.03.2024
        DatePattern {
            regex: Regex::new(r"(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})").unwrap(),
            layout: Layout::AmbiguousWithYearLast,
        },
        // March 15, 2024
        DatePattern {
            regex: Regex::new(
                r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+(\d{1,2}),?\s+(\d{4})",
            )
            .unwrap(),
            layout: Layout::MonthNameDayYear,
        },
        // 15 Mar 2024
        DatePattern {
            regex: Regex::new(
                r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})",
            )
            .unwrap(),
            layout: Layout::DayMonthNameYear,
        },
    ]
});

/// Extracts the report date from recognized text.
#[derive(Debug, Clone, PartialEq)]
pub struct DateExtractor {
    max_future_days: u64,
    max_past_years: u32,
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FUTURE_DAYS, DEFAULT_MAX_PAST_YEARS)
    }
}

impl DateExtractor {
    pub fn new(max_future_days: u64, max_past_years: u32) -> Self {
        Self {
            max_future_days,
            max_past_years,
        }
    }

    /// Extract a date relative to the local calendar day.
    pub fn extract(&self, text: &str) -> Option<NaiveDate> {
        self.extract_relative_to(text, Local::now().date_naive())
    }

    /// Extract a date, judging plausibility against `today`.
    pub fn extract_relative_to(&self, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        let text = normalize_text(text);
        let birth: Vec<Range<usize>> = BIRTH.find_iter(&text).map(|m| m.range()).collect();

        // Labeled dates first: parse whatever follows the label.
        for label in LABELED.find_iter(&text) {
            if birth.iter().any(|b| label.start() < b.end && b.start < label.end()) {
                continue;
            }
            let tail: String = text[label.end()..].chars().take(24).collect();
            if let Some(date) = self.first_plausible(&tail, today, &[]) {
                tracing::debug!(%date, label = label.as_str().trim(), "Matched labeled report date");
                return Some(date);
            }
        }

        let date = self.first_plausible(&text, today, &birth);
        if let Some(date) = date {
            tracing::debug!(%date, "Matched unlabeled report date");
        }
        date
    }

    /// Whether `date` lies inside the window around `today`.
    pub fn is_plausible(&self, date: NaiveDate, today: NaiveDate) -> bool {
        let latest = today
            .checked_add_days(Days::new(self.max_future_days))
            .unwrap_or(NaiveDate::MAX);
        let earliest = today
            .checked_sub_months(Months::new(self.max_past_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);
        date >= earliest && date <= latest
    }

    /// First plausible date in `text`, skipping dates that directly follow
    /// one of the `birth` label spans.
    fn first_plausible(
        &self,
        text: &str,
        today: NaiveDate,
        birth: &[Range<usize>],
    ) -> Option<NaiveDate> {
        for pattern in PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(text) {
                let start = caps.get(0).map_or(0, |m| m.start());
                if birth
                    .iter()
                    .any(|b| start >= b.start && start <= b.end + BIRTH_SLACK)
                {
                    continue;
                }
                let found = candidates(&caps, pattern.layout)
                    .into_iter()
                    .find(|d| self.is_plausible(*d, today));
                if found.is_some() {
                    return found;
                }
            }
        }
        None
    }
}

/// Calendar dates a match could denote, most likely first.
fn candidates(caps: &Captures<'_>, layout: Layout) -> Vec<NaiveDate> {
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let month_name = |i: usize| caps.get(i).and_then(|m| month_from_name(m.as_str()));

    let ymd = |y: Option<u32>, m: Option<u32>, d: Option<u32>| -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(i32::try_from(y?).ok()?, m?, d?)
    };

    match layout {
        Layout::YearMonthDay => ymd(num(1), num(2), num(3)).into_iter().collect(),
        Layout::AmbiguousWithYearLast => [ymd(num(3), num(1), num(2)), ymd(num(3), num(2), num(1))]
            .into_iter()
            .flatten()
            .collect(),
        Layout::MonthNameDayYear => ymd(num(3), month_name(1), num(2)).into_iter().collect(),
        Layout::DayMonthNameYear => ymd(num(3), month_name(2), num(1)).into_iter().collect(),
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" | "sept" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn extract(text: &str) -> Option<NaiveDate> {
        DateExtractor::default().extract_relative_to(text, today())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_chinese_long_form() {
        assert_eq!(extract("检查于2024年3月15日完成"), Some(date(2024, 3, 15)));
    }

    #[test]
    fn test_year_first_numeric() {
        assert_eq!(extract("2024-03-15 08:30"), Some(date(2024, 3, 15)));
        assert_eq!(extract("2024/3/5"), Some(date(2024, 3, 5)));
        assert_eq!(extract("2024.03.15"), Some(date(2024, 3, 15)));
    }

    #[test]
    fn test_western_orderings() {
        assert_eq!(extract("03/15/2024"), Some(date(2024, 3, 15)));
        // Month-first is invalid, falls back to day-first
        assert_eq!(extract("15/03/2024"), Some(date(2024, 3, 15)));
        assert_eq!(extract("March 15, 2024"), Some(date(2024, 3, 15)));
        assert_eq!(extract("15 Mar 2024"), Some(date(2024, 3, 15)));
    }

    #[test]
    fn test_labeled_date_wins_over_earlier_dates() {
        let text = "出生日期 1980-01-01\n申请 2024-05-01\n报告日期：2024-05-20";
        assert_eq!(extract(text), Some(date(2024, 5, 20)));
    }

    #[test]
    fn test_birth_date_is_not_report_date() {
        assert_eq!(
            extract("Birth date: 2015-03-01\nCollected: 2024-05-20"),
            Some(date(2024, 5, 20))
        );
        assert_eq!(
            extract("Date of birth: 2015-03-01\nSample date 2024-05-20"),
            Some(date(2024, 5, 20))
        );
        assert_eq!(
            extract("DOB 2012-07-09 Name: Li\n2024-05-18 TSH 2.1"),
            Some(date(2024, 5, 18))
        );
        assert_eq!(extract("出生日期：2015-03-01"), None);
    }

    #[test]
    fn test_label_needs_word_boundary() {
        // "Updated" does not contain a date label
        assert_eq!(
            extract("Updated 2015-03-01\nReport date: 2024-05-20"),
            Some(date(2024, 5, 20))
        );
        assert_eq!(extract("Reported: 2024-05-19"), Some(date(2024, 5, 19)));
    }

    #[test]
    fn test_full_width_text() {
        assert_eq!(extract("报告日期：２０２４－０５－２０"), Some(date(2024, 5, 20)));
    }

    #[test]
    fn test_future_dates_rejected() {
        assert_eq!(extract("2024-06-03"), Some(date(2024, 6, 3)));
        assert_eq!(extract("2024-06-04"), None);
    }

    #[test]
    fn test_old_dates_rejected() {
        assert_eq!(extract("2009-06-01"), Some(date(2009, 6, 1)));
        assert_eq!(extract("2009-05-31"), None);
    }

    #[test]
    fn test_implausible_match_skipped_for_later_one() {
        assert_eq!(extract("1990-01-01 then 2024-02-02"), Some(date(2024, 2, 2)));
    }

    #[test]
    fn test_no_date() {
        assert_eq!(extract("TSH 2.35 mIU/L"), None);
        assert_eq!(extract("2024-13-45"), None);
    }

    #[test]
    fn test_custom_window() {
        let extractor = DateExtractor::new(0, 1);
        assert!(extractor.is_plausible(date(2024, 6, 1), today()));
        assert!(!extractor.is_plausible(date(2024, 6, 2), today()));
        assert!(!extractor.is_plausible(date(2023, 5, 31), today()));
    }

    proptest! {
        #[test]
        fn prop_window_decides_acceptance(offset in -7000i64..7000) {
            let d = today() + chrono::Duration::days(offset);
            let inside = d >= date(2009, 6, 1) && d <= date(2024, 6, 3);
            let text = format!("报告日期 {}", d.format("%Y-%m-%d"));
            prop_assert_eq!(extract(&text), if inside { Some(d) } else { None });
        }
    }
}
