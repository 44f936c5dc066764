//! Value, unit and reference-range tokens as they appear on lab reports.

use std::sync::LazyLock;

use regex::Regex;

/// A number, optionally wrapped in abnormal-flag markers, optionally followed
/// by an attached unit: `2.35`, `5.8↑`, `↓0.01`, `12.4H`, `4.2mIU/L`.
static VALUE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[↑↓*]*(\d+(?:\.\d+)?)[↑↓*]*(?:[HL]|([A-Za-zμµ%][A-Za-zμµ%/0-9^.]*))?[↑↓*]*$")
        .unwrap()
});

/// Upper-bound-only token: `<34`, `<=1.75`, `≤115`.
static BOUND_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:<=?|≤)\s*(\d+(?:\.\d+)?)$").unwrap());

/// Reference range anywhere in a string: `0.27-4.2`, `3.1 ~ 6.8`, `<34`.
static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*[-–~]\s*(\d+(?:\.\d+)?)|(?:<=?|≤)\s*(\d+(?:\.\d+)?)").unwrap()
});

/// Units seen on thyroid panels.
static UNIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(m[iu]U/L|[μµu]IU/mL|mU/L|kIU/L|pmol/L|nmol/L|ng/dL|ng/mL|pg/mL|[μµu]g/L|[μµu]g/dL|IU/mL|IU/L|U/mL)",
    )
    .unwrap()
});

/// Map full-width punctuation and digits to ASCII so the patterns above
/// see one alphabet.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' | 'Ａ'..='Ｚ' | 'ａ'..='ｚ' => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            }
            '．' | '。' => '.',
            '：' => ':',
            '－' | '—' => '-',
            '～' | '〜' => '~',
            '＜' => '<',
            '＞' => '>',
            '（' => '(',
            '）' => ')',
            '／' => '/',
            '　' => ' ',
            other => other,
        })
        .collect()
}

/// Parse a single value token, stripping flag markers.
pub fn parse_value_token(token: &str) -> Option<f64> {
    let caps = VALUE_TOKEN.captures(token.trim())?;
    caps.get(1)?.as_str().parse().ok()
}

/// Unit glued to a value token (`4.2mIU/L` → `mIU/L`), if it is a known unit.
pub fn attached_unit(token: &str) -> Option<String> {
    let caps = VALUE_TOKEN.captures(token.trim())?;
    let suffix = caps.get(2)?.as_str();
    find_unit(suffix)
}

/// Parse an upper-bound-only token (`<34`).
pub fn parse_bound_token(token: &str) -> Option<f64> {
    let caps = BOUND_TOKEN.captures(token.trim())?;
    caps.get(1)?.as_str().parse().ok()
}

/// First reference range in `text`, rendered canonically (`0.27-4.2`, `<34`).
pub fn find_range(text: &str) -> Option<String> {
    let caps = RANGE_PATTERN.captures(text)?;
    if let (Some(low), Some(high)) = (caps.get(1), caps.get(2)) {
        return Some(format!("{}-{}", low.as_str(), high.as_str()));
    }
    caps.get(3).map(|high| format!("<{}", high.as_str()))
}

/// First known unit in `text`.
pub fn find_unit(text: &str) -> Option<String> {
    UNIT_PATTERN
        .find(text)
        .map(|m| m.as_str().replace('µ', "μ"))
}

/// Whether a token looks like a reference range rather than a reading.
pub fn is_range_like(token: &str) -> bool {
    let trimmed = token.trim();
    parse_value_token(trimmed).is_none()
        && RANGE_PATTERN
            .find(trimmed)
            .map_or(false, |m| m.start() == 0 && m.end() == trimmed.len())
}
