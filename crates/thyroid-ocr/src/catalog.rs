//! Known thyroid indicators and how reports spell them.

/// A recognizable indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSpec {
    /// Canonical short name stored on records
    pub name: &'static str,
    /// Spellings seen on reports, matched case-insensitively
    pub aliases: &'static [&'static str],
    /// Unit used when the report row has none
    pub default_unit: &'static str,
    /// Reference range used when the report row has none
    pub default_range: &'static str,
    /// Values outside this window are not accepted by the loose search passes
    pub plausible: (f64, f64),
}

impl IndicatorSpec {
    pub fn is_plausible(&self, value: f64) -> bool {
        value >= self.plausible.0 && value <= self.plausible.1
    }
}

/// Catalog in match-priority order.
///
/// Antibodies and free hormones come before the bare names they contain
/// (`促甲状腺激素受体抗体` contains `促甲状腺激素`, `FT3` contains `T3`), so the
/// more specific indicator claims a fragment first.
pub static INDICATORS: &[IndicatorSpec] = &[
    IndicatorSpec {
        name: "TRAb",
        aliases: &["TRAb", "TR-Ab", "促甲状腺激素受体抗体", "促甲状腺素受体抗体", "TSH受体抗体"],
        default_unit: "IU/L",
        default_range: "<1.75",
        plausible: (0.0, 100.0),
    },
    IndicatorSpec {
        name: "TPOAb",
        aliases: &["TPOAb", "TPO-Ab", "A-TPO", "ATPO", "抗甲状腺过氧化物酶抗体", "甲状腺过氧化物酶抗体"],
        default_unit: "IU/mL",
        default_range: "<34",
        plausible: (0.0, 10000.0),
    },
    IndicatorSpec {
        name: "TgAb",
        aliases: &["TgAb", "Tg-Ab", "A-TG", "ATG", "抗甲状腺球蛋白抗体", "甲状腺球蛋白抗体"],
        default_unit: "IU/mL",
        default_range: "<115",
        plausible: (0.0, 10000.0),
    },
    IndicatorSpec {
        name: "FT3",
        aliases: &["FT3", "游离三碘甲状腺原氨酸", "游离T3"],
        default_unit: "pmol/L",
        default_range: "3.1-6.8",
        plausible: (0.1, 50.0),
    },
    IndicatorSpec {
        name: "FT4",
        aliases: &["FT4", "游离甲状腺素", "游离T4"],
        default_unit: "pmol/L",
        default_range: "12-22",
        plausible: (0.1, 150.0),
    },
    IndicatorSpec {
        name: "TSH",
        aliases: &["TSH", "促甲状腺激素", "促甲状腺素"],
        default_unit: "mIU/L",
        default_range: "0.27-4.2",
        plausible: (0.0, 200.0),
    },
    IndicatorSpec {
        name: "T3",
        aliases: &["TT3", "T3", "总三碘甲状腺原氨酸", "三碘甲状腺原氨酸"],
        default_unit: "nmol/L",
        default_range: "1.3-3.1",
        plausible: (0.1, 20.0),
    },
    IndicatorSpec {
        name: "T4",
        aliases: &["TT4", "T4", "总甲状腺素", "甲状腺素"],
        default_unit: "nmol/L",
        default_range: "66-181",
        plausible: (1.0, 400.0),
    },
    IndicatorSpec {
        name: "Tg",
        aliases: &["Tg", "甲状腺球蛋白"],
        default_unit: "ng/mL",
        default_range: "3.5-77",
        plausible: (0.0, 100000.0),
    },
];

/// Look up a spec by canonical name or alias.
pub fn find_spec(name: &str) -> Option<&'static IndicatorSpec> {
    let upper = name.trim().to_uppercase();
    INDICATORS.iter().find(|spec| {
        spec.name.to_uppercase() == upper || spec.aliases.iter().any(|a| a.to_uppercase() == upper)
    })
}

/// Byte offsets of every occurrence of `alias` in `text` (compared
/// upper-cased).
///
/// ASCII aliases must sit on ASCII word boundaries so `T3` does not match
/// inside `FT3`; non-ASCII aliases match as plain substrings.
pub fn alias_occurrences(text: &str, alias: &str) -> Vec<usize> {
    let haystack = text.to_uppercase();
    let needle = alias.to_uppercase();
    if needle.is_empty() || haystack.len() != text.len() {
        // Upper-casing changed byte lengths; offsets would not map back.
        return Vec::new();
    }

    let bytes = haystack.as_bytes();
    let mut found = Vec::new();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(&needle) {
        let at = start + pos;
        let end = at + needle.len();
        let on_boundary = !alias.is_ascii()
            || ((at == 0 || !bytes[at - 1].is_ascii_alphanumeric())
                && (end >= bytes.len() || !bytes[end].is_ascii_alphanumeric()));
        if on_boundary {
            found.push(at);
        }
        start = at + 1;
        while !haystack.is_char_boundary(start) {
            start += 1;
        }
    }
    found
}
