//! Value parsers and text normalizers: the leaf layer every other module builds on.

use once_cell_fallback::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Tiny local stand-in for `once_cell::sync::Lazy` scoped to this module, so the regexes
/// below are compiled once per process without adding a crate for a single use site.
mod once_cell_fallback {
    use std::sync::OnceLock;

    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Self {
                cell: OnceLock::new(),
                init,
            }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+[.,]?\d*").unwrap());
static UNIT_COLLAPSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+(mm|cm|kg|mg|w|v|amp|lt|set)\b").unwrap());

/// Clean a raw header cell into the canonical form used as a template lookup key:
/// collapse whitespace, lower-case, strip non-breaking space / tab / newline.
pub fn clean_column_name(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .replace('\t', " ")
        .replace('\n', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Negative-stock keywords, matched as a case-insensitive substring after diacritic
/// folding. Order does not matter: the check is "does any keyword occur".
const NEGATIVE_STOCK_KEYWORDS: &[&str] = &[
    "tukendi",
    "stok yok",
    "yok",
    "mevcut degil",
    "satiz yok",
    "sorunuz",
    "belirtiniz",
    "gelince",
    "siparis uzerine",
    "talep uzerine",
];

/// Parse a raw stock cell into a non-negative integer quantity. Never fails: unparsable
/// or negative-keyword cells resolve to zero, matching the "parsers always succeed"
/// error-handling posture.
pub fn parse_stock_value(raw: &str) -> i64 {
    let lowered = fold_diacritics(&raw.trim().to_lowercase());

    if NEGATIVE_STOCK_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return 0;
    }

    let cleaned = lowered.replace(',', ".");
    match INT_RE.find(&cleaned) {
        Some(m) => m.as_str().parse::<i64>().unwrap_or(0).max(0),
        None => 0,
    }
}

/// Parse a raw price cell, resolving the European-vs-US thousands/decimal separator
/// ambiguity: whichever of `.`/`,` occurs last is the decimal separator, the other (if
/// both are present) is a thousands separator to strip.
pub fn parse_price_value(raw: &str) -> Decimal {
    let trimmed: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || c.is_whitespace())
        .collect();
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }

    let last_dot = trimmed.rfind('.');
    let last_comma = trimmed.rfind(',');

    let canonical = match (last_dot, last_comma) {
        (Some(d), Some(c)) => {
            if d > c {
                // '.' is the decimal separator; ',' groups are thousands separators.
                trimmed.replace(',', "")
            } else {
                // ',' is the decimal separator; '.' groups are thousands separators.
                trimmed.replace('.', "").replace(',', ".")
            }
        }
        (None, Some(_)) => trimmed.replace(',', "."),
        (Some(_), None) => trimmed.to_string(),
        (None, None) => trimmed.to_string(),
    };

    let compact: String = canonical.split_whitespace().collect();
    Decimal::from_str(&compact).unwrap_or(Decimal::ZERO)
}

/// Fold the reference locale's diacritic set to its closest ASCII form.
pub fn fold_diacritics(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'ı' | 'İ' => 'i',
            'ş' | 'Ş' => 's',
            'ğ' | 'Ğ' => 'g',
            'ü' | 'Ü' => 'u',
            'ö' | 'Ö' => 'o',
            'ç' | 'Ç' => 'c',
            other => other,
        })
        .collect()
}

const COLOR_WORDS: &[&str] = &[
    "kirmizi", "mavi", "siyah", "beyaz", "yesil", "sari", "turuncu", "gri",
];

/// Collapse a handful of unit spellings to one canonical token and strip color words —
/// both are lossy folds used only to improve text-similarity matching, never for display.
pub fn normalize_units(s: &str) -> String {
    let mut out = s.to_string();
    let unit_aliases: &[(&str, &str)] = &[
        ("milimetre", "mm"),
        ("santimetre", "cm"),
        ("kilogram", "kg"),
        ("miligram", "mg"),
        ("watt", "w"),
        ("volt", "v"),
        ("amper", "amp"),
        ("litre", "lt"),
        ("takim", "set"),
        ("cift", "set"),
    ];
    for (from, to) in unit_aliases {
        out = out.replace(from, to);
    }

    // Collapse "12 mm" -> "12mm" so a spaced digit+unit pair reads as a single numeric
    // token downstream (`numeric_tokens`, `set_count_re`, identity-code extraction).
    out = UNIT_COLLAPSE_RE.replace_all(&out, "$1$2").into_owned();

    let words: Vec<&str> = out
        .split_whitespace()
        .filter(|w| !COLOR_WORDS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
        .collect();
    words.join(" ")
}

/// Strict, idempotent normalization used for barcode/SKU matching keys: lowercase, fold
/// diacritics, canonicalize units, strip everything that is not alphanumeric.
pub fn strict_normalize(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let folded = fold_diacritics(&lowered);
    let unit_folded = normalize_units(&folded);
    unit_folded.chars().filter(|c| c.is_alphanumeric()).collect()
}

const TRACKING_PREFIXES: &[&str] = &["rm_", "tyc_", "hbv", "akn_", "frkn"];

const MARKETING_NOISE_WORDS: &[&str] = &[
    "orijinal",
    "orjinal",
    "ithal",
    "yeni",
    "ucretsiz kargo",
    "garantili",
    "garanti",
    "indirimli",
    "kampanyali",
    "hizli kargo",
    "ayni gun kargo",
    "stokta",
];

/// Build the normalized product-name key used by the Stage-3 hybrid text matcher:
/// lowercase, strip tracking-prefix tokens, fold diacritics, canonicalize units, strip
/// marketing noise words, collapse everything non-alphanumeric to single spaces.
pub fn normalize_text(s: &str) -> String {
    let lowered = s.trim().to_lowercase();

    let without_tracking: String = lowered
        .split_whitespace()
        .filter(|tok| !TRACKING_PREFIXES.iter().any(|p| tok.starts_with(p)))
        .collect::<Vec<_>>()
        .join(" ");

    let folded = fold_diacritics(&without_tracking);

    // Marketing noise words are removed before unit folding, matching the reference
    // pipeline's ordering (so "2 adet yeni" loses "yeni" before units are canonicalized).
    let mut without_noise = folded.clone();
    for noise in MARKETING_NOISE_WORDS {
        without_noise = remove_word(&without_noise, noise);
    }

    let unit_folded = normalize_units(&without_noise);

    let collapsed: String = unit_folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn remove_word(haystack: &str, word: &str) -> String {
    if word.contains(' ') {
        haystack.replace(word, "")
    } else {
        haystack
            .split_whitespace()
            .filter(|tok| *tok != word)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Closed prefix list stripped (at most one, leftmost match, then stop) when deriving a
/// `match_code` from a SKU.
const MATCH_CODE_PREFIXES: &[&str] = &[
    "CETA", "IZELTAS", "BOSCH", "MAKITA", "DEWALT", "KNIPEX", "CERPA", "ELTA", "RTR", "ATTLAS",
];

/// Derive the alphanumeric-only, prefix-stripped bridge key used to join internal and
/// supplier records that share a SKU family but differ in vendor-brand prefixing.
pub fn generate_match_code(sku: &str) -> String {
    let upper = sku.trim().to_uppercase();
    let mut stripped = upper.clone();
    for prefix in MATCH_CODE_PREFIXES {
        if upper.starts_with(prefix) {
            stripped = upper[prefix.len()..].to_string();
            break;
        }
    }
    stripped.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Extract `\b\d+[a-z]*\b`-shaped numeric tokens (e.g. "12v", "500") from normalized text.
pub fn numeric_tokens(s: &str) -> std::collections::HashSet<String> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+[a-z]*\b").unwrap());
    RE.find_iter(s).map(|m| m.as_str().to_string()).collect()
}

/// Returns `true` if the first numeric literal anywhere in `raw` can be parsed, ignoring
/// thousands-style grouping, used by the rule parser's value-extraction step.
pub fn first_numeric_literal(raw: &str) -> Option<Decimal> {
    NUMERIC_RE
        .find(raw)
        .map(|m| parse_price_value(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_negative_keyword_forces_zero() {
        assert_eq!(parse_stock_value("Tükendi"), 0);
        assert_eq!(parse_stock_value("Stok Yok"), 0);
        assert_eq!(parse_stock_value("Siparis Uzerine"), 0);
    }

    #[test]
    fn stock_extracts_first_integer() {
        assert_eq!(parse_stock_value("12 adet"), 12);
        assert_eq!(parse_stock_value("1,234 adet"), 1);
        assert_eq!(parse_stock_value("abc"), 0);
    }

    #[test]
    fn stock_ignores_leading_minus_sign() {
        // the parser only ever extracts digits, so a leading '-' is simply not captured
        assert_eq!(parse_stock_value("-5"), 5);
    }

    #[test]
    fn price_disambiguates_separators() {
        assert_eq!(parse_price_value("1.234,56"), Decimal::from_str("1234.56").unwrap());
        assert_eq!(parse_price_value("1,234.56"), Decimal::from_str("1234.56").unwrap());
        assert_eq!(parse_price_value("1234.56"), Decimal::from_str("1234.56").unwrap());
        assert_eq!(parse_price_value("99,90"), Decimal::from_str("99.90").unwrap());
    }

    #[test]
    fn strict_normalize_is_idempotent() {
        let x = "CETA-123 Matkap Uçu (Mm)";
        let once = strict_normalize(x);
        let twice = strict_normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strict_normalize_collapses_equivalent_codes() {
        assert_eq!(strict_normalize("CETA-123"), strict_normalize("ceta 123"));
    }

    #[test]
    fn match_code_strips_single_prefix() {
        assert_eq!(generate_match_code("CETA-501-X"), "501X");
        assert_eq!(generate_match_code("bosch123"), "123");
        assert_eq!(generate_match_code("NOPREFIX-77"), "NOPREFIX77");
    }

    #[test]
    fn normalize_text_strips_tracking_and_noise() {
        let out = normalize_text("rm_ Orijinal Bosch Matkap Yeni");
        assert!(!out.contains("orijinal"));
        assert!(!out.contains("yeni"));
        assert!(out.contains("bosch"));
    }

    #[test]
    fn normalize_units_strips_color_words() {
        let out = normalize_units("kirmizi matkap seti");
        assert_eq!(out, "matkap seti");
    }

    #[test]
    fn normalize_units_collapses_digit_and_unit() {
        assert_eq!(normalize_units("12 mm matkap"), "12mm matkap");
        assert_eq!(normalize_units("12 watt motor"), "12w motor");
    }

    #[test]
    fn normalize_units_folds_takim_and_cift_to_set() {
        assert_eq!(normalize_units("6 takim"), "6set");
        assert_eq!(normalize_units("3 cift"), "3set");
    }

    #[test]
    fn normalize_units_uses_amp_not_a_for_amper() {
        let out = normalize_units("10 amper sigorta");
        assert_eq!(out, "10amp sigorta");
    }
}
