//! Natural-language pricing directive parser: turns one free-text line into a
//! `Rule`, following the fixed keyword vocabularies and action-selection order.
//! `preview_pricing_rules` is a deliberately independent, simplified mini-engine
//! used only by the `/simulate_nlp` preview route — see its doc comment.

use crate::models::{Currency, MarketplaceRow, PricingPreviewRow, Rule, RuleAction};
use crate::normalize::fold_diacritics;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

const ALL_TARGET_WORDS: &[&str] = &["TUM", "HEPSI", "GENEL", "HERKES", "BUTUN"];
const MULTI_WORD_CONTINUATIONS: &[&str] = &["FORM", "EXTRA", "POWER", "PLUS", "DECKER", "LI"];
const CURRENCY_VERBS: &[&str] = &["KURA", "KURU", "DOVIZ", "ENDEKS"];
const APPLY_VERBS: &[&str] = &["ESITLE", "CEVIR", "YAP", "GUNCELLE"];
const INCREASE_VERBS: &[&str] = &["ZAM", "ARTIS", "EKLE", "YUKSELT"];
const DECREASE_VERBS: &[&str] = &["INDIRIM", "ISKONTO", "DUS", "AZALT"];
const FIX_VERBS: &[&str] = &["OLSUN", "SABITLE", "YAP", "FIKSE", "AYARLA"];

fn fold_upper(s: &str) -> String {
    fold_diacritics(s).to_uppercase()
}

fn old_rate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)ESKI_KUR\s*=\s*(\d+[.,]?\d*)").unwrap())
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+[.,]?\d*").unwrap())
}

fn parse_number(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', ".")).ok()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Parses a block of free-text directives, one per non-empty line.
pub fn parse_natural_language_rules(text: &str) -> Vec<Rule> {
    text.lines().filter_map(parse_rule_line).collect()
}

fn parse_rule_line(line: &str) -> Option<Rule> {
    let raw = line.trim();
    if raw.is_empty() {
        return None;
    }
    let folded_upper = fold_upper(raw);

    let target = extract_target(raw, &folded_upper);

    let (old_rate, stripped) = match old_rate_re().captures(raw) {
        Some(caps) => {
            let rate = parse_number(&caps[1]);
            let whole = caps.get(0).unwrap();
            let mut s = raw.to_string();
            s.replace_range(whole.range(), " ");
            (rate, s)
        }
        None => (None, raw.to_string()),
    };

    let value = extract_value(&stripped, &target);
    let currency = extract_currency(&folded_upper);

    let (action, value) = select_action(&folded_upper, old_rate, value);

    Some(Rule {
        target,
        action,
        value,
        currency,
        old_rate,
        raw_text: raw.to_string(),
    })
}

fn extract_target(raw: &str, folded_upper: &str) -> String {
    let upper_tokens: Vec<&str> = folded_upper.split_whitespace().collect();
    if upper_tokens.iter().any(|t| ALL_TARGET_WORDS.contains(t)) {
        return "ALL_PRODUCTS".to_string();
    }

    let raw_tokens: Vec<&str> = raw.split_whitespace().collect();
    if raw_tokens.is_empty() {
        return String::new();
    }
    if raw_tokens.len() > 1 && MULTI_WORD_CONTINUATIONS.contains(&upper_tokens[1]) {
        format!("{} {}", raw_tokens[0], raw_tokens[1])
    } else {
        raw_tokens[0].to_string()
    }
}

fn extract_value(line: &str, target: &str) -> Decimal {
    for m in number_re().find_iter(line) {
        let literal = m.as_str();
        if target.contains(literal) {
            continue;
        }
        if let Some(v) = parse_number(literal) {
            return v;
        }
    }
    Decimal::ZERO
}

fn extract_currency(folded_upper: &str) -> Option<Currency> {
    if contains_any(folded_upper, &["USD", "DOLAR"]) {
        Some(Currency::Usd)
    } else if contains_any(folded_upper, &["EUR", "EURO"]) {
        Some(Currency::Eur)
    } else if contains_any(folded_upper, &["TRY", "TL"]) {
        Some(Currency::Try)
    } else {
        None
    }
}

fn select_action(
    folded_upper: &str,
    old_rate: Option<Decimal>,
    value: Decimal,
) -> (RuleAction, Decimal) {
    let has_percent = folded_upper.contains('%') || folded_upper.contains("YUZDE");

    if old_rate.is_some() {
        return (RuleAction::FxConversion, value);
    }
    if contains_any(folded_upper, CURRENCY_VERBS) && contains_any(folded_upper, APPLY_VERBS) {
        return (RuleAction::FxIndex, value);
    }
    if contains_any(folded_upper, INCREASE_VERBS) {
        let v = if has_percent { Decimal::ONE + value / Decimal::ONE_HUNDRED } else { value };
        return (RuleAction::Multiplier, v);
    }
    if contains_any(folded_upper, DECREASE_VERBS) {
        let v = if has_percent { Decimal::ONE - value / Decimal::ONE_HUNDRED } else { -value };
        return (RuleAction::Multiplier, v);
    }
    if contains_any(folded_upper, FIX_VERBS) {
        return (RuleAction::FixPrice, value);
    }
    (RuleAction::Multiplier, value)
}

/// Deliberately simplified and independent of `calc_p` (the job-path pricing function
/// in `pricing.rs`): rule matching here is uppercased case-insensitive against brand,
/// name, and SKU alike, whereas the job path checks SKU case-sensitively. Skips VAT,
/// smart-freeze, and currency conversion/indexing entirely. Scans at most the first 200
/// marketplace rows and returns at most the first 10 whose price actually changes.
pub fn preview_pricing_rules(
    rows: &[(MarketplaceRow, String)],
    rules: &[Rule],
) -> Vec<PricingPreviewRow> {
    let mut out = Vec::new();
    for (i, (row, brand)) in rows.iter().take(200).enumerate() {
        if out.len() >= 10 {
            break;
        }
        let old_price = row.mp_fiyat;
        let mut candidate = old_price;
        let mut applied = String::new();

        let name_upper = fold_upper(&row.mp_urun_adi);
        let sku_upper = fold_upper(&row.mp_sku);
        let brand_upper = fold_upper(brand);

        for rule in rules {
            let target_upper = fold_upper(&rule.target);
            let matches = target_upper == "ALL_PRODUCTS"
                || brand_upper.contains(&target_upper)
                || name_upper.contains(&target_upper)
                || sku_upper.contains(&target_upper);
            if !matches {
                continue;
            }
            match rule.action {
                RuleAction::Multiplier => {
                    if rule.value != Decimal::ONE {
                        candidate *= rule.value;
                    } else {
                        candidate += rule.value;
                    }
                }
                RuleAction::FixPrice => {
                    candidate = rule.value;
                }
                RuleAction::FxIndex | RuleAction::FxConversion => continue,
            }
            applied = rule.raw_text.clone();
        }

        let candidate = candidate.round_dp(2);
        if candidate != old_price {
            out.push(PricingPreviewRow {
                row: i,
                old_price,
                new_price: candidate,
                rule_applied: applied,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_products_target_is_recognized() {
        let rules = parse_natural_language_rules("TUM URUNLERE ZAM 10");
        assert_eq!(rules[0].target, "ALL_PRODUCTS");
        assert_eq!(rules[0].action, RuleAction::Multiplier);
    }

    #[test]
    fn old_rate_forces_fx_conversion() {
        let rules = parse_natural_language_rules("CETA ESKI_KUR=30 USD KURA GUNCELLE");
        assert_eq!(rules[0].action, RuleAction::FxConversion);
        assert_eq!(rules[0].old_rate, Some(Decimal::from_str("30").unwrap()));
    }

    #[test]
    fn fx_index_requires_both_currency_and_apply_verb() {
        let rules = parse_natural_language_rules("BOSCH DOVIZ KURUNA ESITLE");
        assert_eq!(rules[0].action, RuleAction::FxIndex);
    }

    #[test]
    fn increase_with_percent_becomes_multiplier_above_one() {
        let rules = parse_natural_language_rules("MAKITA ZAM %10");
        assert_eq!(rules[0].action, RuleAction::Multiplier);
        assert_eq!(rules[0].value, Decimal::from_str("1.1").unwrap());
    }

    #[test]
    fn decrease_without_percent_is_additive_negative() {
        let rules = parse_natural_language_rules("ALL_PRODUCTS INDIRIM 5");
        assert_eq!(rules[0].action, RuleAction::Multiplier);
        assert_eq!(rules[0].value, Decimal::from_str("-5").unwrap());
    }

    #[test]
    fn yap_verb_priority_favours_increase_over_fix() {
        let rules = parse_natural_language_rules("TUM ZAM YAP %10");
        assert_eq!(rules[0].action, RuleAction::Multiplier);
    }

    #[test]
    fn fix_verb_without_increase_resolves_to_fix_price() {
        let rules = parse_natural_language_rules("KNIPEX 199 OLSUN");
        assert_eq!(rules[0].action, RuleAction::FixPrice);
        assert_eq!(rules[0].value, Decimal::from_str("199").unwrap());
    }

    #[test]
    fn value_skips_numeric_substring_of_target() {
        let rules = parse_natural_language_rules("CETA501 FIYATI 50 OLSUN");
        assert_eq!(rules[0].value, Decimal::from_str("50").unwrap());
    }
}
