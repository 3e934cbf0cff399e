//! Per-row pricing engine (`calc_p` in the reference) and the stock-selection policy
//! (`calc_s`). This is the job-path pricing function — see `rules::preview_pricing_rules`
//! for the intentionally simplified, case-insensitive preview-path sibling.

use crate::models::{
    Currency, FiyatDurumu, FreezeConfig, MatchKind, OrphanStrategy, PriceMethod, PriceSource,
    PriceStrategy, Rule, RuleAction, StockStrategy,
};
use crate::rates::RateTable;
use rust_decimal::Decimal;

pub struct PricingInput<'a> {
    pub sku: &'a str,
    pub barcode: &'a str,
    pub brand: &'a str,
    pub product_name: &'a str,
    pub curr: Decimal,
    pub internal_price: Decimal,
    pub supplier_price: Decimal,
    pub cost: Decimal,
}

/// The job-path rule matcher: brand/name are checked case-insensitively, SKU is checked
/// against its raw, unmodified form — a real and preserved divergence from the preview path.
fn rule_matches_job(rule: &Rule, input: &PricingInput) -> bool {
    let target_upper = rule.target.to_uppercase();
    if target_upper == "ALL_PRODUCTS" {
        return true;
    }
    input.brand.to_uppercase().contains(&target_upper)
        || input.product_name.to_uppercase().contains(&target_upper)
        || input.sku.contains(&rule.target)
}

fn rate_for(rates: &RateTable, currency: Option<Currency>) -> Decimal {
    rates.get(currency.unwrap_or(Currency::Usd).code())
}

pub fn price_row(
    input: &PricingInput,
    strategy: &PriceStrategy,
    freeze: &FreezeConfig,
    rates: &RateTable,
    rules: &[Rule],
) -> (Decimal, FiyatDurumu) {
    if freeze.is_frozen(input.sku, input.barcode) {
        return (input.curr, FiyatDurumu::ManuelDondurma);
    }

    let (base, mut note) = match strategy.source {
        PriceSource::StockOnly => (input.curr, FiyatDurumu::PazaryeriFiyati),
        PriceSource::Internal => (input.internal_price, FiyatDurumu::IcListe),
        PriceSource::Supplier => (input.supplier_price, FiyatDurumu::TedListe),
        PriceSource::Cost => (input.cost, FiyatDurumu::Maliyet),
    };

    if base <= Decimal::ZERO
        && !matches!(strategy.method, PriceMethod::StockOnly)
        && !matches!(strategy.source, PriceSource::Cost)
    {
        return if input.curr > Decimal::ZERO {
            (input.curr, FiyatDurumu::KaynakFiyatYok)
        } else {
            (Decimal::ZERO, FiyatDurumu::FiyatYok)
        };
    }

    let mut candidate = match strategy.method {
        PriceMethod::StockOnly | PriceMethod::ReadyList => base,
        PriceMethod::Calculated => {
            if base > Decimal::ZERO {
                base * strategy.default_multiplier + strategy.default_addition
            } else {
                note = FiyatDurumu::MaliyetYok;
                Decimal::ZERO
            }
        }
    };

    let any_fix_price = rules.iter().any(|r| r.action == RuleAction::FixPrice);
    if candidate > Decimal::ZERO || any_fix_price {
        for rule in rules {
            if !rule_matches_job(rule, input) {
                continue;
            }
            match rule.action {
                RuleAction::FxConversion => {
                    if let Some(old_rate) = rule.old_rate.filter(|r| *r > Decimal::ZERO) {
                        candidate = candidate / old_rate * rate_for(rates, rule.currency);
                        note = FiyatDurumu::KurFarki(rule.target.clone());
                    }
                }
                RuleAction::FxIndex => {
                    candidate = base * rate_for(rates, rule.currency);
                    note = FiyatDurumu::DovizEndeksli(rule.target.clone());
                }
                RuleAction::Multiplier => {
                    if rule.value != Decimal::ONE {
                        candidate *= rule.value;
                    } else {
                        candidate += rule.value;
                    }
                    note = FiyatDurumu::Nlp(rule.target.clone());
                }
                RuleAction::FixPrice => {
                    candidate = rule.value;
                    if let Some(currency) = rule.currency {
                        if !matches!(currency, Currency::Try) {
                            candidate *= rates.get(currency.code());
                        }
                    }
                    note = FiyatDurumu::SabitFiyat(rule.target.clone());
                }
            }
        }
    }

    if strategy.vat_enabled {
        candidate *= Decimal::ONE + strategy.vat_rate / Decimal::ONE_HUNDRED;
    }

    let candidate = candidate.round_dp(2);

    if candidate <= Decimal::ZERO && input.curr > Decimal::ZERO {
        return (input.curr, FiyatDurumu::FiyatKorundu);
    }

    if strategy.smart_freeze && candidate < input.curr && input.curr > Decimal::ZERO {
        return (input.curr, FiyatDurumu::Donduruldu);
    }

    if candidate == input.curr {
        (input.curr, FiyatDurumu::DegisimYok)
    } else {
        (candidate, note)
    }
}

/// `chosen` per `stock_strategy`; when `orphan_strategy = zero` and the row is the
/// unqualified `"Eşleşmedi"` kind (not one of the other two Eşleşmedi-prefixed kinds, which
/// carry their own distinct literal strings), the final stock is forced to zero regardless
/// of `chosen`. Always clamped to `>= 0`.
pub fn select_stock(
    strategy: StockStrategy,
    orphan: OrphanStrategy,
    internal_stock: i64,
    supplier_stock: i64,
    match_kind: &MatchKind,
) -> i64 {
    let chosen = match strategy {
        StockStrategy::Internal => internal_stock,
        StockStrategy::Supplier => supplier_stock,
        StockStrategy::Min => internal_stock.min(supplier_stock),
    };
    let final_stock = if matches!(orphan, OrphanStrategy::Zero) && matches!(match_kind, MatchKind::Eslesmedi) {
        0
    } else {
        chosen
    };
    final_stock.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn rates() -> RateTable {
        use std::collections::HashMap;
        let mut rates = HashMap::new();
        rates.insert("TRY".to_string(), Decimal::ONE);
        rates.insert("USD".to_string(), Decimal::from_str("32").unwrap());
        rates.insert("EUR".to_string(), Decimal::from_str("34").unwrap());
        RateTable { rates, last_update: chrono::Utc::now() }
    }

    fn strategy(source: PriceSource, method: PriceMethod) -> PriceStrategy {
        PriceStrategy {
            source,
            method,
            default_multiplier: Decimal::from_str("1.2").unwrap(),
            default_addition: Decimal::ZERO,
            vat_enabled: false,
            vat_rate: Decimal::ZERO,
            smart_freeze: false,
        }
    }

    fn input(curr: Decimal, internal: Decimal) -> PricingInput<'static> {
        PricingInput {
            sku: "A-1",
            barcode: "8690000000001",
            brand: "BOSCH",
            product_name: "Bosch Matkap",
            curr,
            internal_price: internal,
            supplier_price: Decimal::ZERO,
            cost: Decimal::ZERO,
        }
    }

    #[test]
    fn manual_freeze_short_circuits() {
        let mut freeze = FreezeConfig::default();
        freeze.skus.push("A-1".to_string());
        let strat = strategy(PriceSource::Internal, PriceMethod::Calculated);
        let (price, note) = price_row(&input(Decimal::new(1000, 2), Decimal::new(1200, 2)), &strat, &freeze, &rates(), &[]);
        assert_eq!(price, Decimal::new(1000, 2));
        assert_eq!(note, FiyatDurumu::ManuelDondurma);
    }

    #[test]
    fn calculated_applies_multiplier_and_addition() {
        let strat = strategy(PriceSource::Internal, PriceMethod::Calculated);
        let (price, note) = price_row(
            &input(Decimal::new(90000, 2), Decimal::new(10000, 2)),
            &strat,
            &FreezeConfig::default(),
            &rates(),
            &[],
        );
        assert_eq!(price, Decimal::new(12000, 2));
        assert_eq!(note, FiyatDurumu::IcListe);
    }

    #[test]
    fn negative_candidate_preserves_current_price() {
        let strat = strategy(PriceSource::Internal, PriceMethod::Calculated);
        let curr = Decimal::new(10000, 2);
        let rule = Rule {
            target: "ALL_PRODUCTS".to_string(),
            action: RuleAction::Multiplier,
            value: Decimal::new(-500, 2),
            currency: None,
            old_rate: None,
            raw_text: "ALL_PRODUCTS INDIRIM 500".to_string(),
        };
        let (price, note) = price_row(
            &input(curr, Decimal::new(10000, 2)),
            &strat,
            &FreezeConfig::default(),
            &rates(),
            &[rule],
        );
        assert_eq!(price, curr);
        assert_eq!(note, FiyatDurumu::FiyatKorundu);
    }

    #[test]
    fn calculated_cost_source_with_missing_cost_preserves_current_price() {
        let strat = strategy(PriceSource::Cost, PriceMethod::Calculated);
        let curr = Decimal::new(10000, 2);
        let input = PricingInput {
            sku: "A-1",
            barcode: "8690000000001",
            brand: "BOSCH",
            product_name: "Bosch Matkap",
            curr,
            internal_price: Decimal::ZERO,
            supplier_price: Decimal::ZERO,
            cost: Decimal::ZERO,
        };
        let (price, note) = price_row(&input, &strat, &FreezeConfig::default(), &rates(), &[]);
        assert_eq!(price, curr);
        assert_eq!(note, FiyatDurumu::FiyatKorundu);
    }

    #[test]
    fn degisim_yok_on_exact_equality_for_stock_only() {
        let strat = strategy(PriceSource::StockOnly, PriceMethod::StockOnly);
        let curr = Decimal::new(10000, 2);
        let (price, note) = price_row(
            &input(curr, Decimal::ZERO),
            &strat,
            &FreezeConfig::default(),
            &rates(),
            &[],
        );
        assert_eq!(price, curr);
        assert_eq!(note, FiyatDurumu::DegisimYok);
    }

    #[test]
    fn smart_freeze_blocks_price_decrease() {
        let mut strat = strategy(PriceSource::Internal, PriceMethod::Calculated);
        strat.default_multiplier = Decimal::from_str("0.5").unwrap();
        strat.smart_freeze = true;
        let curr = Decimal::new(50000, 2);
        let (price, note) = price_row(
            &input(curr, Decimal::new(10000, 2)),
            &strat,
            &FreezeConfig::default(),
            &rates(),
            &[],
        );
        assert_eq!(price, curr);
        assert_eq!(note, FiyatDurumu::Donduruldu);
    }

    #[test]
    fn zero_orphan_strategy_forces_zero_stock_on_unmatched() {
        let stock = select_stock(StockStrategy::Min, OrphanStrategy::Zero, 10, 5, &MatchKind::Eslesmedi);
        assert_eq!(stock, 0);
    }

    #[test]
    fn zero_orphan_strategy_does_not_apply_to_conflict_variant() {
        let stock = select_stock(
            StockStrategy::Min,
            OrphanStrategy::Zero,
            10,
            5,
            &MatchKind::EslesmediMarkaCatismasi,
        );
        assert_eq!(stock, 5);
    }

    #[test]
    fn min_strategy_picks_the_smaller_quantity() {
        let stock = select_stock(StockStrategy::Min, OrphanStrategy::Keep, 10, 5, &MatchKind::Barkod);
        assert_eq!(stock, 5);
    }
}
