//! Projects an uploaded marketplace file through its template into the
//! canonical `MarketplaceRow` shape the matching engine consumes, alongside a
//! per-row brand resolution that depends on `brand_extraction_strategy`.

use crate::brands;
use crate::models::{MarketplaceRow, Template, MARKA_TANIMSIZ};
use crate::normalize::{parse_price_value, parse_stock_value, strict_normalize};
use crate::tables::RawTable;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrandExtractionStrategy {
    /// Use the brand column as-is (sentinel if missing or unrecognized).
    Column,
    /// Prefer the brand column; fall back to extracting a known brand from
    /// the product name when the column is empty or a sentinel.
    #[default]
    Smart,
}

impl BrandExtractionStrategy {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "column" => BrandExtractionStrategy::Column,
            _ => BrandExtractionStrategy::Smart,
        }
    }
}

/// Returns the projected rows plus a per-row-index brand map (the same shape
/// `matching::run_matching` expects for `marketplace_brands`).
pub fn project_marketplace(
    table: &RawTable,
    template: &Template,
    strategy: BrandExtractionStrategy,
) -> (Vec<MarketplaceRow>, HashMap<usize, String>) {
    let sku_header = template.get("sku");
    let barcode_header = template.get("barcode");
    let name_header = template.get("product_name");
    let stock_header = template.get("stock");
    let price_header = template.get("selling_price");
    let brand_header = template.get("brand");

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut brands = HashMap::with_capacity(table.rows.len());

    for (idx, row) in table.rows.iter().enumerate() {
        let mp_sku = sku_header
            .and_then(|h| table.get(row, h))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let mp_barkod = barcode_header
            .and_then(|h| table.get(row, h))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let mp_urun_adi = name_header
            .and_then(|h| table.get(row, h))
            .unwrap_or_default();

        let mp_eski_stok = stock_header
            .and_then(|h| table.get(row, h))
            .map(|s| parse_stock_value(&s))
            .unwrap_or(0);

        let mp_fiyat = price_header
            .and_then(|h| table.get(row, h))
            .map(|s| parse_price_value(&s))
            .unwrap_or_default();

        let brand_cell = brand_header.and_then(|h| table.get(row, h)).unwrap_or_default();
        let mp_marka = match strategy {
            BrandExtractionStrategy::Column => {
                brands::normalize_brand(&brand_cell).unwrap_or_else(|| MARKA_TANIMSIZ.to_string())
            }
            BrandExtractionStrategy::Smart => brands::detect_brand_smart(&brand_cell, &mp_urun_adi),
        };
        brands.insert(idx, mp_marka.clone());

        let bk_norm = strict_normalize(&mp_barkod);
        let sku_norm = strict_normalize(&mp_sku);

        rows.push(MarketplaceRow {
            idx,
            mp_barkod,
            mp_sku,
            mp_urun_adi,
            mp_eski_stok,
            mp_fiyat,
            mp_marka,
            bk_norm,
            sku_norm,
        });
    }

    (rows, brands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn template() -> Template {
        let mut t = Map::new();
        t.insert("sku".to_string(), "sku".to_string());
        t.insert("barcode".to_string(), "barkod".to_string());
        t.insert("product_name".to_string(), "ad".to_string());
        t.insert("stock".to_string(), "stok".to_string());
        t.insert("selling_price".to_string(), "fiyat".to_string());
        t.insert("brand".to_string(), "marka".to_string());
        t
    }

    fn table(rows: Vec<Vec<&str>>) -> RawTable {
        RawTable {
            headers: vec![
                "sku".to_string(),
                "barkod".to_string(),
                "ad".to_string(),
                "stok".to_string(),
                "fiyat".to_string(),
                "marka".to_string(),
            ],
            rows: rows.into_iter().map(|r| r.into_iter().map(|s| s.to_string()).collect()).collect(),
        }
    }

    #[test]
    fn smart_strategy_extracts_brand_from_title_when_column_is_sentinel() {
        let t = table(vec![vec!["A-1", "869", "Bosch Matkap 13mm", "5", "100.00", "TANIMSIZ"]]);
        let (rows, brands) = project_marketplace(&t, &template(), BrandExtractionStrategy::Smart);
        assert_eq!(brands[&0], "BOSCH");
        assert_eq!(rows[0].mp_marka, "BOSCH");
    }

    #[test]
    fn column_strategy_never_reads_title() {
        let t = table(vec![vec!["A-1", "869", "Bosch Matkap 13mm", "5", "100.00", "TANIMSIZ"]]);
        let (_, brands) = project_marketplace(&t, &template(), BrandExtractionStrategy::Column);
        assert_eq!(brands[&0], "TANIMSIZ");
    }

    #[test]
    fn stock_and_price_cells_are_parsed() {
        let t = table(vec![vec!["A-1", "869", "Matkap", "Tukendi", "1.234,56", "BOSCH"]]);
        let (rows, _) = project_marketplace(&t, &template(), BrandExtractionStrategy::Smart);
        assert_eq!(rows[0].mp_eski_stok, 0);
        assert_eq!(rows[0].mp_fiyat, rust_decimal::Decimal::new(123456, 2));
    }
}
