//! Fuses one or more supplier price lists into a single canonical view, converting
//! each file's cost column to TRY using the exchange-rate table in effect at
//! consolidation time. Rows are partitioned on barcode validity: a row with a usable
//! barcode is grouped with every other row sharing that barcode, regardless of SKU; a
//! row without one is grouped by `match_code` instead and labeled `Barkod = "YOK"`.

use crate::error::AppError;
use crate::models::{Currency, SupplierRow, Template, BARKOD_YOK, KOD_YOK, MARKA_TANIMSIZ};
use crate::normalize::{generate_match_code, parse_price_value, parse_stock_value};
use crate::rates::RateTable;
use crate::tables::RawTable;
use rust_decimal::Decimal;
use std::collections::HashMap;

pub struct SupplierFileInput {
    pub table: RawTable,
    pub template: Template,
    pub currency: Currency,
    pub filename: String,
}

/// A barcode is usable as a join key only if it is a plausible EAN/UPC: digits only,
/// and at least 8 of them. Anything shorter or non-numeric is treated as absent so a
/// garbage cell never collides with a real barcode during matching.
fn is_valid_barcode(barcode: &str) -> bool {
    barcode.len() >= 8 && barcode.chars().all(|c| c.is_ascii_digit())
}

struct ProjectedRow {
    anahtar_kod: String,
    barkod: String,
    match_code: String,
    miktar: i64,
    maliyet: Decimal,
    satis_fiyati: Decimal,
    urun_adi: String,
    marka: String,
}

fn row_currency(input: &SupplierFileInput, row: &[String]) -> Currency {
    input
        .template
        .get("currency_column")
        .and_then(|h| input.table.get(row, h))
        .and_then(|cell| Currency::parse(&cell))
        .unwrap_or(input.currency)
}

fn project(input: &SupplierFileInput, rates: &RateTable) -> Vec<ProjectedRow> {
    let sku_header = input.template.get("sku");
    let barcode_header = input.template.get("barcode");
    let stock_header = input.template.get("stock");
    let cost_header = input.template.get("cost");
    let price_header = input.template.get("selling_price");
    let name_header = input.template.get("product_name");
    let brand_header = input.template.get("brand");

    let mut out = Vec::with_capacity(input.table.rows.len());
    for row in &input.table.rows {
        let sku = sku_header
            .and_then(|h| input.table.get(row, h))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| KOD_YOK.to_string());

        let barcode_raw = barcode_header
            .and_then(|h| input.table.get(row, h))
            .unwrap_or_default();
        let trimmed = barcode_raw.trim();
        let barkod = if trimmed.is_empty() || !is_valid_barcode(trimmed) {
            BARKOD_YOK.to_string()
        } else {
            trimmed.to_string()
        };

        let raw_stock = stock_header
            .and_then(|h| input.table.get(row, h))
            .unwrap_or_default();
        let miktar = parse_stock_value(&raw_stock);

        let rate = rates.get(row_currency(input, row).code());

        let cost_raw = cost_header
            .and_then(|h| input.table.get(row, h))
            .map(|s| parse_price_value(&s))
            .unwrap_or(Decimal::ZERO);
        let maliyet = if rate.is_zero() { cost_raw } else { cost_raw * rate };

        let price_raw = price_header
            .and_then(|h| input.table.get(row, h))
            .map(|s| parse_price_value(&s))
            .unwrap_or(Decimal::ZERO);
        let satis_fiyati = if rate.is_zero() { price_raw } else { price_raw * rate };

        let urun_adi = name_header
            .and_then(|h| input.table.get(row, h))
            .unwrap_or_default();

        let marka = brand_header
            .and_then(|h| input.table.get(row, h))
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| MARKA_TANIMSIZ.to_string());

        let match_code = generate_match_code(&sku);

        out.push(ProjectedRow {
            anahtar_kod: sku,
            barkod,
            match_code,
            miktar,
            maliyet,
            satis_fiyati,
            urun_adi,
            marka,
        });
    }
    out
}

#[derive(Hash, PartialEq, Eq, Clone)]
enum GroupKey {
    Barcode(String),
    MatchCode(String),
}

struct GroupAgg {
    anahtar_kod: String,
    barkod: String,
    match_code: String,
    toplam: i64,
    maliyet: Option<Decimal>,
    satis_fiyati: Option<Decimal>,
    urun_adi: String,
    marka: String,
}

pub fn consolidate_supplier(
    files: &[SupplierFileInput],
    rates: &RateTable,
) -> Result<Vec<SupplierRow>, AppError> {
    let mut groups: HashMap<GroupKey, GroupAgg> = HashMap::new();

    for file in files {
        for row in project(file, rates) {
            let key = if row.barkod != BARKOD_YOK {
                GroupKey::Barcode(row.barkod.clone())
            } else {
                GroupKey::MatchCode(row.match_code.clone())
            };

            let entry = groups.entry(key).or_insert_with(|| GroupAgg {
                anahtar_kod: row.anahtar_kod.clone(),
                barkod: row.barkod.clone(),
                match_code: row.match_code.clone(),
                toplam: 0,
                maliyet: None,
                satis_fiyati: None,
                urun_adi: String::new(),
                marka: String::new(),
            });
            entry.toplam += row.miktar.max(0);
            entry.maliyet = Some(match entry.maliyet {
                Some(current) if current <= row.maliyet => current,
                _ => row.maliyet,
            });
            entry.satis_fiyati = Some(match entry.satis_fiyati {
                Some(current) if current >= row.satis_fiyati => current,
                _ => row.satis_fiyati,
            });
            if entry.urun_adi.is_empty() && !row.urun_adi.is_empty() {
                entry.urun_adi = row.urun_adi.clone();
            }
            if entry.marka.is_empty() || entry.marka == MARKA_TANIMSIZ {
                entry.marka = row.marka.clone();
            }
        }
    }

    let mut out: Vec<SupplierRow> = groups
        .into_values()
        .map(|agg| SupplierRow {
            anahtar_kod: agg.anahtar_kod,
            barkod: agg.barkod,
            match_code: agg.match_code,
            toplam_tedarikci_stok: agg.toplam,
            maliyet: agg.maliyet.unwrap_or(Decimal::ZERO),
            ted_hazir_fiyat: agg.satis_fiyati.unwrap_or(Decimal::ZERO),
            ted_urun_adi: agg.urun_adi,
            marka: if agg.marka.is_empty() { MARKA_TANIMSIZ.to_string() } else { agg.marka },
        })
        .collect();

    out.sort_by(|a, b| a.anahtar_kod.cmp(&b.anahtar_kod));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;
    use std::str::FromStr;

    fn template() -> Template {
        let mut t = Map::new();
        t.insert("sku".to_string(), "sku".to_string());
        t.insert("barcode".to_string(), "barkod".to_string());
        t.insert("stock".to_string(), "stok".to_string());
        t.insert("cost".to_string(), "maliyet".to_string());
        t.insert("selling_price".to_string(), "liste_fiyati".to_string());
        t.insert("product_name".to_string(), "ad".to_string());
        t.insert("brand".to_string(), "marka".to_string());
        t
    }

    fn table(rows: Vec<Vec<&str>>) -> RawTable {
        RawTable {
            headers: vec![
                "sku".to_string(),
                "barkod".to_string(),
                "stok".to_string(),
                "maliyet".to_string(),
                "liste_fiyati".to_string(),
                "ad".to_string(),
                "marka".to_string(),
            ],
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn rates() -> RateTable {
        let mut rates = HashMap::new();
        rates.insert("TRY".to_string(), Decimal::ONE);
        rates.insert("USD".to_string(), Decimal::from_str("32").unwrap());
        rates.insert("EUR".to_string(), Decimal::from_str("34").unwrap());
        RateTable { rates, last_update: Utc::now() }
    }

    #[test]
    fn converts_foreign_cost_to_try() {
        let input = SupplierFileInput {
            table: table(vec![vec!["A-1", "8690000000001", "10", "2.00", "3.00", "Matkap", "BOSCH"]]),
            template: template(),
            currency: Currency::Usd,
            filename: "ted.csv".to_string(),
        };
        let result = consolidate_supplier(&[input], &rates()).unwrap();
        assert_eq!(result[0].maliyet, Decimal::from_str("64.00").unwrap());
        assert_eq!(result[0].ted_hazir_fiyat, Decimal::from_str("96.00").unwrap());
    }

    #[test]
    fn invalid_barcode_falls_back_to_match_code() {
        let input = SupplierFileInput {
            table: table(vec![vec!["A-1", "abc", "10", "2.00", "3.00", "Matkap", "BOSCH"]]),
            template: template(),
            currency: Currency::Try,
            filename: "ted.csv".to_string(),
        };
        let result = consolidate_supplier(&[input], &rates()).unwrap();
        assert_eq!(result[0].barkod, "YOK");
    }

    #[test]
    fn cheapest_cost_and_highest_price_across_files_win() {
        let input_a = SupplierFileInput {
            table: table(vec![vec!["A-1", "8690000000001", "5", "10.00", "20.00", "Matkap", "BOSCH"]]),
            template: template(),
            currency: Currency::Try,
            filename: "a.csv".to_string(),
        };
        let input_b = SupplierFileInput {
            table: table(vec![vec!["A-2", "8690000000001", "5", "8.00", "25.00", "Matkap", "BOSCH"]]),
            template: template(),
            currency: Currency::Try,
            filename: "b.csv".to_string(),
        };
        let result = consolidate_supplier(&[input_a, input_b], &rates()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].maliyet, Decimal::from_str("8.00").unwrap());
        assert_eq!(result[0].ted_hazir_fiyat, Decimal::from_str("25.00").unwrap());
        assert_eq!(result[0].toplam_tedarikci_stok, 10);
    }

    #[test]
    fn barcode_partition_merges_rows_with_different_skus() {
        let input_a = SupplierFileInput {
            table: table(vec![vec!["SKU-A", "8690000000001", "5", "10.00", "20.00", "Matkap", "BOSCH"]]),
            template: template(),
            currency: Currency::Try,
            filename: "a.csv".to_string(),
        };
        let input_b = SupplierFileInput {
            table: table(vec![vec!["SKU-B", "8690000000001", "3", "9.00", "22.00", "Matkap", "BOSCH"]]),
            template: template(),
            currency: Currency::Try,
            filename: "b.csv".to_string(),
        };
        let result = consolidate_supplier(&[input_a, input_b], &rates()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].toplam_tedarikci_stok, 8);
        assert!(result[0].anahtar_kod == "SKU-A" || result[0].anahtar_kod == "SKU-B");
    }

    #[test]
    fn barcodeless_rows_partition_by_match_code_not_merged_with_barcoded() {
        let barcoded = SupplierFileInput {
            table: table(vec![vec!["A-1", "8690000000001", "5", "10.00", "20.00", "Matkap", "BOSCH"]]),
            template: template(),
            currency: Currency::Try,
            filename: "a.csv".to_string(),
        };
        let barcodeless = SupplierFileInput {
            table: table(vec![vec!["A-1", "", "3", "9.00", "22.00", "Matkap", "BOSCH"]]),
            template: template(),
            currency: Currency::Try,
            filename: "b.csv".to_string(),
        };
        let result = consolidate_supplier(&[barcoded, barcodeless], &rates()).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn per_row_currency_column_overrides_template_constant() {
        let mut t = template();
        t.insert("currency_column".to_string(), "para_birimi".to_string());
        let table_with_currency = RawTable {
            headers: vec![
                "sku".to_string(),
                "barkod".to_string(),
                "stok".to_string(),
                "maliyet".to_string(),
                "liste_fiyati".to_string(),
                "ad".to_string(),
                "marka".to_string(),
                "para_birimi".to_string(),
            ],
            rows: vec![vec![
                "A-1".to_string(),
                "8690000000001".to_string(),
                "10".to_string(),
                "2.00".to_string(),
                "3.00".to_string(),
                "Matkap".to_string(),
                "BOSCH".to_string(),
                "USD".to_string(),
            ]],
        };
        let input = SupplierFileInput {
            table: table_with_currency,
            template: t,
            currency: Currency::Try,
            filename: "ted.csv".to_string(),
        };
        let result = consolidate_supplier(&[input], &rates()).unwrap();
        assert_eq!(result[0].maliyet, Decimal::from_str("64.00").unwrap());
    }
}
