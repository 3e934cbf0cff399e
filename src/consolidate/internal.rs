//! Fuses one or more internal depot files, each carrying an additive (`"+"`) or
//! subtractive (`"-"`) label, into a single canonical view keyed by
//! `(Anahtar_Kod, Barkod, match_code)`.

use crate::error::AppError;
use crate::models::{InternalRow, Template, BARKOD_YOK, KOD_YOK, MARKA_TANIMSIZ};
use crate::normalize::{generate_match_code, parse_price_value, parse_stock_value};
use crate::tables::RawTable;
use rust_decimal::Decimal;
use std::collections::HashMap;

pub struct InternalFileInput {
    pub table: RawTable,
    pub template: Template,
    pub label: char,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyReserve {
    pub threshold: Option<i64>,
    pub amount: Option<i64>,
}

impl SafetyReserve {
    fn apply(&self, hesaplanan: i64) -> i64 {
        match (self.threshold, self.amount) {
            (Some(thr), Some(amt)) if hesaplanan > thr => hesaplanan - amt,
            _ => hesaplanan,
        }
    }
}

struct ProjectedRow {
    anahtar_kod: String,
    barkod: String,
    match_code: String,
    miktar: i64,
    marka: String,
    urun_adi: String,
    fiyat: Decimal,
}

fn project(input: &InternalFileInput) -> Result<Vec<ProjectedRow>, AppError> {
    let sku_header = input.template.get("sku");
    let barcode_header = input.template.get("barcode");
    let stock_header = input.template.get("stock");
    let price_header = input.template.get("selling_price");
    let brand_header = input.template.get("brand");
    let name_header = input.template.get("product_name");

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
        let barkod = normalize_barkod_cell(&barcode_raw);

        let raw_stock = stock_header
            .and_then(|h| input.table.get(row, h))
            .unwrap_or_default();
        let parsed_stock = parse_stock_value(&raw_stock).abs();
        let miktar = if input.label == '-' { -parsed_stock } else { parsed_stock };

        let fiyat = price_header
            .and_then(|h| input.table.get(row, h))
            .map(|s| parse_price_value(&s))
            .unwrap_or(Decimal::ZERO);

        let marka = brand_header
            .and_then(|h| input.table.get(row, h))
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| MARKA_TANIMSIZ.to_string());

        let urun_adi = name_header
            .and_then(|h| input.table.get(row, h))
            .unwrap_or_default();

        let match_code = generate_match_code(&sku);

        out.push(ProjectedRow {
            anahtar_kod: sku,
            barkod,
            match_code,
            miktar,
            marka,
            urun_adi,
            fiyat,
        });
    }
    Ok(out)
}

fn normalize_barkod_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("_barkod_yok_") {
        BARKOD_YOK.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn consolidate_internal(
    files: &[InternalFileInput],
    safety: SafetyReserve,
) -> Result<Vec<InternalRow>, AppError> {
    let mut groups: HashMap<(String, String, String), (i64, String, String, Decimal)> =
        HashMap::new();

    for file in files {
        for row in project(file)? {
            let key = (row.anahtar_kod.clone(), row.barkod.clone(), row.match_code.clone());
            let entry = groups
                .entry(key)
                .or_insert_with(|| (0, String::new(), String::new(), Decimal::ZERO));
            entry.0 += row.miktar;
            if entry.1.is_empty() || entry.1 == MARKA_TANIMSIZ {
                entry.1 = row.marka.clone();
            }
            if entry.2.is_empty() && !row.urun_adi.is_empty() {
                entry.2 = row.urun_adi.clone();
            }
            if row.fiyat > entry.3 {
                entry.3 = row.fiyat;
            }
        }
    }

    let mut out: Vec<InternalRow> = groups
        .into_iter()
        .map(|((anahtar_kod, barkod, match_code), (hesaplanan, marka, urun_adi, fiyat))| {
            let nihai = safety.apply(hesaplanan);
            InternalRow {
                anahtar_kod,
                barkod,
                match_code,
                hesaplanan_stok: hesaplanan,
                nihai_stok: nihai,
                marka: if marka.is_empty() { MARKA_TANIMSIZ.to_string() } else { marka },
                ic_urun_adi: urun_adi,
                ic_hazir_fiyat: fiyat,
            }
        })
        .collect();

    out.sort_by(|a, b| a.anahtar_kod.cmp(&b.anahtar_kod));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn template() -> Template {
        let mut t = Map::new();
        t.insert("sku".to_string(), "sku".to_string());
        t.insert("barcode".to_string(), "barkod".to_string());
        t.insert("stock".to_string(), "stok".to_string());
        t.insert("selling_price".to_string(), "fiyat".to_string());
        t.insert("brand".to_string(), "marka".to_string());
        t.insert("product_name".to_string(), "ad".to_string());
        t
    }

    fn table(rows: Vec<Vec<&str>>) -> RawTable {
        RawTable {
            headers: vec![
                "sku".to_string(),
                "barkod".to_string(),
                "stok".to_string(),
                "fiyat".to_string(),
                "marka".to_string(),
                "ad".to_string(),
            ],
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn negative_label_negates_absolute_quantity() {
        let input = InternalFileInput {
            table: table(vec![vec!["A-1", "869", "-5", "10.00", "BOSCH", "Matkap"]]),
            template: template(),
            label: '-',
            filename: "depo.csv".to_string(),
        };
        let result = consolidate_internal(&[input], SafetyReserve::default()).unwrap();
        assert_eq!(result[0].hesaplanan_stok, -5);
    }

    #[test]
    fn aggregates_across_files_by_key() {
        let input_a = InternalFileInput {
            table: table(vec![vec!["A-1", "869", "5", "10.00", "BOSCH", "Matkap"]]),
            template: template(),
            label: '+',
            filename: "a.csv".to_string(),
        };
        let input_b = InternalFileInput {
            table: table(vec![vec!["A-1", "869", "3", "12.00", "BOSCH", "Matkap"]]),
            template: template(),
            label: '+',
            filename: "b.csv".to_string(),
        };
        let result = consolidate_internal(&[input_a, input_b], SafetyReserve::default()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].hesaplanan_stok, 8);
        assert_eq!(result[0].ic_hazir_fiyat, Decimal::new(1200, 2));
    }

    #[test]
    fn safety_reserve_only_applies_above_threshold() {
        let input = InternalFileInput {
            table: table(vec![vec!["A-1", "869", "50", "10.00", "BOSCH", "Matkap"]]),
            template: template(),
            label: '+',
            filename: "a.csv".to_string(),
        };
        let reserve = SafetyReserve { threshold: Some(20), amount: Some(5) };
        let result = consolidate_internal(&[input], reserve).unwrap();
        assert_eq!(result[0].nihai_stok, 45);
    }

    #[test]
    fn barkod_yok_placeholder_is_rewritten() {
        let input = InternalFileInput {
            table: table(vec![vec!["A-1", "_barkod_yok_", "5", "10.00", "BOSCH", "Matkap"]]),
            template: template(),
            label: '+',
            filename: "a.csv".to_string(),
        };
        let result = consolidate_internal(&[input], SafetyReserve::default()).unwrap();
        assert_eq!(result[0].barkod, "YOK");
    }
}
