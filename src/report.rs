//! Builds the auditable multi-sheet workbook handed back to the caller: a summary sheet,
//! matched/unmatched/missing-in-marketplace partitions, and an optional upload-format overlay.

use crate::models::{Durum, InternalRow, JoinedRow, MatchKind, Template};
use crate::tables::{RawTable, Sheet, Workbook};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

const MATCH_KIND_ORDER: &[MatchKind] = &[
    MatchKind::Barkod,
    MatchKind::Sku,
    MatchKind::FuzyonMarkaFarkliKodSayiAyni,
    MatchKind::EslesmediMarkaCatismasi,
    MatchKind::EslesmediSetSayisiFarki,
    MatchKind::FuzyonAltinKod,
    MatchKind::FuzyonGuvenliMarka,
    MatchKind::FuzyonMarkaSayisal,
    MatchKind::FuzyonGucluSayisal,
    MatchKind::FuzyonYuksekMetin,
    MatchKind::Eslesmedi,
];

fn precedence(kind: &MatchKind) -> u8 {
    match kind {
        MatchKind::Barkod => 0,
        MatchKind::Sku => 1,
        _ => 2,
    }
}

pub struct ReportOptions<'a> {
    pub include_original_format: bool,
    pub original_marketplace: Option<&'a RawTable>,
    pub marketplace_template: Option<&'a Template>,
}

pub fn build_report(
    joined: &[JoinedRow],
    internal: &[InternalRow],
    supplier: &[crate::models::SupplierRow],
    generated_at: DateTime<Utc>,
    options: &ReportOptions,
) -> Workbook {
    let matched: Vec<&JoinedRow> = joined.iter().filter(|r| !r.kaynak_kod.is_empty()).collect();
    let unmatched: Vec<&JoinedRow> = joined.iter().filter(|r| r.kaynak_kod.is_empty()).collect();

    let matched_codes: HashSet<&str> = matched.iter().map(|r| r.kaynak_kod.as_str()).collect();
    let missing: Vec<&InternalRow> = internal
        .iter()
        .filter(|r| !matched_codes.contains(r.anahtar_kod.as_str()))
        .collect();

    let mut sorted_matched = matched.clone();
    sorted_matched.sort_by(|a, b| {
        precedence(&a.eslestirme).cmp(&precedence(&b.eslestirme)).then_with(|| {
            b.algoritma_skoru
                .unwrap_or_default()
                .cmp(&a.algoritma_skoru.unwrap_or_default())
        })
    });

    let mut workbook = Workbook::default();
    workbook
        .sheets
        .push(build_summary_sheet(&sorted_matched, &unmatched, &missing, generated_at));
    workbook.sheets.push(build_matched_sheet(&sorted_matched));
    workbook.sheets.push(build_unmatched_sheet(&unmatched));
    workbook.sheets.push(build_missing_sheet(&missing));

    if let Some(original) = options.original_marketplace {
        workbook.sheets.push(build_raw_marketplace_sheet(original));
    }
    workbook.sheets.push(build_raw_internal_sheet(internal));
    if !supplier.is_empty() {
        workbook.sheets.push(build_raw_supplier_sheet(supplier));
    }

    if options.include_original_format {
        if let (Some(original), Some(template)) =
            (options.original_marketplace, options.marketplace_template)
        {
            workbook
                .sheets
                .push(build_overlay_sheet(original, template, joined));
        }
    }

    workbook
}

fn build_summary_sheet(
    matched: &[&JoinedRow],
    unmatched: &[&JoinedRow],
    missing: &[&InternalRow],
    generated_at: DateTime<Utc>,
) -> Sheet {
    let mut sheet = Sheet::new("1. Genel Özet", vec!["Alan".to_string(), "Değer".to_string()]);
    let total = matched.len() + unmatched.len();
    let match_rate = if total > 0 {
        format!("{:.2}", (matched.len() as f64 / total as f64) * 100.0)
    } else {
        "0.00".to_string()
    };

    let mut row = |label: &str, value: String| {
        sheet.rows.push(vec![label.to_string(), value]);
    };

    row("Rapor Başlığı", "Pazaryeri Katalog Mutabakatı".to_string());
    row("Oluşturulma Zamanı", generated_at.to_rfc3339());
    row("Toplam Pazaryeri Satırı", total.to_string());
    row("Toplam Eşleşen", matched.len().to_string());
    row("Toplam Eşleşmeyen", unmatched.len().to_string());
    row("Eşleşme Oranı (%)", match_rate);

    for kind in MATCH_KIND_ORDER {
        let count = matched.iter().filter(|r| r.eslestirme == *kind).count()
            + unmatched.iter().filter(|r| r.eslestirme == *kind).count();
        if count > 0 {
            row(&format!("Eşleştirme: {kind}"), count.to_string());
        }
    }

    row("Sadece Depoda Olan (Bizde Var MP Yok)", missing.len().to_string());

    row("Sözlük — MP_SKU", "Pazaryerindeki ürün kodu".to_string());
    row("Sözlük — MP_Barkod", "Pazaryerindeki barkod değeri".to_string());
    row("Sözlük — MP_Urun_Adi", "Pazaryerindeki ürün adı".to_string());
    row("Sözlük — Kaynak_Kod", "Eşleşen iç depo Anahtar_Kod değeri".to_string());
    row("Sözlük — Nihai_Marka", "Eşleşme sonrası çözülen marka".to_string());
    row("Sözlük — Eslestirme", "Eşleştirme algoritmasının ürettiği eşleşme türü".to_string());
    row("Sözlük — Algoritma_Skoru", "Yalnızca metin benzerliği (Füzyon) eşleşmelerinde 0-100 skoru".to_string());
    row("Sözlük — Satis_Fiyati", "Fiyatlandırma motorunun ürettiği yeni satış fiyatı".to_string());
    row("Sözlük — Fiyat_Durumu", "Fiyatın nasıl belirlendiğine dair açıklama".to_string());
    row("Sözlük — Gonderilecek_Stok", "Pazaryerine gönderilecek nihai stok miktarı".to_string());
    row("Sözlük — Durum", "Satırın genel nihai durumu".to_string());

    row(
        "Uyarı",
        "Bu rapor algoritmik olarak üretilmiştir; toplu yüklemeden önce örnekleme ile kontrol edilmelidir.".to_string(),
    );

    sheet
}

fn joined_header() -> Vec<String> {
    vec![
        "MP_SKU".to_string(),
        "MP_Barkod".to_string(),
        "MP_Urun_Adi".to_string(),
        "Kaynak_Kod".to_string(),
        "Nihai_Marka".to_string(),
        "Eslestirme".to_string(),
        "Algoritma_Skoru".to_string(),
        "Satis_Fiyati".to_string(),
        "Fiyat_Durumu".to_string(),
        "Gonderilecek_Stok".to_string(),
        "Durum".to_string(),
    ]
}

fn joined_row_cells(row: &JoinedRow) -> Vec<String> {
    vec![
        row.mp_sku.clone(),
        row.mp_barkod.clone(),
        row.mp_urun_adi.clone(),
        row.kaynak_kod.clone(),
        row.nihai_marka.clone(),
        row.eslestirme.to_string(),
        if row.eslestirme.to_string().contains("Füzyon") {
            row.algoritma_skoru.map(|s| s.to_string()).unwrap_or_default()
        } else {
            String::new()
        },
        row.satis_fiyati.to_string(),
        row.fiyat_durumu.to_string(),
        row.gonderilecek_stok.to_string(),
        row.durum.to_string(),
    ]
}

fn build_matched_sheet(matched: &[&JoinedRow]) -> Sheet {
    let mut sheet = Sheet::new("2. Eşleşenler (Yeşil)", joined_header());
    for row in matched {
        sheet.rows.push(joined_row_cells(row));
    }
    sheet
}

fn build_unmatched_sheet(unmatched: &[&JoinedRow]) -> Sheet {
    let mut sheet = Sheet::new("3. Eşleşmeyenler (Kırmızı)", joined_header());
    for row in unmatched {
        sheet.rows.push(joined_row_cells(row));
    }
    sheet
}

/// Verbatim dump of the uploaded marketplace file, for audit traceability back to source.
fn build_raw_marketplace_sheet(original: &RawTable) -> Sheet {
    let mut sheet = Sheet::new("5. Pazaryeri Ham", original.headers.clone());
    sheet.rows = original.rows.clone();
    sheet
}

fn build_raw_internal_sheet(internal: &[InternalRow]) -> Sheet {
    let mut sheet = Sheet::new(
        "6. İç Stok Ham",
        vec![
            "Anahtar_Kod".to_string(),
            "Barkod".to_string(),
            "Marka".to_string(),
            "Ic_Urun_Adi".to_string(),
            "Hesaplanan_Stok".to_string(),
            "Nihai_Stok".to_string(),
            "Ic_Hazir_Fiyat".to_string(),
        ],
    );
    for row in internal {
        sheet.rows.push(vec![
            row.anahtar_kod.clone(),
            row.barkod.clone(),
            row.marka.clone(),
            row.ic_urun_adi.clone(),
            row.hesaplanan_stok.to_string(),
            row.nihai_stok.to_string(),
            row.ic_hazir_fiyat.to_string(),
        ]);
    }
    sheet
}

fn build_raw_supplier_sheet(supplier: &[crate::models::SupplierRow]) -> Sheet {
    let mut sheet = Sheet::new(
        "7. Tedarikçi Ham",
        vec![
            "Anahtar_Kod".to_string(),
            "Barkod".to_string(),
            "Marka".to_string(),
            "Ted_Urun_Adi".to_string(),
            "Toplam_Tedarikci_Stok".to_string(),
            "Maliyet".to_string(),
            "Ted_Hazir_Fiyat".to_string(),
        ],
    );
    for row in supplier {
        sheet.rows.push(vec![
            row.anahtar_kod.clone(),
            row.barkod.clone(),
            row.marka.clone(),
            row.ted_urun_adi.clone(),
            row.toplam_tedarikci_stok.to_string(),
            row.maliyet.to_string(),
            row.ted_hazir_fiyat.to_string(),
        ]);
    }
    sheet
}

fn build_missing_sheet(missing: &[&InternalRow]) -> Sheet {
    let mut sheet = Sheet::new(
        "4. Bizde Var MP Yok",
        vec![
            "Anahtar_Kod".to_string(),
            "Barkod".to_string(),
            "Marka".to_string(),
            "Ic_Urun_Adi".to_string(),
            "Nihai_Stok".to_string(),
            "Durum".to_string(),
        ],
    );
    for row in missing {
        sheet.rows.push(vec![
            row.anahtar_kod.clone(),
            row.barkod.clone(),
            row.marka.clone(),
            row.ic_urun_adi.clone(),
            row.nihai_stok.to_string(),
            Durum::SadecePazaryerinde.to_string(),
        ]);
    }
    sheet
}

/// Copies the original marketplace table verbatim, overwriting only the price/stock
/// columns (located via the template's logical fields) for every SKU the priced table
/// covers; rows whose SKU was not found are left untouched.
fn build_overlay_sheet(original: &RawTable, template: &Template, joined: &[JoinedRow]) -> Sheet {
    let by_sku: HashMap<&str, &JoinedRow> = joined.iter().map(|r| (r.mp_sku.as_str(), r)).collect();

    let sku_header = template.get("sku");
    let price_header = template.get("current_price");
    let stock_header = template.get("stock_to_update");

    let price_idx = price_header.and_then(|h| original.headers.iter().position(|c| c == h));
    let stock_idx = stock_header.and_then(|h| original.headers.iter().position(|c| c == h));
    let sku_idx = sku_header.and_then(|h| original.headers.iter().position(|c| c == h));

    let mut sheet = Sheet::new("OPSİYONEL - Yükleme Formatı", original.headers.clone());
    for row in &original.rows {
        let mut out_row = row.clone();
        if let Some(sku_idx) = sku_idx {
            if let Some(sku) = row.get(sku_idx) {
                if let Some(joined_row) = by_sku.get(sku.as_str()) {
                    if let Some(i) = price_idx {
                        if let Some(cell) = out_row.get_mut(i) {
                            *cell = joined_row.satis_fiyati.to_string();
                        }
                    }
                    if let Some(i) = stock_idx {
                        if let Some(cell) = out_row.get_mut(i) {
                            *cell = joined_row.gonderilecek_stok.to_string();
                        }
                    }
                }
            }
        }
        sheet.rows.push(out_row);
    }
    sheet
}

/// Source rows a SKU lookup could not find in the joined table for the overlay sheet —
/// never expected given the uniqueness invariant, surfaced defensively for diagnostics.
pub fn overlay_missing_skus(original: &RawTable, template: &Template, joined: &[JoinedRow]) -> Vec<String> {
    let known: HashSet<&str> = joined.iter().map(|r| r.mp_sku.as_str()).collect();
    let Some(sku_header) = template.get("sku") else {
        return Vec::new();
    };
    let Some(sku_idx) = original.headers.iter().position(|c| c == sku_header) else {
        return Vec::new();
    };
    original
        .rows
        .iter()
        .filter_map(|row| row.get(sku_idx))
        .filter(|sku| !known.contains(sku.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Durum, FiyatDurumu};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn joined_row(sku: &str, kaynak: &str, kind: MatchKind, score: Option<Decimal>) -> JoinedRow {
        JoinedRow {
            idx: 0,
            mp_sku: sku.to_string(),
            mp_barkod: "".to_string(),
            mp_urun_adi: "".to_string(),
            kaynak_kod: kaynak.to_string(),
            match_code: String::new(),
            nihai_marka: "BOSCH".to_string(),
            toplam_tedarikci_stok: 0,
            maliyet: Decimal::ZERO,
            ted_hazir_fiyat: Decimal::ZERO,
            eslestirme: kind,
            algoritma_skoru: score,
            satis_fiyati: Decimal::new(1000, 2),
            fiyat_durumu: FiyatDurumu::IcListe,
            gonderilecek_stok: 5,
            durum: Durum::Eslesti,
        }
    }

    #[test]
    fn summary_sheet_has_match_rate_row() {
        let matched = vec![joined_row("A", "A-1", MatchKind::Barkod, None)];
        let unmatched: Vec<&JoinedRow> = Vec::new();
        let sheet = build_summary_sheet(&matched.iter().collect::<Vec<_>>(), &unmatched, &[], Utc::now());
        assert!(sheet.rows.iter().any(|r| r[0] == "Eşleşme Oranı (%)"));
    }

    #[test]
    fn matched_rows_are_sorted_barcode_before_text() {
        let a = joined_row("A", "A-1", MatchKind::FuzyonAltinKod, Some(Decimal::new(9000, 2)));
        let b = joined_row("B", "B-1", MatchKind::Barkod, None);
        let matched = vec![&a, &b];
        let mut sorted = matched.clone();
        sorted.sort_by(|x, y| precedence(&x.eslestirme).cmp(&precedence(&y.eslestirme)));
        assert_eq!(sorted[0].mp_sku, "B");
    }

    #[test]
    fn missing_sheet_uses_sadece_pazaryerinde() {
        let internal = InternalRow {
            anahtar_kod: "A-1".to_string(),
            barkod: "869".to_string(),
            match_code: "1".to_string(),
            hesaplanan_stok: 5,
            nihai_stok: 5,
            marka: "BOSCH".to_string(),
            ic_urun_adi: "Matkap".to_string(),
            ic_hazir_fiyat: Decimal::ZERO,
        };
        let sheet = build_missing_sheet(&[&internal]);
        assert_eq!(sheet.rows[0][5], "Sadece Pazaryerinde");
    }
}
