//! Three-stage matcher: exact barcode, exact SKU, then a hybrid TF-IDF/Jaccard text
//! pass with brand-conflict and identity-code reasoning. A processed-row set prevents
//! a marketplace row from being matched more than once across stages.

use crate::brands::{self, brand_conflict, brands_match};
use crate::models::{
    Durum, FiyatDurumu, InternalRow, JoinedRow, MarketplaceRow, MatchKind, SupplierRow,
};
use crate::normalize::{normalize_text, numeric_tokens, strict_normalize};
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

const BANNED_IDENTITY_TOKENS: &[&str] = &[
    "SET", "ADET", "PARCA", "TAKIM", "CANTALI", "KUTULU", "PRO", "PLUS", "MAX",
];

struct InternalCandidate<'a> {
    row: &'a InternalRow,
    norm_name: String,
    brand: String,
}

fn set_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*(parca|prc|set|li)").unwrap())
}

fn set_count(text: &str) -> Option<i64> {
    set_count_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn set_count_conflict(a: &str, b: &str) -> bool {
    match (set_count(a), set_count(b)) {
        (Some(x), Some(y)) => x != y,
        _ => false,
    }
}

fn numeric_match(a: &str, b: &str) -> bool {
    let ta = numeric_tokens(a);
    let tb = numeric_tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return false;
    }
    ta.is_subset(&tb) || tb.is_subset(&ta)
}

fn identity_codes(norm_name: &str) -> HashSet<String> {
    norm_name
        .split_whitespace()
        .filter(|tok| {
            let upper = tok.to_uppercase();
            if BANNED_IDENTITY_TOKENS.contains(&upper.as_str()) {
                return false;
            }
            let has_digit = tok.chars().any(|c| c.is_ascii_digit());
            let has_alpha = tok.chars().any(|c| c.is_alphabetic());
            let len = tok.chars().count();
            (len >= 3 && has_digit && has_alpha)
                || (len >= 4 && has_alpha && !has_digit && !brands::is_known_brand(&upper))
        })
        .map(|s| s.to_string())
        .collect()
}

fn strong_code_match(mp_codes: &HashSet<String>, in_codes: &HashSet<String>, mp_norm_name: &str) -> bool {
    if mp_codes.intersection(in_codes).any(|t| t.chars().count() >= 3) {
        return true;
    }
    let mp_compact: String = mp_norm_name.chars().filter(|c| !c.is_whitespace()).collect();
    in_codes
        .iter()
        .any(|code| code.chars().count() > 3 && mp_compact.contains(code.as_str()))
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Character n-grams of lengths 3 and 4 inside word boundaries (no cross-word grams), the
/// same segmentation sklearn's `char_wb` analyzer uses.
fn word_ngrams(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let len = chars.len();
    let mut out = Vec::new();
    for n in 3..=4usize {
        if len < n {
            continue;
        }
        for i in 0..=(len - n) {
            out.push(chars[i..i + n].iter().collect());
        }
    }
    if out.is_empty() && len > 0 {
        out.push(chars.iter().collect());
    }
    out
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut counts: HashMap<String, f32> = HashMap::new();
    for word in text.split_whitespace() {
        for gram in word_ngrams(word) {
            *counts.entry(gram).or_insert(0.0) += 1.0;
        }
    }
    counts
}

/// Fits document frequencies over the union of both sides, `min_df = 1` (every n-gram
/// that occurs anywhere is kept), and returns each document's TF-IDF vector.
fn tfidf_vectors(docs: &[&str]) -> Vec<HashMap<String, f32>> {
    let term_freqs: Vec<HashMap<String, f32>> = docs.iter().map(|d| term_frequencies(d)).collect();

    let mut doc_freq: HashMap<String, f32> = HashMap::new();
    for tf in &term_freqs {
        for term in tf.keys() {
            *doc_freq.entry(term.clone()).or_insert(0.0) += 1.0;
        }
    }
    let n = docs.len() as f32;

    term_freqs
        .into_iter()
        .map(|tf| {
            tf.into_iter()
                .map(|(term, count)| {
                    let df = doc_freq.get(&term).copied().unwrap_or(1.0);
                    let idf = (n / df).ln() + 1.0;
                    (term, count * idf)
                })
                .collect::<HashMap<String, f32>>()
        })
        .collect()
}

fn cosine(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f64 {
    let mut dot = 0.0f64;
    for (term, av) in a {
        if let Some(bv) = b.get(term) {
            dot += (*av as f64) * (*bv as f64);
        }
    }
    let norm_a: f64 = a.values().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn internal_brand(row: &InternalRow) -> String {
    brands::detect_brand_smart(&row.marka, &row.ic_urun_adi)
}

fn default_missing_supplier_attrs() -> (i64, Decimal, Decimal, String) {
    (0, Decimal::ZERO, Decimal::ZERO, "TANIMSIZ".to_string())
}

pub fn run_matching(
    marketplace: &[MarketplaceRow],
    internal: &[InternalRow],
    supplier: &[SupplierRow],
    marketplace_brands: &HashMap<usize, String>,
) -> Vec<JoinedRow> {
    let mut processed: HashSet<usize> = HashSet::new();
    let mut joined: Vec<JoinedRow> = Vec::with_capacity(marketplace.len());

    let mut bk_index: HashMap<String, usize> = HashMap::new();
    for (i, row) in internal.iter().enumerate() {
        let norm = strict_normalize(&row.barkod);
        if norm.chars().count() > 4 {
            bk_index.entry(norm).or_insert(i);
        }
    }
    for row in marketplace {
        if row.bk_norm.chars().count() > 4 {
            if let Some(&i) = bk_index.get(&row.bk_norm) {
                joined.push(make_match(row, internal.get(i), MatchKind::Barkod, None));
                processed.insert(row.idx);
            }
        }
    }

    let mut sku_index: HashMap<String, usize> = HashMap::new();
    for (i, row) in internal.iter().enumerate() {
        let norm = strict_normalize(&row.anahtar_kod);
        if norm.chars().count() > 2 {
            sku_index.entry(norm).or_insert(i);
        }
    }
    for row in marketplace {
        if processed.contains(&row.idx) {
            continue;
        }
        if row.sku_norm.chars().count() > 2 {
            if let Some(&i) = sku_index.get(&row.sku_norm) {
                joined.push(make_match(row, internal.get(i), MatchKind::Sku, None));
                processed.insert(row.idx);
            }
        }
    }

    let internal_candidates: Vec<InternalCandidate> = internal
        .iter()
        .map(|row| InternalCandidate {
            row,
            norm_name: normalize_text(&row.ic_urun_adi),
            brand: internal_brand(row),
        })
        .filter(|c| c.norm_name.chars().count() > 3)
        .collect();

    let remaining: Vec<&MarketplaceRow> = marketplace
        .iter()
        .filter(|r| !processed.contains(&r.idx))
        .collect();

    let mp_norm_names: Vec<String> = remaining
        .iter()
        .map(|r| normalize_text(&r.mp_urun_adi))
        .collect();

    if !internal_candidates.is_empty() {
        let corpus: Vec<&str> = remaining
            .iter()
            .enumerate()
            .map(|(i, _)| mp_norm_names[i].as_str())
            .chain(internal_candidates.iter().map(|c| c.norm_name.as_str()))
            .collect();
        let vectors = tfidf_vectors(&corpus);
        let (mp_vectors, internal_vectors) = vectors.split_at(remaining.len());

        for (m_pos, row) in remaining.iter().enumerate() {
            let mp_norm_name = &mp_norm_names[m_pos];
            if mp_norm_name.chars().count() <= 3 {
                joined.push(make_unmatched(row));
                continue;
            }
            let mp_vec = &mp_vectors[m_pos];

            let mut best_j = None;
            let mut best_score = -1.0f64;
            for (j, _) in internal_candidates.iter().enumerate() {
                let score = cosine(mp_vec, &internal_vectors[j]);
                if score > best_score {
                    best_score = score;
                    best_j = Some(j);
                }
            }

            let Some(j) = best_j else {
                joined.push(make_unmatched(row));
                continue;
            };
            if best_score < 0.15 {
                joined.push(make_unmatched(row));
                continue;
            }

            let candidate = &internal_candidates[j];
            let mp_brand = marketplace_brands
                .get(&row.idx)
                .cloned()
                .unwrap_or_else(|| row.mp_marka.clone());

            let mp_tokens: HashSet<&str> = mp_norm_name.split_whitespace().collect();
            let in_tokens: HashSet<&str> = candidate.norm_name.split_whitespace().collect();
            let jac = jaccard(&mp_tokens, &in_tokens);
            let hybrid = (0.6 * best_score + 0.4 * jac).clamp(0.0, 1.0);

            let mp_codes = identity_codes(mp_norm_name);
            let in_codes = identity_codes(&candidate.norm_name);
            let strong = strong_code_match(&mp_codes, &in_codes, mp_norm_name);
            let num_match = numeric_match(mp_norm_name, &candidate.norm_name);
            let set_conflict = set_count_conflict(mp_norm_name, &candidate.norm_name);
            let conflict = brand_conflict(&mp_brand, &candidate.brand);
            let brand_same = brands_match(&mp_brand, &candidate.brand);

            let kind = if conflict && strong && !set_conflict && num_match {
                MatchKind::FuzyonMarkaFarkliKodSayiAyni
            } else if conflict {
                MatchKind::EslesmediMarkaCatismasi
            } else if set_conflict {
                MatchKind::EslesmediSetSayisiFarki
            } else if strong {
                MatchKind::FuzyonAltinKod
            } else if brand_same && hybrid > 0.35 {
                MatchKind::FuzyonGuvenliMarka
            } else if brand_same && num_match && hybrid > 0.25 {
                MatchKind::FuzyonMarkaSayisal
            } else if num_match && hybrid > 0.50 {
                MatchKind::FuzyonGucluSayisal
            } else if hybrid > 0.75 {
                MatchKind::FuzyonYuksekMetin
            } else {
                MatchKind::Eslesmedi
            };

            if kind.is_eslesmedi() {
                joined.push(make_unmatched(row));
            } else {
                let score = Decimal::from_f64_retain(hybrid * 100.0)
                    .map(|d| d.round_dp(2))
                    .unwrap_or(Decimal::ZERO);
                joined.push(make_match(
                    row,
                    Some(internal_candidates[j].row),
                    kind,
                    Some(score),
                ));
            }
        }
    } else {
        for row in &remaining {
            joined.push(make_unmatched(row));
        }
    }

    enrich_with_supplier(&mut joined, supplier, internal);
    joined
}

fn make_unmatched(row: &MarketplaceRow) -> JoinedRow {
    JoinedRow {
        idx: row.idx,
        mp_sku: row.mp_sku.clone(),
        mp_barkod: row.mp_barkod.clone(),
        mp_urun_adi: row.mp_urun_adi.clone(),
        kaynak_kod: String::new(),
        match_code: String::new(),
        nihai_marka: if row.mp_marka.is_empty() { "TANIMSIZ".to_string() } else { row.mp_marka.clone() },
        toplam_tedarikci_stok: 0,
        maliyet: Decimal::ZERO,
        ted_hazir_fiyat: Decimal::ZERO,
        eslestirme: MatchKind::Eslesmedi,
        algoritma_skoru: None,
        satis_fiyati: row.mp_fiyat,
        fiyat_durumu: FiyatDurumu::KaynakFiyatYok,
        gonderilecek_stok: 0,
        durum: Durum::Eslesmedi,
    }
}

fn make_match(
    row: &MarketplaceRow,
    internal: Option<&InternalRow>,
    kind: MatchKind,
    score: Option<Decimal>,
) -> JoinedRow {
    let Some(internal) = internal else {
        return make_unmatched(row);
    };
    JoinedRow {
        idx: row.idx,
        mp_sku: row.mp_sku.clone(),
        mp_barkod: row.mp_barkod.clone(),
        mp_urun_adi: row.mp_urun_adi.clone(),
        kaynak_kod: internal.anahtar_kod.clone(),
        match_code: internal.match_code.clone(),
        nihai_marka: internal.marka.clone(),
        toplam_tedarikci_stok: 0,
        maliyet: Decimal::ZERO,
        ted_hazir_fiyat: Decimal::ZERO,
        eslestirme: kind,
        algoritma_skoru: score,
        satis_fiyati: row.mp_fiyat,
        fiyat_durumu: FiyatDurumu::PazaryeriFiyati,
        gonderilecek_stok: internal.nihai_stok,
        durum: Durum::Eslesti,
    }
}

/// Left-join on `match_code`, first win, defaulting to `(0, 0, 0, "TANIMSIZ")` when no
/// supplier record shares the matched internal row's `match_code`; also resolves the
/// final brand as the first non-sentinel of internal brand, supplier brand, marketplace brand.
fn enrich_with_supplier(joined: &mut [JoinedRow], supplier: &[SupplierRow], internal: &[InternalRow]) {
    let mut by_match_code: HashMap<&str, &SupplierRow> = HashMap::new();
    for row in supplier {
        by_match_code.entry(row.match_code.as_str()).or_insert(row);
    }
    let internal_by_code: HashMap<&str, &InternalRow> =
        internal.iter().map(|r| (r.anahtar_kod.as_str(), r)).collect();

    for row in joined.iter_mut() {
        if row.kaynak_kod.is_empty() {
            continue;
        }
        let Some(internal_row) = internal_by_code.get(row.kaynak_kod.as_str()) else {
            continue;
        };
        let (toplam_tedarikci_stok, maliyet, ted_hazir_fiyat, marka_ted) = by_match_code
            .get(internal_row.match_code.as_str())
            .map(|s| (s.toplam_tedarikci_stok, s.maliyet, s.ted_hazir_fiyat, s.marka.clone()))
            .unwrap_or_else(default_missing_supplier_attrs);

        row.toplam_tedarikci_stok = toplam_tedarikci_stok;
        row.maliyet = maliyet;
        row.ted_hazir_fiyat = ted_hazir_fiyat;
        row.nihai_marka = first_non_sentinel(&[&internal_row.marka, &marka_ted, &row.nihai_marka]);
    }
}

fn first_non_sentinel(candidates: &[&String]) -> String {
    for c in candidates {
        if !crate::models::is_brand_sentinel(c) {
            return (*c).clone();
        }
    }
    "TANIMSIZ".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn mp_row(idx: usize, barkod: &str, sku: &str, name: &str) -> MarketplaceRow {
        MarketplaceRow {
            idx,
            mp_barkod: barkod.to_string(),
            mp_sku: sku.to_string(),
            mp_urun_adi: name.to_string(),
            mp_eski_stok: 0,
            mp_fiyat: Decimal::new(1000, 2),
            mp_marka: "TANIMSIZ".to_string(),
            bk_norm: strict_normalize(barkod),
            sku_norm: strict_normalize(sku),
        }
    }

    fn internal_row(anahtar_kod: &str, barkod: &str, name: &str, brand: &str) -> InternalRow {
        InternalRow {
            anahtar_kod: anahtar_kod.to_string(),
            barkod: barkod.to_string(),
            match_code: crate::normalize::generate_match_code(anahtar_kod),
            hesaplanan_stok: 10,
            nihai_stok: 10,
            marka: brand.to_string(),
            ic_urun_adi: name.to_string(),
            ic_hazir_fiyat: Decimal::new(1500, 2),
        }
    }

    #[test]
    fn barcode_stage_wins_over_text_stage() {
        let mp = vec![mp_row(0, "8690000000001", "X-1", "Bosch Matkap 13mm")];
        let internal = vec![internal_row("A-1", "8690000000001", "Bosch Matkap 13mm", "BOSCH")];
        let joined = run_matching(&mp, &internal, &[], &HashMap::new());
        assert_eq!(joined[0].eslestirme, MatchKind::Barkod);
    }

    #[test]
    fn brand_conflict_blocks_text_match() {
        let mp = vec![mp_row(0, "", "", "Bosch Matkap 13mm Seti 5 Parca")];
        let internal = vec![internal_row("A-1", "", "Makita Matkap 13mm Seti 5 Parca", "MAKITA")];
        let joined = run_matching(&mp, &internal, &[], &HashMap::new());
        assert_eq!(joined[0].eslestirme, MatchKind::EslesmediMarkaCatismasi);
    }

    #[test]
    fn identical_text_without_brand_conflict_fuses() {
        let mp = vec![mp_row(0, "", "", "Profesyonel Darbeli Matkap Delme Makinesi Seti")];
        let internal = vec![internal_row(
            "A-1",
            "",
            "Profesyonel Darbeli Matkap Delme Makinesi Seti",
            "TANIMSIZ",
        )];
        let joined = run_matching(&mp, &internal, &[], &HashMap::new());
        assert!(joined[0].eslestirme.is_fuzyon());
    }

    #[test]
    fn unrelated_text_does_not_match() {
        let mp = vec![mp_row(0, "", "", "Kalem Ucu Silgi Seti")];
        let internal = vec![internal_row("A-1", "", "Matkap Delme Makinesi", "BOSCH")];
        let joined = run_matching(&mp, &internal, &[], &HashMap::new());
        assert_eq!(joined[0].eslestirme, MatchKind::Eslesmedi);
    }
}
