use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const BARKOD_YOK: &str = "YOK";
pub const KOD_YOK: &str = "KOD_YOK";
pub const MARKA_TANIMSIZ: &str = "TANIMSIZ";

/// Sentinels that stand in for "brand unknown" across every input shape.
pub const BRAND_SENTINELS: &[&str] = &["TANIMSIZ", "YOK", "NAN", "NONE", "DIGER", "NULL"];

pub fn is_brand_sentinel(s: &str) -> bool {
    let upper = s.trim().to_uppercase();
    upper.is_empty() || BRAND_SENTINELS.contains(&upper.as_str())
}

/// A row of a consolidated internal-stock view, keyed by `(Anahtar_Kod, Barkod, match_code)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalRow {
    pub anahtar_kod: String,
    pub barkod: String,
    pub match_code: String,
    pub hesaplanan_stok: i64,
    pub nihai_stok: i64,
    pub marka: String,
    pub ic_urun_adi: String,
    pub ic_hazir_fiyat: Decimal,
}

/// A row of a consolidated supplier view, same key shape as `InternalRow`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierRow {
    pub anahtar_kod: String,
    pub barkod: String,
    pub match_code: String,
    pub toplam_tedarikci_stok: i64,
    pub maliyet: Decimal,
    pub ted_hazir_fiyat: Decimal,
    pub ted_urun_adi: String,
    pub marka: String,
}

/// A row projected from the marketplace file through its template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketplaceRow {
    pub idx: usize,
    pub mp_barkod: String,
    pub mp_sku: String,
    pub mp_urun_adi: String,
    pub mp_eski_stok: i64,
    pub mp_fiyat: Decimal,
    pub mp_marka: String,
    pub bk_norm: String,
    pub sku_norm: String,
}

/// One of the four pricing-rule action kinds a natural-language directive can resolve to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleAction {
    Multiplier,
    FixPrice,
    FxIndex,
    FxConversion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Currency {
    Try,
    Usd,
    Eur,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Try => "TRY",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    pub fn parse(raw: &str) -> Option<Currency> {
        match raw.trim().to_uppercase().as_str() {
            "TRY" => Some(Currency::Try),
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            _ => None,
        }
    }
}

/// A single parsed pricing directive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub target: String,
    pub action: RuleAction,
    pub value: Decimal,
    pub currency: Option<Currency>,
    pub old_rate: Option<Decimal>,
    pub raw_text: String,
}

/// Closed enumeration of the `Fiyat_Durumu` pricing-note strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FiyatDurumu {
    ManuelDondurma,
    PazaryeriFiyati,
    IcListe,
    TedListe,
    Maliyet,
    KaynakFiyatYok,
    FiyatYok,
    MaliyetYok,
    KurFarki(String),
    DovizEndeksli(String),
    Nlp(String),
    SabitFiyat(String),
    Donduruldu,
    DegisimYok,
    FiyatKorundu,
}

impl std::fmt::Display for FiyatDurumu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FiyatDurumu::ManuelDondurma => write!(f, "Manuel Dondurma"),
            FiyatDurumu::PazaryeriFiyati => write!(f, "Pazaryeri Fiyatı"),
            FiyatDurumu::IcListe => write!(f, "İç Liste"),
            FiyatDurumu::TedListe => write!(f, "Ted. Liste"),
            FiyatDurumu::Maliyet => write!(f, "Maliyet"),
            FiyatDurumu::KaynakFiyatYok => write!(f, "Kaynak Fiyat Yok"),
            FiyatDurumu::FiyatYok => write!(f, "Fiyat Yok"),
            FiyatDurumu::MaliyetYok => write!(f, "Maliyet Yok"),
            FiyatDurumu::KurFarki(t) => write!(f, "+ Kur Farkı ({t})"),
            FiyatDurumu::DovizEndeksli(t) => write!(f, "Döviz Endeksli ({t})"),
            FiyatDurumu::Nlp(t) => write!(f, "+ NLP ({t})"),
            FiyatDurumu::SabitFiyat(t) => write!(f, "Sabit Fiyat ({t})"),
            FiyatDurumu::Donduruldu => write!(f, "Donduruldu (Düşüş Engellendi)"),
            FiyatDurumu::DegisimYok => write!(f, "Değişim Yok"),
            FiyatDurumu::FiyatKorundu => write!(f, "Fiyat Korundu"),
        }
    }
}

/// Closed enumeration of the `Eslestirme` match-kind strings, in §4.3 decision order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchKind {
    Barkod,
    Sku,
    FuzyonMarkaFarkliKodSayiAyni,
    EslesmediMarkaCatismasi,
    EslesmediSetSayisiFarki,
    FuzyonAltinKod,
    FuzyonGuvenliMarka,
    FuzyonMarkaSayisal,
    FuzyonGucluSayisal,
    FuzyonYuksekMetin,
    Eslesmedi,
}

impl MatchKind {
    pub fn is_fuzyon(&self) -> bool {
        matches!(
            self,
            MatchKind::FuzyonMarkaFarkliKodSayiAyni
                | MatchKind::FuzyonAltinKod
                | MatchKind::FuzyonGuvenliMarka
                | MatchKind::FuzyonMarkaSayisal
                | MatchKind::FuzyonGucluSayisal
                | MatchKind::FuzyonYuksekMetin
        )
    }

    pub fn is_eslesmedi(&self) -> bool {
        matches!(
            self,
            MatchKind::EslesmediMarkaCatismasi
                | MatchKind::EslesmediSetSayisiFarki
                | MatchKind::Eslesmedi
        )
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchKind::Barkod => "Barkod",
            MatchKind::Sku => "SKU",
            MatchKind::FuzyonMarkaFarkliKodSayiAyni => {
                "Füzyon (Marka Farklı ama Kod ve Sayılar Aynı)"
            }
            MatchKind::EslesmediMarkaCatismasi => "Eşleşmedi (Marka Çatışması)",
            MatchKind::EslesmediSetSayisiFarki => "Eşleşmedi (Set Sayısı Farkı)",
            MatchKind::FuzyonAltinKod => "Füzyon (Altın Kod)",
            MatchKind::FuzyonGuvenliMarka => "Füzyon (Güvenli Marka)",
            MatchKind::FuzyonMarkaSayisal => "Füzyon (Marka + Sayısal Eşleşme)",
            MatchKind::FuzyonGucluSayisal => "Füzyon (Güçlü Sayısal Benzerlik)",
            MatchKind::FuzyonYuksekMetin => "Füzyon (Yüksek Metin Benzerliği)",
            MatchKind::Eslesmedi => "Eşleşmedi",
        };
        write!(f, "{s}")
    }
}

/// Final per-row disposition written to the `Durum` column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Durum {
    Eslesti,
    Eslesmedi,
    SadecePazaryerinde,
}

impl std::fmt::Display for Durum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Durum::Eslesti => "Eşleşti",
            Durum::Eslesmedi => "Eşleşmedi",
            Durum::SadecePazaryerinde => "Sadece Pazaryerinde",
        };
        write!(f, "{s}")
    }
}

/// The joined, priced row that feeds the report writer.
#[derive(Debug, Clone, Serialize)]
pub struct JoinedRow {
    pub idx: usize,
    pub mp_sku: String,
    pub mp_barkod: String,
    pub mp_urun_adi: String,
    pub kaynak_kod: String,
    /// `match_code` of the matched internal row; empty when `kaynak_kod` is empty.
    pub match_code: String,
    pub nihai_marka: String,
    /// Attached by the supplier left-join on `match_code`; `0`/`0`/`0` when no supplier
    /// record shares the matched row's `match_code`.
    pub toplam_tedarikci_stok: i64,
    pub maliyet: Decimal,
    pub ted_hazir_fiyat: Decimal,
    pub eslestirme: MatchKind,
    pub algoritma_skoru: Option<Decimal>,
    pub satis_fiyati: Decimal,
    pub fiyat_durumu: FiyatDurumu,
    pub gonderilecek_stok: i64,
    pub durum: Durum,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    StockOnly,
    Internal,
    Supplier,
    Cost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceMethod {
    StockOnly,
    ReadyList,
    Calculated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockStrategy {
    Internal,
    Supplier,
    Min,
}

impl Default for StockStrategy {
    fn default() -> Self {
        StockStrategy::Min
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrphanStrategy {
    Zero,
    Keep,
}

impl Default for OrphanStrategy {
    fn default() -> Self {
        OrphanStrategy::Keep
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceStrategy {
    pub source: PriceSource,
    pub method: PriceMethod,
    #[serde(default = "default_multiplier")]
    pub default_multiplier: Decimal,
    #[serde(default)]
    pub default_addition: Decimal,
    #[serde(default)]
    pub vat_enabled: bool,
    #[serde(default)]
    pub vat_rate: Decimal,
    #[serde(default)]
    pub smart_freeze: bool,
}

fn default_multiplier() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreezeConfig {
    #[serde(default)]
    pub skus: Vec<String>,
    #[serde(default)]
    pub barcodes: Vec<String>,
}

impl FreezeConfig {
    pub fn is_frozen(&self, sku: &str, barcode: &str) -> bool {
        self.skus.iter().any(|s| s == sku) || self.barcodes.iter().any(|b| b == barcode)
    }
}

/// A template maps logical field names to the header string used in one specific file.
pub type Template = HashMap<String, String>;

pub const TEMPLATE_FIELDS: &[&str] = &[
    "sku",
    "barcode",
    "stock",
    "selling_price",
    "cost",
    "product_name",
    "brand",
    "currency_column",
    "currency",
    "stock_to_update",
    "current_price",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub status: JobState,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingPreviewRow {
    pub row: usize,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub rule_applied: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_sentinel_detection() {
        assert!(is_brand_sentinel("TANIMSIZ"));
        assert!(is_brand_sentinel(""));
        assert!(is_brand_sentinel("nan"));
        assert!(!is_brand_sentinel("BOSCH"));
    }

    #[test]
    fn match_kind_fuzyon_flag() {
        assert!(MatchKind::FuzyonAltinKod.is_fuzyon());
        assert!(!MatchKind::Barkod.is_fuzyon());
        assert!(MatchKind::EslesmediMarkaCatismasi.is_eslesmedi());
    }
}
