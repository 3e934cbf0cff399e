//! Process-wide exchange-rate table: a read-mostly `currency -> rate` map refreshed by
//! an explicit request and swapped atomically, per the "no lock required" concurrency
//! note — readers always see either the old or the new table, never a partial one.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RateTable {
    pub rates: HashMap<String, Decimal>,
    pub last_update: DateTime<Utc>,
}

impl RateTable {
    fn fallback(now: DateTime<Utc>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("TRY".to_string(), Decimal::ONE);
        rates.insert("USD".to_string(), Decimal::from_str("32.0").unwrap());
        rates.insert("EUR".to_string(), Decimal::from_str("34.5").unwrap());
        Self {
            rates,
            last_update: now,
        }
    }

    pub fn get(&self, code: &str) -> Decimal {
        self.rates.get(code).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Any external-provider failure ((c) in the error taxonomy): the previous table is left
/// in place and the caller gets a short failure message, never a partial rate table.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RateFetchError(pub String);

pub trait RateSource: Send + Sync {
    fn fetch(&self) -> Result<HashMap<String, Decimal>, RateFetchError>;
}

/// Blocking fetch against a TCMB-style XML feed: per currency prefer `ForexSelling`,
/// fall back to `BanknoteSelling`; the feed uses `,` as its decimal separator.
pub struct TcmbRateSource {
    pub url: String,
    pub timeout_secs: u64,
}

impl RateSource for TcmbRateSource {
    fn fetch(&self) -> Result<HashMap<String, Decimal>, RateFetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| RateFetchError(e.to_string()))?;

        let body = client
            .get(&self.url)
            .send()
            .map_err(|e| RateFetchError(e.to_string()))?
            .text()
            .map_err(|e| RateFetchError(e.to_string()))?;

        parse_tcmb_xml(&body)
    }
}

fn parse_tcmb_xml(xml: &str) -> Result<HashMap<String, Decimal>, RateFetchError> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rates = HashMap::new();
    let mut current_code: Option<String> = None;
    let mut current_forex: Option<String> = None;
    let mut current_banknote: Option<String> = None;
    let mut in_tag: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| RateFetchError(e.to_string()))?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "Currency" {
                    current_code = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"CurrencyCode")
                        .map(|a| String::from_utf8_lossy(&a.value).to_string());
                    current_forex = None;
                    current_banknote = None;
                }
                in_tag = Some(name);
            }
            Event::Text(t) => {
                let text = t.unescape().unwrap_or_default().to_string();
                match in_tag.as_deref() {
                    Some("ForexSelling") => current_forex = Some(text),
                    Some("BanknoteSelling") => current_banknote = Some(text),
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"Currency" {
                    if let Some(code) = current_code.take() {
                        let raw = current_forex.take().or_else(|| current_banknote.take());
                        if let Some(raw) = raw {
                            if let Ok(value) = Decimal::from_str(&raw.replace(',', ".")) {
                                if matches!(code.as_str(), "USD" | "EUR") {
                                    rates.insert(code, value);
                                }
                            }
                        }
                    }
                }
                in_tag = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !rates.contains_key("USD") || !rates.contains_key("EUR") {
        return Err(RateFetchError(
            "USD ve EUR kurlari bulunamadi".to_string(),
        ));
    }
    rates.insert("TRY".to_string(), Decimal::ONE);
    Ok(rates)
}

pub struct RateProvider {
    table: ArcSwap<RateTable>,
    source: Box<dyn RateSource>,
}

impl RateProvider {
    pub fn new(source: Box<dyn RateSource>, now: DateTime<Utc>) -> Self {
        Self {
            table: ArcSwap::from_pointee(RateTable::fallback(now)),
            source,
        }
    }

    pub fn current(&self) -> Arc<RateTable> {
        self.table.load_full()
    }

    /// Refresh is all-or-nothing: a fetch that cannot produce both USD and EUR leaves
    /// the previous table untouched, since a half-updated table would mix rate vintages
    /// across currencies within one consolidation run.
    pub fn refresh(&self, now: DateTime<Utc>) -> Result<(), RateFetchError> {
        let rates = self.source.fetch()?;
        self.table.store(Arc::new(RateTable {
            rates,
            last_update: now,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(HashMap<String, Decimal>);
    impl RateSource for FixedSource {
        fn fetch(&self) -> Result<HashMap<String, Decimal>, RateFetchError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;
    impl RateSource for FailingSource {
        fn fetch(&self) -> Result<HashMap<String, Decimal>, RateFetchError> {
            Err(RateFetchError("boom".to_string()))
        }
    }

    #[test]
    fn refresh_replaces_table() {
        let now = Utc::now();
        let mut rates = HashMap::new();
        rates.insert("USD".to_string(), Decimal::from_str("40").unwrap());
        rates.insert("EUR".to_string(), Decimal::from_str("44").unwrap());
        rates.insert("TRY".to_string(), Decimal::ONE);
        let provider = RateProvider::new(Box::new(FixedSource(rates)), now);
        provider.refresh(now).unwrap();
        assert_eq!(provider.current().get("USD"), Decimal::from_str("40").unwrap());
    }

    #[test]
    fn failed_refresh_preserves_old_table() {
        let now = Utc::now();
        let provider = RateProvider::new(Box::new(FailingSource), now);
        let before = provider.current().get("USD");
        assert!(provider.refresh(now).is_err());
        assert_eq!(provider.current().get("USD"), before);
    }

    #[test]
    fn parse_tcmb_xml_prefers_forex_selling() {
        let xml = r#"<Tarih_Date><Currency CurrencyCode="USD"><ForexSelling>32,5000</ForexSelling><BanknoteSelling>32,6000</BanknoteSelling></Currency><Currency CurrencyCode="EUR"><ForexSelling>34,1000</ForexSelling></Currency></Tarih_Date>"#;
        let rates = parse_tcmb_xml(xml).unwrap();
        assert_eq!(rates["USD"], Decimal::from_str("32.5000").unwrap());
        assert_eq!(rates["EUR"], Decimal::from_str("34.1000").unwrap());
    }

    #[test]
    fn parse_tcmb_xml_falls_back_to_banknote() {
        let xml = r#"<Tarih_Date><Currency CurrencyCode="USD"><BanknoteSelling>32,6000</BanknoteSelling></Currency><Currency CurrencyCode="EUR"><ForexSelling>34,1000</ForexSelling></Currency></Tarih_Date>"#;
        let rates = parse_tcmb_xml(xml).unwrap();
        assert_eq!(rates["USD"], Decimal::from_str("32.6000").unwrap());
    }

    #[test]
    fn parse_tcmb_xml_requires_both_currencies() {
        let xml = r#"<Tarih_Date><Currency CurrencyCode="USD"><ForexSelling>32,5000</ForexSelling></Currency></Tarih_Date>"#;
        assert!(parse_tcmb_xml(xml).is_err());
    }
}
