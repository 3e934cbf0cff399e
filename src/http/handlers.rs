//! One handler per external-interface entry. Multipart fields are walked the same way
//! `api-server/src/main.rs` walks its own upload endpoint: `while let Some(item) =
//! payload.next().await`, dispatching on `field.content_disposition().get_name()`.

use super::AppState;
use crate::consolidate::{
    consolidate_internal, consolidate_supplier, InternalFileInput, SafetyReserve,
    SupplierFileInput,
};
use crate::error::AppError;
use crate::jobs::{self, JobStore};
use crate::marketplace::{project_marketplace, BrandExtractionStrategy};
use crate::matching::run_matching;
use crate::models::{
    Currency, FreezeConfig, JobStatus, MarketplaceRow, OrphanStrategy, PriceMethod, PriceSource,
    PriceStrategy, StockStrategy, Template,
};
use crate::pricing::{price_row, select_stock, PricingInput};
use crate::rates::RateProvider;
use crate::report::{build_report, ReportOptions};
use crate::rules::{parse_natural_language_rules, preview_pricing_rules};
use crate::tables::{read_table, write_xlsx, RawTable};
use crate::templates::sample_csv;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Exchange rates
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RatesResponse {
    rates: HashMap<String, Decimal>,
    last_update: chrono::DateTime<Utc>,
}

pub async fn get_exchange_rates(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let table = state.rates.current();
    Ok(HttpResponse::Ok().json(RatesResponse {
        rates: table.rates.clone(),
        last_update: table.last_update,
    }))
}

pub async fn refresh_exchange_rates(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let rates = state.rates.clone();
    web::block(move || rates.refresh(Utc::now()))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::RateProvider(e.0))?;
    let table = state.rates.current();
    Ok(HttpResponse::Ok().json(RatesResponse {
        rates: table.rates.clone(),
        last_update: table.last_update,
    }))
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

pub async fn list_templates(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.templates.list()?))
}

#[derive(Deserialize)]
pub struct SaveTemplateRequest {
    template_name: String,
    config: Template,
}

pub async fn save_template(
    state: web::Data<AppState>,
    body: web::Json<SaveTemplateRequest>,
) -> Result<HttpResponse, AppError> {
    state.templates.save(&body.template_name, &body.config)?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn get_template(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.templates.load(&path.into_inner())?))
}

pub async fn delete_template(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    state.templates.delete(&path.into_inner())?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn import_templates(
    state: web::Data<AppState>,
    body: web::Json<HashMap<String, Template>>,
) -> Result<HttpResponse, AppError> {
    let count = state.templates.import_all(body.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "imported": count })))
}

pub async fn export_templates(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.templates.export_all()?))
}

pub async fn reset_templates(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    state.templates.reset()?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn download_sample(path: web::Path<String>) -> Result<HttpResponse, AppError> {
    match sample_csv(&path.into_inner()) {
        Some(csv) => Ok(HttpResponse::Ok().content_type("text/csv; charset=utf-8").body(csv)),
        None => Err(AppError::NotFound("örnek şablon".to_string())),
    }
}

// ---------------------------------------------------------------------------
// Multipart helpers
// ---------------------------------------------------------------------------

async fn read_field_bytes(field: &mut actix_multipart::Field) -> Result<Vec<u8>, AppError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::InputFormat(e.to_string()))?;
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_field_text(field: &mut actix_multipart::Field) -> Result<String, AppError> {
    let bytes = read_field_bytes(field).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

struct MultipartFile {
    filename: String,
    bytes: Vec<u8>,
}

/// Drains a multipart body into named text fields and named uploaded files, the way
/// `api-server/src/main.rs` dispatches on `content_disposition().get_name()` per item.
async fn drain_multipart(
    mut payload: Multipart,
) -> Result<(HashMap<String, String>, HashMap<String, Vec<MultipartFile>>), AppError> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut files: HashMap<String, Vec<MultipartFile>> = HashMap::new();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::InputFormat(e.to_string()))?;
        let content_disposition = field.content_disposition().clone();
        let field_name = content_disposition.get_name().unwrap_or("").to_string();
        let filename = content_disposition.get_filename().map(|s| s.to_string());

        match filename {
            Some(filename) => {
                let bytes = read_field_bytes(&mut field).await?;
                files.entry(field_name).or_default().push(MultipartFile { filename, bytes });
            }
            None => {
                let text = read_field_text(&mut field).await?;
                fields.insert(field_name, text);
            }
        }
    }
    Ok((fields, files))
}

fn csv_list(fields: &HashMap<String, String>, key: &str) -> Vec<String> {
    fields
        .get(key)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// calculate_stock
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ConsolidatedViewResponse {
    result_key: String,
    row_count: usize,
}

/// Consolidates one or more internal-depot files into a canonical view and persists it
/// under a fresh key, for later pickup by `process_marketplace`. `template_names` and
/// `labels` are CSV fields parallel to the uploaded `files`, one entry per file.
pub async fn calculate_stock(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let (fields, mut files) = drain_multipart(payload).await?;
    let uploads = files.remove("files").unwrap_or_default();
    if uploads.is_empty() {
        return Err(AppError::Validation("en az bir depo dosyasi gerekli".to_string()));
    }

    let labels = csv_list(&fields, "labels");
    let template_names = csv_list(&fields, "template_names");
    if labels.len() != uploads.len() || template_names.len() != uploads.len() {
        return Err(AppError::Validation(
            "labels ve template_names alanlari dosya sayisi kadar olmali".to_string(),
        ));
    }

    let mut inputs = Vec::with_capacity(uploads.len());
    for ((file, label), template_name) in uploads.into_iter().zip(labels).zip(template_names) {
        let table = read_table(&file.filename, &file.bytes)?;
        let template = state.templates.load(&template_name)?;
        let label = label.chars().next().unwrap_or('+');
        inputs.push(InternalFileInput { table, template, label, filename: file.filename });
    }

    let safety = SafetyReserve {
        threshold: fields.get("security_threshold").and_then(|v| v.parse().ok()),
        amount: fields.get("security_amount").and_then(|v| v.parse().ok()),
    };

    let rows = consolidate_internal(&inputs, safety)?;
    let result_key = state.jobs.save_internal_view(&rows)?;
    Ok(HttpResponse::Ok().json(ConsolidatedViewResponse { result_key, row_count: rows.len() }))
}

// ---------------------------------------------------------------------------
// consolidate_suppliers
// ---------------------------------------------------------------------------

pub async fn consolidate_suppliers(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let (fields, mut files) = drain_multipart(payload).await?;
    let uploads = files.remove("files").unwrap_or_default();
    if uploads.is_empty() {
        return Err(AppError::Validation("en az bir tedarikci dosyasi gerekli".to_string()));
    }

    let template_names = csv_list(&fields, "template_names");
    let currencies_raw = csv_list(&fields, "currencies");
    if template_names.len() != uploads.len() || currencies_raw.len() != uploads.len() {
        return Err(AppError::Validation(
            "template_names ve currencies alanlari dosya sayisi kadar olmali".to_string(),
        ));
    }

    let mut inputs = Vec::with_capacity(uploads.len());
    for ((file, template_name), currency_raw) in uploads.into_iter().zip(template_names).zip(currencies_raw) {
        let table = read_table(&file.filename, &file.bytes)?;
        let template = state.templates.load(&template_name)?;
        let currency = parse_currency(&currency_raw)?;
        inputs.push(SupplierFileInput { table, template, currency, filename: file.filename });
    }

    let rates = state.rates.current();
    let rows = consolidate_supplier(&inputs, &rates)?;
    let result_key = state.jobs.save_supplier_view(&rows)?;
    Ok(HttpResponse::Ok().json(ConsolidatedViewResponse { result_key, row_count: rows.len() }))
}

fn parse_currency(raw: &str) -> Result<Currency, AppError> {
    Currency::parse(raw).ok_or_else(|| AppError::Validation(format!("bilinmeyen doviz: {raw}")))
}

// ---------------------------------------------------------------------------
// process_marketplace
// ---------------------------------------------------------------------------

pub async fn process_marketplace(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let (fields, mut files) = drain_multipart(payload).await?;
    let marketplace_file = files
        .remove("marketplace_file")
        .and_then(|mut v| v.pop())
        .ok_or_else(|| AppError::Validation("marketplace_file gerekli".to_string()))?;

    let template_name = fields
        .get("template_name")
        .ok_or_else(|| AppError::Validation("template_name gerekli".to_string()))?;
    let template = state.templates.load(template_name)?;

    let internal_stock_key = fields
        .get("internal_stock_key")
        .ok_or_else(|| AppError::Validation("internal_stock_key gerekli".to_string()))?
        .clone();
    // Existence is checked synchronously so a bad key surfaces as a 404 here, not only
    // after the background worker has already started.
    let internal_rows = state.jobs.load_internal_view(&internal_stock_key)?;

    let supplier_stock_key = fields.get("supplier_stock_key").cloned();
    let supplier_rows = match &supplier_stock_key {
        Some(key) => state.jobs.load_supplier_view(key)?,
        None => Vec::new(),
    };

    let original_table = read_table(&marketplace_file.filename, &marketplace_file.bytes)?;

    let strategy = BrandExtractionStrategy::parse(
        fields.get("brand_extraction_strategy").map(|s| s.as_str()).unwrap_or("smart"),
    );

    let price_strategy = build_price_strategy(&fields)?;
    let freeze = build_freeze_config(&fields)?;
    let stock_strategy = parse_stock_strategy(fields.get("stock_strategy").map(|s| s.as_str()));
    let orphan_strategy = parse_orphan_strategy(fields.get("orphan_strategy").map(|s| s.as_str()));
    let rules = parse_natural_language_rules(fields.get("price_rules_text").map(|s| s.as_str()).unwrap_or(""));
    let include_original_format = is_truthy(fields.get("include_original_format"));

    let job = state.jobs.create_job()?;
    let job_id = job.job_id.clone();

    let jobs = state.jobs.clone();
    let reports_dir = state.config.reports_dir.clone();
    let rates = state.rates.clone();

    tokio::spawn(async move {
        let job_id2 = job_id.clone();
        let jobs2 = jobs.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_marketplace_job(
                &jobs2,
                &job_id2,
                &reports_dir,
                &rates,
                original_table,
                template,
                strategy,
                internal_rows,
                supplier_rows,
                price_strategy,
                freeze,
                stock_strategy,
                orphan_strategy,
                rules,
                include_original_format,
            )
        })
        .await;

        if let Err(join_err) = result {
            let _ = jobs.fail(&job_id, "İş beklenmedik şekilde durdu", &AppError::Internal(join_err.to_string()));
        }
    });

    Ok(HttpResponse::Accepted().json(job))
}

fn is_truthy(raw: Option<&String>) -> bool {
    matches!(raw.map(|v| v.as_str()), Some("true") | Some("1"))
}

/// `price_source_selection` drives both `source` and `method`: `stock_only` selects the
/// raw marketplace price unmodified; every other value (`calculated`, `internal`,
/// `supplier`, `cost`) defaults `method` to `calculated` — `calculated` itself bases the
/// candidate on the internal ready price, same as `internal` — unless `price_strategy_json`
/// explicitly names a different `method`. `add_vat`/`vat_rate` populate the VAT flag/rate
/// independently of whatever `price_strategy_json` carries for those two fields.
fn build_price_strategy(fields: &HashMap<String, String>) -> Result<PriceStrategy, AppError> {
    let json_strategy: PriceStrategy = match fields.get("price_strategy_json") {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("price_strategy_json gecersiz: {e}")))?,
        _ => PriceStrategy {
            source: PriceSource::StockOnly,
            method: PriceMethod::StockOnly,
            default_multiplier: Decimal::ONE,
            default_addition: Decimal::ZERO,
            vat_enabled: false,
            vat_rate: Decimal::ZERO,
            smart_freeze: false,
        },
    };

    let json_strategy_present = fields.get("price_strategy_json").is_some_and(|v| !v.trim().is_empty());
    let (source, method) = match fields.get("price_source_selection").map(|s| s.as_str()) {
        Some(selection) => {
            let (derived_source, derived_method) = parse_price_source_selection(selection)?;
            let method = if json_strategy_present { json_strategy.method } else { derived_method };
            (derived_source, method)
        }
        None => (json_strategy.source, json_strategy.method),
    };

    let vat_enabled = fields.get("add_vat").map(|_| is_truthy(fields.get("add_vat"))).unwrap_or(json_strategy.vat_enabled);
    let vat_rate = fields
        .get("vat_rate")
        .and_then(|v| Decimal::from_str(v).ok())
        .unwrap_or(json_strategy.vat_rate);
    let smart_freeze = fields.get("smart_freeze").map(|_| is_truthy(fields.get("smart_freeze"))).unwrap_or(json_strategy.smart_freeze);

    Ok(PriceStrategy {
        source,
        method,
        default_multiplier: json_strategy.default_multiplier,
        default_addition: json_strategy.default_addition,
        vat_enabled,
        vat_rate,
        smart_freeze,
    })
}

fn parse_price_source_selection(raw: &str) -> Result<(PriceSource, PriceMethod), AppError> {
    match raw {
        "stock_only" => Ok((PriceSource::StockOnly, PriceMethod::StockOnly)),
        "calculated" => Ok((PriceSource::Internal, PriceMethod::Calculated)),
        "internal" => Ok((PriceSource::Internal, PriceMethod::Calculated)),
        "supplier" => Ok((PriceSource::Supplier, PriceMethod::Calculated)),
        "cost" => Ok((PriceSource::Cost, PriceMethod::Calculated)),
        other => Err(AppError::Validation(format!("bilinmeyen fiyat kaynagi secimi: {other}"))),
    }
}

fn build_freeze_config(fields: &HashMap<String, String>) -> Result<FreezeConfig, AppError> {
    match fields.get("freeze_config_json") {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("freeze_config_json gecersiz: {e}"))),
        _ => Ok(FreezeConfig::default()),
    }
}

fn parse_stock_strategy(raw: Option<&str>) -> StockStrategy {
    match raw {
        Some("internal") => StockStrategy::Internal,
        Some("supplier") => StockStrategy::Supplier,
        _ => StockStrategy::Min,
    }
}

fn parse_orphan_strategy(raw: Option<&str>) -> OrphanStrategy {
    match raw {
        Some("zero") => OrphanStrategy::Zero,
        _ => OrphanStrategy::Keep,
    }
}

#[allow(clippy::too_many_arguments)]
fn run_marketplace_job(
    jobs: &JobStore,
    job_id: &str,
    reports_dir: &std::path::Path,
    rates: &Arc<RateProvider>,
    original_table: RawTable,
    template: Template,
    strategy: BrandExtractionStrategy,
    internal_rows: Vec<crate::models::InternalRow>,
    supplier_rows: Vec<crate::models::SupplierRow>,
    price_strategy: PriceStrategy,
    freeze: FreezeConfig,
    stock_strategy: StockStrategy,
    orphan_strategy: OrphanStrategy,
    rules: Vec<crate::models::Rule>,
    include_original_format: bool,
) -> Result<(), AppError> {
    jobs.advance(job_id, jobs::STAGE_LOADING.0, jobs::STAGE_LOADING.1)?;
    let (marketplace_rows, marketplace_brands) = project_marketplace(&original_table, &template, strategy);

    jobs.advance(job_id, jobs::STAGE_EXACT_MATCH.0, jobs::STAGE_EXACT_MATCH.1)?;
    jobs.advance(job_id, jobs::STAGE_TEXT_MATCH.0, jobs::STAGE_TEXT_MATCH.1)?;
    let mut joined = run_matching(&marketplace_rows, &internal_rows, &supplier_rows, &marketplace_brands);

    jobs.advance(job_id, jobs::STAGE_PRICING.0, jobs::STAGE_PRICING.1)?;
    price_and_stock(
        &mut joined,
        &marketplace_rows,
        &internal_rows,
        &price_strategy,
        &freeze,
        rates.current().as_ref(),
        &rules,
        stock_strategy,
        orphan_strategy,
    );

    jobs.advance(job_id, jobs::STAGE_WRITING.0, jobs::STAGE_WRITING.1)?;
    let options = ReportOptions {
        include_original_format,
        original_marketplace: Some(&original_table),
        marketplace_template: Some(&template),
    };
    let workbook = build_report(&joined, &internal_rows, &supplier_rows, Utc::now(), &options);
    let bytes = write_xlsx(&workbook)?;

    std::fs::create_dir_all(reports_dir)?;
    let filename = format!("{job_id}.xlsx");
    std::fs::write(reports_dir.join(&filename), &bytes)?;

    jobs.complete(job_id, &filename)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn price_and_stock(
    joined: &mut [crate::models::JoinedRow],
    marketplace: &[MarketplaceRow],
    internal: &[crate::models::InternalRow],
    strategy: &PriceStrategy,
    freeze: &FreezeConfig,
    rates: &crate::rates::RateTable,
    rules: &[crate::models::Rule],
    stock_strategy: StockStrategy,
    orphan_strategy: OrphanStrategy,
) {
    let internal_by_code: HashMap<&str, &crate::models::InternalRow> =
        internal.iter().map(|r| (r.anahtar_kod.as_str(), r)).collect();
    let marketplace_by_idx: HashMap<usize, &MarketplaceRow> =
        marketplace.iter().map(|r| (r.idx, r)).collect();

    for row in joined.iter_mut() {
        let internal_row = internal_by_code.get(row.kaynak_kod.as_str()).copied();
        let mp_row = marketplace_by_idx.get(&row.idx).copied();

        // Supplier attributes come from the row itself: `matching::enrich_with_supplier`
        // already joined on `match_code`, not `kaynak_kod`/`anahtar_kod`.
        let internal_price = internal_row.map(|r| r.ic_hazir_fiyat).unwrap_or_default();
        let supplier_price = row.ted_hazir_fiyat;
        let cost = row.maliyet;
        let curr = mp_row.map(|r| r.mp_fiyat).unwrap_or_default();
        let barcode = mp_row.map(|r| r.mp_barkod.as_str()).unwrap_or_default();

        let input = PricingInput {
            sku: row.mp_sku.as_str(),
            barcode,
            brand: row.nihai_marka.as_str(),
            product_name: row.mp_urun_adi.as_str(),
            curr,
            internal_price,
            supplier_price,
            cost,
        };
        let (price, status) = price_row(&input, strategy, freeze, rates, rules);
        row.satis_fiyati = price;
        row.fiyat_durumu = status;

        let internal_stock = internal_row.map(|r| r.nihai_stok).unwrap_or(0);
        let supplier_stock = row.toplam_tedarikci_stok;
        row.gonderilecek_stok = select_stock(stock_strategy, orphan_strategy, internal_stock, supplier_stock, &row.eslestirme);
    }
}

// ---------------------------------------------------------------------------
// jobs / download
// ---------------------------------------------------------------------------

pub async fn get_job(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
    let status: JobStatus = state.jobs.read_job(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(status))
}

pub async fn download_result(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
    let job_id = path.into_inner();
    let status = state.jobs.read_job(&job_id)?;
    let result_file = status
        .result_file
        .ok_or_else(|| AppError::NotFound(format!("is henuz tamamlanmadi: {job_id}")))?;
    let bytes = std::fs::read(state.config.reports_dir.join(&result_file))?;
    Ok(HttpResponse::Ok()
        .content_type("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        .append_header((
            "Content-Disposition",
            format!("attachment; filename=\"{result_file}\""),
        ))
        .body(bytes))
}

// ---------------------------------------------------------------------------
// simulate_nlp
// ---------------------------------------------------------------------------

/// Sample rows are passed as a JSON field (`sample_rows`) alongside `price_rules_text`;
/// this is the independent, simplified preview path — it calls
/// `rules::preview_pricing_rules`, never `pricing::price_row`, so its case-sensitivity and
/// VAT/freeze behavior deliberately diverge from the real `process_marketplace` job path.
#[derive(Deserialize)]
struct SimulateNlpRow {
    sku: String,
    #[serde(default)]
    barcode: String,
    product_name: String,
    #[serde(default)]
    brand: String,
    #[serde(default)]
    stock: i64,
    price: Decimal,
}

pub async fn simulate_nlp(payload: Multipart) -> Result<HttpResponse, AppError> {
    let (fields, _) = drain_multipart(payload).await?;
    let rules_text = fields.get("price_rules_text").cloned().unwrap_or_default();
    let sample_rows: Vec<SimulateNlpRow> = match fields.get("sample_rows") {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("sample_rows gecersiz: {e}")))?,
        None => Vec::new(),
    };

    let rules = parse_natural_language_rules(&rules_text);
    let rows: Vec<(MarketplaceRow, String)> = sample_rows
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            let brand = if r.brand.is_empty() { "TANIMSIZ".to_string() } else { r.brand.to_uppercase() };
            (
                MarketplaceRow {
                    idx,
                    mp_barkod: r.barcode.clone(),
                    mp_sku: r.sku.clone(),
                    mp_urun_adi: r.product_name.clone(),
                    mp_eski_stok: r.stock,
                    mp_fiyat: r.price,
                    mp_marka: brand.clone(),
                    bk_norm: String::new(),
                    sku_norm: String::new(),
                },
                brand,
            )
        })
        .collect();

    let preview = preview_pricing_rules(&rows, &rules);
    Ok(HttpResponse::Ok().json(preview))
}
