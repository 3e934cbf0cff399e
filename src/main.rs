mod brands;
mod config;
mod consolidate;
mod error;
mod http;
mod jobs;
mod marketplace;
mod matching;
mod models;
mod normalize;
mod pricing;
mod rates;
mod report;
mod rules;
mod tables;
mod templates;

use actix_web::web;
use chrono::Utc;
use config::Config;
use http::AppState;
use jobs::JobStore;
use rates::{RateProvider, TcmbRateSource};
use std::sync::Arc;
use templates::TemplateStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env();
    config.ensure_dirs()?;

    let source = Box::new(TcmbRateSource {
        url: config.rate_feed_url.clone(),
        timeout_secs: config.rate_feed_timeout_secs,
    });
    let rates = Arc::new(RateProvider::new(source, Utc::now()));
    if let Err(e) = rates.refresh(Utc::now()) {
        log::warn!("baslangic kur guncellemesi basarisiz, yedek degerlerle devam ediliyor: {e}");
    }

    let state = web::Data::new(AppState {
        templates: TemplateStore::new(config.templates_dir.clone()),
        jobs: Arc::new(JobStore::new(config.jobs_dir.clone(), config.consolidated_dir.clone())),
        rates,
        config: config.clone(),
    });

    log::info!("katalog-mutabakat {}:{} adresinde baslatiliyor", config.bind_addr, config.port);
    http::run(state, &config.bind_addr, config.port)?.await
}
