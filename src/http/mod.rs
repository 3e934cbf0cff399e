//! Actix-web surface: `AppState`, the `AppError -> HTTP status` mapping, and the route
//! table. Handler bodies live in `handlers.rs`; this module wires them together the way
//! `api-server/src/main.rs` wires its own license/cloud endpoints.

mod handlers;

use crate::config::Config;
use crate::error::AppError;
use crate::jobs::JobStore;
use crate::rates::RateProvider;
use crate::templates::TemplateStore;
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer, ResponseError};
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub templates: TemplateStore,
    pub jobs: Arc<JobStore>,
    pub rates: Arc<RateProvider>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::InputFormat(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::TemplateNotFound(_) | AppError::NotFound(_) | AppError::JobNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::RateProvider(_)
            | AppError::Report(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Csv(_)
            | AppError::Http(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

/// Builds the actix `App` factory closure, grounded on `api-server/src/main.rs`'s
/// `HttpServer::new(move || ...)` shape: CORS wide open (this is an internal tool, not a
/// public API), request logging, one route per external-interface entry in SPEC_FULL §6.
pub fn run(state: web::Data<AppState>, bind_addr: &str, port: u16) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(state.config.max_upload_bytes))
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .route("/exchange-rates", web::get().to(handlers::get_exchange_rates))
            .route("/exchange-rates/refresh", web::post().to(handlers::refresh_exchange_rates))
            .route("/templates", web::get().to(handlers::list_templates))
            .route("/templates", web::post().to(handlers::save_template))
            .route("/templates/{name}", web::get().to(handlers::get_template))
            .route("/templates/{name}", web::delete().to(handlers::delete_template))
            .route("/templates/import_all", web::post().to(handlers::import_templates))
            .route("/templates/export_all", web::get().to(handlers::export_templates))
            .route("/templates/reset", web::post().to(handlers::reset_templates))
            .route("/templates/download_sample/{kind}", web::get().to(handlers::download_sample))
            .route("/calculate_stock", web::post().to(handlers::calculate_stock))
            .route("/consolidate_suppliers", web::post().to(handlers::consolidate_suppliers))
            .route("/process_marketplace", web::post().to(handlers::process_marketplace))
            .route("/jobs/{id}", web::get().to(handlers::get_job))
            .route("/download/{id}", web::get().to(handlers::download_result))
            .route("/simulate_nlp", web::post().to(handlers::simulate_nlp))
    })
    .bind((bind_addr, port))?
    .run();
    Ok(server)
}
