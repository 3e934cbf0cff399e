use serde::Serialize;
use thiserror::Error;

/// Single closed error type for the whole service. Every variant maps to a specific
/// HTTP status in `http::respond` and otherwise stays a plain display string, following
/// the same shape as the rest of the error handling in this codebase.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Dosya okunamadi: {0}")]
    InputFormat(String),

    #[error("Sablon bulunamadi: {0}")]
    TemplateNotFound(String),

    #[error("Bulunamadi: {0}")]
    NotFound(String),

    #[error("Dogrulama hatasi: {0}")]
    Validation(String),

    #[error("Kur saglayici hatasi: {0}")]
    RateProvider(String),

    #[error("Is bulunamadi: {0}")]
    JobNotFound(String),

    #[error("Rapor yazma hatasi: {0}")]
    Report(String),

    #[error("IO hatasi: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON hatasi: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV hatasi: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP istemci hatasi: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Dahili hata: {0}")]
    Internal(String),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        AppError::Report(err.to_string())
    }
}
