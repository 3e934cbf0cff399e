use std::path::PathBuf;

/// Process configuration, read from the environment with the same
/// `env::var(...).unwrap_or_else(...)` convention the mock api-server used for its port.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub consolidated_dir: PathBuf,
    pub jobs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub rate_feed_url: String,
    pub rate_feed_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir: PathBuf = std::env::var("DATA_DIR")
            .unwrap_or_else(|_| "./data".to_string())
            .into();

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            templates_dir: data_dir.join("templates"),
            consolidated_dir: data_dir.join("consolidated"),
            jobs_dir: data_dir.join("jobs"),
            reports_dir: data_dir.join("reports"),
            data_dir,
            rate_feed_url: std::env::var("RATE_FEED_URL").unwrap_or_else(|_| {
                "https://www.tcmb.gov.tr/kurlar/today.xml".to_string()
            }),
            rate_feed_timeout_secs: std::env::var("RATE_FEED_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50 * 1024 * 1024),
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.templates_dir,
            &self.consolidated_dir,
            &self.jobs_dir,
            &self.reports_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
