//! `JobStore`: whole-file-replace JSON persistence for job status documents and
//! consolidated-view keys, plus the `process_marketplace` worker shape.

use crate::error::AppError;
use crate::models::{InternalRow, JobState, JobStatus, SupplierRow};
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct JobStore {
    jobs_dir: PathBuf,
    consolidated_dir: PathBuf,
}

impl JobStore {
    pub fn new(jobs_dir: PathBuf, consolidated_dir: PathBuf) -> Self {
        Self { jobs_dir, consolidated_dir }
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{job_id}.json"))
    }

    fn consolidated_path(&self, key: &str) -> PathBuf {
        self.consolidated_dir.join(format!("{key}.json"))
    }

    pub fn create_job(&self) -> Result<JobStatus, AppError> {
        std::fs::create_dir_all(&self.jobs_dir)?;
        let now = Utc::now();
        let status = JobStatus {
            job_id: Uuid::new_v4().to_string(),
            status: JobState::Pending,
            progress: 0,
            message: "Kuyrukta bekliyor...".to_string(),
            result_file: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.write_job(&status)?;
        Ok(status)
    }

    pub fn write_job(&self, status: &JobStatus) -> Result<(), AppError> {
        std::fs::create_dir_all(&self.jobs_dir)?;
        let body = serde_json::to_vec_pretty(status)?;
        write_atomic(&self.job_path(&status.job_id), &body)
    }

    pub fn read_job(&self, job_id: &str) -> Result<JobStatus, AppError> {
        let body = std::fs::read(self.job_path(job_id))
            .map_err(|_| AppError::JobNotFound(job_id.to_string()))?;
        serde_json::from_slice(&body).map_err(|_| AppError::JobNotFound(job_id.to_string()))
    }

    pub fn advance(&self, job_id: &str, progress: u8, message: &str) -> Result<(), AppError> {
        let mut status = self.read_job(job_id)?;
        status.status = JobState::Processing;
        status.progress = progress;
        status.message = message.to_string();
        status.updated_at = Utc::now();
        self.write_job(&status)
    }

    pub fn complete(&self, job_id: &str, result_file: &str) -> Result<(), AppError> {
        let mut status = self.read_job(job_id)?;
        status.status = JobState::Completed;
        status.progress = 100;
        status.message = "Tamamlandı".to_string();
        status.result_file = Some(result_file.to_string());
        status.updated_at = Utc::now();
        self.write_job(&status)
    }

    pub fn fail(&self, job_id: &str, summary: &str, error: &AppError) -> Result<(), AppError> {
        let mut status = self.read_job(job_id)?;
        status.status = JobState::Error;
        status.message = summary.to_string();
        status.error = Some(error.to_string());
        status.updated_at = Utc::now();
        self.write_job(&status)
    }

    pub fn save_internal_view(&self, rows: &[InternalRow]) -> Result<String, AppError> {
        self.save_view(rows)
    }

    pub fn save_supplier_view(&self, rows: &[SupplierRow]) -> Result<String, AppError> {
        self.save_view(rows)
    }

    fn save_view<T: serde::Serialize>(&self, rows: &[T]) -> Result<String, AppError> {
        std::fs::create_dir_all(&self.consolidated_dir)?;
        let key = Uuid::new_v4().to_string();
        let body = serde_json::to_vec(rows)?;
        write_atomic(&self.consolidated_path(&key), &body)?;
        Ok(key)
    }

    pub fn load_internal_view(&self, key: &str) -> Result<Vec<InternalRow>, AppError> {
        self.load_view(key)
    }

    pub fn load_supplier_view(&self, key: &str) -> Result<Vec<SupplierRow>, AppError> {
        self.load_view(key)
    }

    fn load_view<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, AppError> {
        let body = std::fs::read(self.consolidated_path(key))
            .map_err(|_| AppError::NotFound(format!("consolidated view {key}")))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Progress stages the `process_marketplace` worker advances through, in order.
pub const STAGE_LOADING: (u8, &str) = (5, "Dosyalar yükleniyor...");
pub const STAGE_EXACT_MATCH: (u8, &str) = (15, "Barkod/SKU eşleştirmesi yapılıyor...");
pub const STAGE_TEXT_MATCH: (u8, &str) = (40, "Metin benzerliği analiz ediliyor...");
pub const STAGE_PRICING: (u8, &str) = (60, "Fiyatlandırma hesaplanıyor...");
pub const STAGE_WRITING: (u8, &str) = (95, "Rapor yazılıyor...");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_read_job_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().join("jobs"), dir.path().join("consolidated"));
        let job = store.create_job().unwrap();
        let reloaded = store.read_job(&job.job_id).unwrap();
        assert_eq!(reloaded.status, JobState::Pending);
    }

    #[test]
    fn advance_and_complete_update_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().join("jobs"), dir.path().join("consolidated"));
        let job = store.create_job().unwrap();
        store.advance(&job.job_id, STAGE_LOADING.0, STAGE_LOADING.1).unwrap();
        store.complete(&job.job_id, "reports/out.xlsx").unwrap();
        let reloaded = store.read_job(&job.job_id).unwrap();
        assert_eq!(reloaded.status, JobState::Completed);
        assert_eq!(reloaded.progress, 100);
        assert_eq!(reloaded.result_file.as_deref(), Some("reports/out.xlsx"));
    }

    #[test]
    fn consolidated_view_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().join("jobs"), dir.path().join("consolidated"));
        let rows = vec![InternalRow {
            anahtar_kod: "A-1".to_string(),
            barkod: "869".to_string(),
            match_code: "1".to_string(),
            hesaplanan_stok: 5,
            nihai_stok: 5,
            marka: "BOSCH".to_string(),
            ic_urun_adi: "Matkap".to_string(),
            ic_hazir_fiyat: rust_decimal::Decimal::ZERO,
        }];
        let key = store.save_internal_view(&rows).unwrap();
        let loaded = store.load_internal_view(&key).unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn missing_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().join("jobs"), dir.path().join("consolidated"));
        assert!(matches!(store.read_job("nope"), Err(AppError::JobNotFound(_))));
    }
}
