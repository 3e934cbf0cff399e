//! Template registry: a persisted mapping from logical field names to the column
//! headers of one specific input file, stored as one JSON file per template name.

use crate::error::AppError;
use crate::models::Template;
use std::path::{Path, PathBuf};

pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_name(name)))
    }

    pub fn save(&self, name: &str, template: &Template) -> Result<(), AppError> {
        std::fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_vec_pretty(template)?;
        write_atomic(&self.path_for(name), &body)
    }

    pub fn load(&self, name: &str) -> Result<Template, AppError> {
        let path = self.path_for(name);
        let body = std::fs::read(&path)
            .map_err(|_| AppError::TemplateNotFound(name.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub fn delete(&self, name: &str) -> Result<(), AppError> {
        std::fs::remove_file(self.path_for(name))
            .map_err(|_| AppError::TemplateNotFound(name.to_string()))
    }

    pub fn list(&self) -> Result<Vec<String>, AppError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn export_all(&self) -> Result<std::collections::HashMap<String, Template>, AppError> {
        let mut out = std::collections::HashMap::new();
        for name in self.list()? {
            out.insert(name.clone(), self.load(&name)?);
        }
        Ok(out)
    }

    pub fn import_all(
        &self,
        templates: std::collections::HashMap<String, Template>,
    ) -> Result<usize, AppError> {
        let count = templates.len();
        for (name, template) in templates {
            self.save(&name, &template)?;
        }
        Ok(count)
    }

    pub fn reset(&self) -> Result<(), AppError> {
        for name in self.list()? {
            let _ = self.delete(&name);
        }
        Ok(())
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Starter CSV for a new user's first template upload, for
/// `GET /templates/download_sample/{kind}`.
pub fn sample_csv(kind: &str) -> Option<&'static str> {
    match kind {
        "internal" => Some("sku;barcode;stock;selling_price;brand;product_name\n"),
        "supplier" => Some("sku;barcode;stock;cost;currency;brand;product_name\n"),
        "marketplace" => Some("sku;barcode;product_name;stock;price;brand\n"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());
        let mut tpl = HashMap::new();
        tpl.insert("sku".to_string(), "SKU Kodu".to_string());
        store.save("depo-a", &tpl).unwrap();
        let loaded = store.load("depo-a").unwrap();
        assert_eq!(loaded.get("sku"), Some(&"SKU Kodu".to_string()));
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());
        assert!(matches!(store.load("yok"), Err(AppError::TemplateNotFound(_))));
    }

    #[test]
    fn list_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());
        store.save("a", &HashMap::new()).unwrap();
        store.save("b", &HashMap::new()).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
        store.reset().unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
