use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use uuid::Uuid;

use crate::error::{Error, Result};

pub const MAX_RESUME_BYTES: usize = 5 * 1024 * 1024;
const RESUME_SUBDIR: &str = "resumes";

/// Only PDFs are accepted: the name must end in `.pdf` and the content must
/// carry the PDF magic bytes.
pub fn validate_resume(file_name: &str, data: &[u8]) -> Result<()> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    if ext.as_deref() != Some("pdf") {
        return Err(Error::field("resume", "Resume must be a PDF file"));
    }
    if data.is_empty() {
        return Err(Error::field("resume", "Resume file is empty"));
    }
    if data.len() > MAX_RESUME_BYTES {
        return Err(Error::field("resume", "Resume must be at most 5 MB"));
    }
    if !data.starts_with(b"%PDF") {
        return Err(Error::field("resume", "Invalid PDF file content"));
    }
    Ok(())
}

/// Resumes on local disk under `UPLOADS_DIR/resumes`, served back at `/uploads`.
#[derive(Clone, Debug)]
pub struct ResumeStore {
    root: PathBuf,
    public_base_url: String,
}

impl ResumeStore {
    pub fn new(uploads_dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: uploads_dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self, stored_name: &str) -> String {
        format!("{}/uploads/{}/{}", self.public_base_url, RESUME_SUBDIR, stored_name)
    }

    /// Writes an already validated resume and returns its public URL. Any
    /// storage failure is reported as the store being unavailable.
    pub async fn save(&self, data: &Bytes) -> Result<String> {
        let dir = self.root.join(RESUME_SUBDIR);
        fs::create_dir_all(&dir).await.map_err(|e| {
            tracing::error!(error = %e, dir = %dir.display(), "Failed to create resume directory");
            Error::ServiceUnavailable("Resume storage is unavailable".into())
        })?;

        let stored_name = format!("{}.pdf", Uuid::new_v4());
        let path = dir.join(&stored_name);
        fs::write(&path, data).await.map_err(|e| {
            tracing::error!(error = %e, path = %path.display(), "Failed to write resume");
            Error::ServiceUnavailable("Resume storage is unavailable".into())
        })?;

        tracing::debug!(path = %path.display(), bytes = data.len(), "Resume stored");
        Ok(self.public_url(&stored_name))
    }
}
