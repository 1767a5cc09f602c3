use crate::error::app_error::StorageError;
use crate::models::company::CompanySettings;
use crate::models::document::file_extension;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

/// Binary object storage for uploaded files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `path` and returns a URL the file can be fetched from.
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<String, StorageError>;

    /// Removes the blob at `path`. Missing blobs are not an error.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Validates a relative blob path and returns it with redundant slashes removed.
pub fn normalize_blob_path(path: &str) -> Result<String, StorageError> {
    if path.starts_with('/') || path.contains('\\') {
        return Err(StorageError::InvalidPath(path.to_string()));
    }

    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    if segments.is_empty() || segments.iter().any(|segment| *segment == "." || *segment == ".." || segment.contains('\0')) {
        return Err(StorageError::InvalidPath(path.to_string()));
    }

    Ok(segments.join("/"))
}

/// Blob store writing under a local directory.
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn public_url(&self, normalized: &str) -> String {
        let encoded: Vec<String> = normalized.split('/').map(|segment| urlencoding::encode(segment).into_owned()).collect();
        format!("{}/{}", self.public_base_url, encoded.join("/"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<String, StorageError> {
        let normalized = normalize_blob_path(path)?;
        let target = self.root.join(&normalized);
        let upload_error = |source| StorageError::Upload {
            path: normalized.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(upload_error)?;
        }
        tokio::fs::write(&target, bytes).await.map_err(upload_error)?;

        info!(path = %normalized, size = bytes.len(), "blob uploaded");
        Ok(self.public_url(&normalized))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let normalized = normalize_blob_path(path)?;
        match tokio::fs::remove_file(self.root.join(&normalized)).await {
            Ok(()) => {
                info!(path = %normalized, "blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %normalized, "blob already absent");
                Ok(())
            }
            Err(source) => Err(StorageError::Delete { path: normalized, source }),
        }
    }
}

/// Size and type limits a company puts on uploads.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_file_types: Vec<String>,
}

impl From<&CompanySettings> for UploadPolicy {
    fn from(settings: &CompanySettings) -> Self {
        Self {
            max_bytes: u64::from(settings.max_file_size_mb) * 1024 * 1024,
            allowed_file_types: settings.allowed_file_types.iter().map(|t| t.to_lowercase()).collect(),
        }
    }
}

impl UploadPolicy {
    /// Checks a file against the policy and returns its lower-cased extension.
    pub fn check(&self, file_name: &str, size: u64) -> Result<String, StorageError> {
        let extension = file_extension(file_name).ok_or_else(|| StorageError::FileTypeNotAllowed(file_name.to_string()))?;
        if !self.allowed_file_types.contains(&extension) {
            return Err(StorageError::FileTypeNotAllowed(extension));
        }
        if size > self.max_bytes {
            return Err(StorageError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_escaping_paths() {
        for path in ["../etc/passwd", "a/../../b", "/abs/path", "a\\b", "", "///", "a/./b"] {
            assert!(normalize_blob_path(path).is_err(), "{path} should be rejected");
        }
    }

    #[test]
    fn collapses_duplicate_slashes() {
        assert_eq!(normalize_blob_path("companies//c1/documents/d1.pdf/").unwrap(), "companies/c1/documents/d1.pdf");
    }

    proptest! {
        #[test]
        fn safe_segments_survive_normalization(segments in prop::collection::vec("[a-zA-Z0-9_-][a-zA-Z0-9_.-]{0,11}", 1..6)) {
            let path = segments.join("/");
            let normalized = normalize_blob_path(&path);
            let all_safe = segments.iter().all(|s| s != "." && s != "..");
            prop_assert_eq!(normalized.is_ok(), all_safe);
            if all_safe {
                prop_assert_eq!(normalized.unwrap(), path);
            }
        }

        #[test]
        fn parent_segment_is_always_rejected(prefix in "[a-z]{1,8}", suffix in "[a-z]{1,8}") {
            let path = format!("{}/../{}", prefix, suffix);
            prop_assert!(normalize_blob_path(&path).is_err());
        }
    }

    #[tokio::test]
    async fn upload_writes_file_and_returns_encoded_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "https://files.example.com/");

        let url = store.upload(b"hello", "companies/c1/HMS rutine.pdf").await.unwrap();
        assert_eq!(url, "https://files.example.com/companies/c1/HMS%20rutine.pdf");

        let written = tokio::fs::read(dir.path().join("companies/c1/HMS rutine.pdf")).await.unwrap();
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "https://files.example.com");
        store.upload(b"x", "a/b.png").await.unwrap();

        store.delete("a/b.png").await.unwrap();
        store.delete("a/b.png").await.unwrap();
        assert!(!dir.path().join("a/b.png").exists());
    }

    #[test]
    fn policy_enforces_type_then_size() {
        let policy = UploadPolicy::from(&CompanySettings {
            max_file_size_mb: 1,
            ..CompanySettings::default()
        });

        assert_eq!(policy.check("Plan.PDF", 1024).unwrap(), "pdf");
        assert!(matches!(policy.check("virus.exe", 10), Err(StorageError::FileTypeNotAllowed(ext)) if ext == "exe"));
        assert!(matches!(policy.check("noext", 10), Err(StorageError::FileTypeNotAllowed(_))));
        assert!(matches!(policy.check("big.mp4", 2 * 1024 * 1024), Err(StorageError::TooLarge { .. })));
    }
}
