use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DocumentCategory {
    Procedures,
    Hms,
    Protocols,
    Policies,
    Forms,
    Reports,
    Other,
}

/// The `documents/{id}` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: DocumentCategory,
    #[serde(rename = "fileURL")]
    pub file_url: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub version: String,
    pub uploaded_by: String,
    pub uploaded_by_name: String,
    pub company_id: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub download_count: u64,
    pub is_active: bool,
}

impl Document {
    /// Blob path of the stored file, relative to the blob store root.
    pub fn blob_path(company_id: &str, document_id: &str, file_type: &str) -> String {
        format!("companies/{}/documents/{}.{}", company_id, document_id, file_type)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub category: DocumentCategory,
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    /// File content, standard base64.
    pub content_base64: String,
    pub department: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

/// Lower-cased extension of `file_name`, if it has one.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
