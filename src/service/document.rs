use crate::database::record_store::{RecordLocks, RecordStore, collections, fetch_record, list_records, put_record};
use crate::error::app_error::AppError;
use crate::models::company::CompanyProfile;
use crate::models::document::{Document, DocumentCategory, DocumentUploadRequest};
use crate::models::user::UserProfile;
use crate::service::blob::{BlobStore, UploadPolicy};
use crate::service::service_util::{can_manage, decode_upload, require_feature};
use crate::service::session::SessionSynchronizer;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

const INITIAL_VERSION: &str = "1.0";

pub struct DocumentService<'a> {
    records: &'a dyn RecordStore,
    blobs: &'a dyn BlobStore,
    locks: &'a RecordLocks,
    session: &'a SessionSynchronizer,
}

impl<'a> DocumentService<'a> {
    pub fn new(records: &'a dyn RecordStore, blobs: &'a dyn BlobStore, locks: &'a RecordLocks, session: &'a SessionSynchronizer) -> Self {
        DocumentService {
            records,
            blobs,
            locks,
            session,
        }
    }

    fn member(&self) -> Result<(UserProfile, CompanyProfile), AppError> {
        let (user, company) = self.session.authenticated_member()?;
        require_feature(company.settings.enable_document_archive, "Document archive")?;
        Ok((user, company))
    }

    async fn load(&self, id: &str, company: &CompanyProfile) -> Result<Document, AppError> {
        let document: Document = fetch_record(self.records, collections::DOCUMENTS, id).await?;
        if document.company_id != company.id || !document.is_active {
            return Err(AppError::NotFound(format!("Document {}", id)));
        }
        Ok(document)
    }

    /// Checks the file against the company's upload policy, stores it in the
    /// blob store and records it in the archive.
    pub async fn upload(&self, request: &DocumentUploadRequest) -> Result<Document, AppError> {
        request.validate()?;
        let (user, company) = self.member()?;

        let bytes = decode_upload(&request.content_base64)?;
        let file_type = UploadPolicy::from(&company.settings).check(&request.file_name, bytes.len() as u64)?;

        let id = Uuid::new_v4().to_string();
        let path = Document::blob_path(&company.id, &id, &file_type);
        let file_url = self.blobs.upload(&bytes, &path).await?;

        let now = Utc::now();
        let document = Document {
            id,
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            category: request.category,
            file_url,
            file_name: request.file_name.clone(),
            file_size: bytes.len() as u64,
            file_type,
            version: INITIAL_VERSION.to_string(),
            uploaded_by: user.id.clone(),
            uploaded_by_name: user.full_name(),
            company_id: company.id.clone(),
            department: request.department.clone().or_else(|| user.department.clone()),
            tags: request.tags.clone(),
            is_public: request.is_public,
            created_at: now,
            updated_at: now,
            download_count: 0,
            is_active: true,
        };

        if let Err(e) = put_record(self.records, collections::DOCUMENTS, &document.id, &document).await {
            if let Err(cleanup) = self.blobs.delete(&path).await {
                warn!(path = %path, error = %cleanup, "failed to remove orphaned blob");
            }
            return Err(e.into());
        }

        info!(
            document_id = %document.id,
            company_id = %company.id,
            size = document.file_size,
            "document uploaded"
        );
        Ok(document)
    }

    /// Active documents of the session's company, newest first. Private
    /// documents are only listed for their uploader and administrators.
    pub async fn list_for_company(&self, category: Option<DocumentCategory>) -> Result<Vec<Document>, AppError> {
        let (user, company) = self.member()?;
        let documents: Vec<Document> = list_records(self.records, collections::DOCUMENTS).await?;
        let mut documents: Vec<Document> = documents
            .into_iter()
            .filter(|d| d.company_id == company.id && d.is_active)
            .filter(|d| category.is_none_or(|c| d.category == c))
            .filter(|d| d.is_public || can_manage(&user, &d.uploaded_by))
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    /// A document the session user may see. Private documents of others are not found.
    pub async fn get(&self, id: &str) -> Result<Document, AppError> {
        let (user, company) = self.member()?;
        self.load_visible(id, &user, &company).await
    }

    async fn load_visible(&self, id: &str, user: &UserProfile, company: &CompanyProfile) -> Result<Document, AppError> {
        let document = self.load(id, company).await?;
        if !document.is_public && !can_manage(user, &document.uploaded_by) {
            return Err(AppError::NotFound(format!("Document {}", id)));
        }
        Ok(document)
    }

    pub async fn record_download(&self, id: &str) -> Result<Document, AppError> {
        let (user, company) = self.member()?;
        let _guard = self.locks.lock(collections::DOCUMENTS, id).await;
        let mut document = self.load_visible(id, &user, &company).await?;

        document.download_count += 1;
        put_record(self.records, collections::DOCUMENTS, &document.id, &document).await?;
        Ok(document)
    }

    /// Removes the file and its record. Only the uploader or an administrator may delete.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let (user, company) = self.member()?;
        let _guard = self.locks.lock(collections::DOCUMENTS, id).await;
        let document = self.load(id, &company).await?;
        if !can_manage(&user, &document.uploaded_by) {
            return Err(AppError::Forbidden("Only the uploader or an administrator can delete a document".to_string()));
        }

        self.blobs
            .delete(&Document::blob_path(&company.id, &document.id, &document.file_type))
            .await?;
        self.records.delete(collections::DOCUMENTS, &document.id).await?;

        info!(document_id = %document.id, deleted_by = %user.id, "document deleted");
        Ok(())
    }
}
