use crate::database::record_store::{RecordLocks, RecordStore, collections, fetch_record, list_records, put_record};
use crate::error::app_error::AppError;
use crate::models::company::CompanyProfile;
use crate::models::deviation::{
    Deviation, DeviationComment, DeviationCommentRequest, DeviationRequest, DeviationStatus, DeviationStatusRequest,
};
use crate::models::user::UserProfile;
use crate::service::blob::{BlobStore, UploadPolicy};
use crate::service::service_util::{can_manage, require_feature};
use crate::service::session::SessionSynchronizer;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Deviation reporting for the signed-in user's company.
pub struct DeviationService<'a> {
    records: &'a dyn RecordStore,
    blobs: &'a dyn BlobStore,
    locks: &'a RecordLocks,
    session: &'a SessionSynchronizer,
}

impl<'a> DeviationService<'a> {
    pub fn new(records: &'a dyn RecordStore, blobs: &'a dyn BlobStore, locks: &'a RecordLocks, session: &'a SessionSynchronizer) -> Self {
        DeviationService {
            records,
            blobs,
            locks,
            session,
        }
    }

    fn member(&self) -> Result<(UserProfile, CompanyProfile), AppError> {
        let (user, company) = self.session.authenticated_member()?;
        require_feature(company.settings.enable_deviation_reporting, "Deviation reporting")?;
        Ok((user, company))
    }

    /// Loads a deviation, hiding those of other companies.
    async fn load(&self, id: &str, company: &CompanyProfile) -> Result<Deviation, AppError> {
        let deviation: Deviation = fetch_record(self.records, collections::DEVIATIONS, id).await?;
        if deviation.company_id != company.id {
            return Err(AppError::NotFound(format!("Deviation {}", id)));
        }
        Ok(deviation)
    }

    pub async fn report(&self, request: &DeviationRequest) -> Result<Deviation, AppError> {
        request.validate()?;
        let (user, company) = self.member()?;

        let now = Utc::now();
        let deviation = Deviation {
            id: Uuid::new_v4().to_string(),
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            category: request.category,
            severity: request.severity,
            status: DeviationStatus::Reported,
            reported_by: user.id.clone(),
            assigned_to: None,
            company_id: company.id.clone(),
            location: request.location.clone(),
            media_urls: Vec::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
            comments: Vec::new(),
            tags: request.tags.clone(),
        };
        put_record(self.records, collections::DEVIATIONS, &deviation.id, &deviation).await?;

        info!(
            deviation_id = %deviation.id,
            company_id = %company.id,
            severity = ?deviation.severity,
            "deviation reported"
        );
        Ok(deviation)
    }

    pub async fn get(&self, id: &str) -> Result<Deviation, AppError> {
        let (_, company) = self.member()?;
        self.load(id, &company).await
    }

    /// All deviations of the session's company, newest first.
    pub async fn list_for_company(&self) -> Result<Vec<Deviation>, AppError> {
        let (_, company) = self.member()?;
        let deviations: Vec<Deviation> = list_records(self.records, collections::DEVIATIONS).await?;
        let mut deviations: Vec<Deviation> = deviations.into_iter().filter(|d| d.company_id == company.id).collect();
        deviations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deviations)
    }

    pub async fn update_status(&self, id: &str, request: &DeviationStatusRequest) -> Result<Deviation, AppError> {
        let (user, company) = self.member()?;
        if !user.role.is_admin() {
            return Err(AppError::Forbidden("Only administrators can change deviation status".to_string()));
        }

        let _guard = self.locks.lock(collections::DEVIATIONS, id).await;
        let mut deviation = self.load(id, &company).await?;
        let previous = deviation.status;
        deviation.transition(request.status, Utc::now());
        if request.assigned_to.is_some() {
            deviation.assigned_to = request.assigned_to.clone();
        }
        put_record(self.records, collections::DEVIATIONS, &deviation.id, &deviation).await?;

        info!(
            deviation_id = %deviation.id,
            from = ?previous,
            to = ?deviation.status,
            changed_by = %user.id,
            "deviation status changed"
        );
        Ok(deviation)
    }

    pub async fn add_comment(&self, id: &str, request: &DeviationCommentRequest) -> Result<Deviation, AppError> {
        request.validate()?;
        let (user, company) = self.member()?;
        let _guard = self.locks.lock(collections::DEVIATIONS, id).await;
        let mut deviation = self.load(id, &company).await?;
        if !can_manage(&user, &deviation.reported_by) {
            return Err(AppError::Forbidden("Only the reporter or an administrator can comment".to_string()));
        }

        let now = Utc::now();
        deviation.comments.push(DeviationComment {
            id: Uuid::new_v4().to_string(),
            text: request.text.trim().to_string(),
            author_id: user.id.clone(),
            author_name: user.full_name(),
            created_at: now,
            media_urls: Vec::new(),
        });
        deviation.updated_at = now;
        put_record(self.records, collections::DEVIATIONS, &deviation.id, &deviation).await?;
        Ok(deviation)
    }

    /// Uploads a photo or video and links it to the deviation.
    pub async fn attach_media(&self, id: &str, file_name: &str, bytes: &[u8]) -> Result<Deviation, AppError> {
        let (user, company) = self.member()?;
        let _guard = self.locks.lock(collections::DEVIATIONS, id).await;
        let mut deviation = self.load(id, &company).await?;
        if !can_manage(&user, &deviation.reported_by) {
            return Err(AppError::Forbidden("Only the reporter or an administrator can attach media".to_string()));
        }

        let file_type = UploadPolicy::from(&company.settings).check(file_name, bytes.len() as u64)?;
        let path = Deviation::media_blob_path(&company.id, &deviation.id, &Uuid::new_v4().to_string(), &file_type);
        let url = self.blobs.upload(bytes, &path).await?;

        deviation.media_urls.push(url);
        deviation.updated_at = Utc::now();
        if let Err(e) = put_record(self.records, collections::DEVIATIONS, &deviation.id, &deviation).await {
            if let Err(cleanup) = self.blobs.delete(&path).await {
                warn!(path = %path, error = %cleanup, "failed to remove orphaned media blob");
            }
            return Err(e.into());
        }
        Ok(deviation)
    }
}
