use crate::config::Config;
use crate::database::record_store::{RecordLocks, RecordStore};
use crate::db::connect_record_store;
use crate::error::app_error::{AppError, StorageError};
use crate::service::blob::{BlobStore, FsBlobStore};
use crate::service::company::CompanyDirectory;
use crate::service::deviation::DeviationService;
use crate::service::document::DocumentService;
use crate::service::email::EmailService;
use crate::service::identity::{IdentityProvider, LocalIdentityProvider};
use crate::service::session::SessionSynchronizer;
use std::sync::Arc;
use tracing::info;

/// Everything the daemon shares between requests. Built once at startup and
/// managed by Rocket.
pub struct AppContext {
    pub config: Config,
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub session: Arc<SessionSynchronizer>,
    pub record_locks: RecordLocks,
}

impl AppContext {
    /// Connects the configured backends and starts the session synchronizer.
    pub async fn initialize(config: Config) -> Result<Arc<Self>, AppError> {
        let records = connect_record_store(&config.database).await?;

        tokio::fs::create_dir_all(&config.storage.root_dir)
            .await
            .map_err(|source| StorageError::Upload {
                path: config.storage.root_dir.clone(),
                source,
            })?;
        let blobs = Arc::new(FsBlobStore::new(&config.storage.root_dir, &config.storage.public_base_url));

        let identity = Arc::new(LocalIdentityProvider::new(
            Arc::clone(&records),
            EmailService::new(config.email.clone()),
            config.password_reset.clone(),
        ));

        info!(
            record_store = records.backend_name(),
            blob_root = %config.storage.root_dir,
            fetch_failure_policy = ?config.session.fetch_failure_policy,
            "application context initialized"
        );
        Ok(Self::from_parts(config, records, blobs, identity))
    }

    pub fn from_parts(config: Config, records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>, identity: Arc<dyn IdentityProvider>) -> Arc<Self> {
        let session = SessionSynchronizer::start(Arc::clone(&identity), Arc::clone(&records), &config.session);
        Arc::new(Self {
            config,
            records,
            blobs,
            identity,
            session,
            record_locks: RecordLocks::new(),
        })
    }

    pub fn companies(&self) -> CompanyDirectory<'_> {
        CompanyDirectory::new(self.records.as_ref())
    }

    pub fn deviations(&self) -> DeviationService<'_> {
        DeviationService::new(self.records.as_ref(), self.blobs.as_ref(), &self.record_locks, &self.session)
    }

    pub fn documents(&self) -> DocumentService<'_> {
        DocumentService::new(self.records.as_ref(), self.blobs.as_ref(), &self.record_locks, &self.session)
    }

    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}
