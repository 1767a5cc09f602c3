use crate::config::{Config, EmailConfig, PasswordResetConfig};
use crate::context::AppContext;
use crate::database::memory::MemoryRecordStore;
use crate::database::record_store::{RecordStore, collections, put_record};
use crate::error::app_error::{AppError, AuthError, FetchError};
use crate::models::company::{CompanyProfile, CompanySettings};
use crate::models::deviation::{Deviation, DeviationCategory, DeviationSeverity, DeviationStatus};
use crate::models::identity::Identity;
use crate::models::session::SessionSnapshot;
use crate::models::user::{UserProfile, UserRole};
use crate::service::blob::FsBlobStore;
use crate::service::deviation::DeviationService;
use crate::service::document::DocumentService;
use crate::service::email::EmailService;
use crate::service::identity::{IdentityProvider, LocalIdentityProvider};
use crate::service::session::SessionSynchronizer;
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::Utc;
use rocket::local::asynchronous::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Semaphore, watch};

/// Scores 4 with zxcvbn.
pub const STRONG_PASSWORD: &str = "tundra-Velvet-4417-quasar";

pub const TEST_COMPANY_ID: &str = "c1";
pub const TEST_FILES_URL: &str = "https://files.test";

/// Identity provider with cheap hashing parameters over a fresh store.
pub fn identity_provider() -> LocalIdentityProvider {
    identity_provider_over(Arc::new(MemoryRecordStore::new()))
}

pub fn identity_provider_over(records: Arc<dyn RecordStore>) -> LocalIdentityProvider {
    let params = Params::new(1024, 1, 1, None).expect("valid argon2 params");
    LocalIdentityProvider::with_hasher(
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        records,
        EmailService::new(EmailConfig::default()),
        PasswordResetConfig::default(),
    )
}

pub fn sample_user(id: &str, company_id: &str) -> UserProfile {
    UserProfile::new(id, "kari@acme.no", "Kari", "Nordmann", UserRole::Employee, company_id)
}

pub fn sample_company(id: &str, name: &str) -> CompanyProfile {
    CompanyProfile::new(id, name)
}

pub fn sample_deviation(id: &str, company_id: &str, reported_by: &str) -> Deviation {
    let now = Utc::now();
    Deviation {
        id: id.to_string(),
        title: "Lekkasje i kompressorrom".to_string(),
        description: "Olje på gulvet ved kompressor 2".to_string(),
        category: DeviationCategory::Equipment,
        severity: DeviationSeverity::Medium,
        status: DeviationStatus::Reported,
        reported_by: reported_by.to_string(),
        assigned_to: None,
        company_id: company_id.to_string(),
        location: None,
        media_urls: Vec::new(),
        created_at: now,
        updated_at: now,
        resolved_at: None,
        comments: Vec::new(),
        tags: Vec::new(),
    }
}

/// Waits until the listener has observed `expected` and finished its fetch chain.
pub async fn settled(sync: &SessionSynchronizer, expected: Option<&str>) -> SessionSnapshot {
    let mut rx = sync.subscribe();
    let wait = rx.wait_for(|s| s.observed_identity_id.as_deref() == expected && !s.phase.is_loading());
    match tokio::time::timeout(Duration::from_secs(5), wait).await {
        Ok(Ok(snapshot)) => snapshot.clone(),
        Ok(Err(_)) => panic!("session channel closed"),
        Err(_) => panic!("session did not settle on {:?}: {:?}", expected, sync.snapshot()),
    }
}

/// Identity provider driven directly by the test.
pub struct ScriptedIdentityProvider {
    current: watch::Sender<Option<Identity>>,
}

impl ScriptedIdentityProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn emit(&self, identity: Option<Identity>) {
        self.current.send_replace(identity);
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentityProvider {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Identity, AuthError> {
        Err(AuthError::InvalidCredentials)
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Identity, AuthError> {
        Err(AuthError::Unknown("sign-up is not scripted".to_string()))
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.emit(None);
        Ok(())
    }

    async fn reset_password(&self, _email: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn confirm_password_reset(&self, _token: &str, _new_password: &str) -> Result<(), AppError> {
        Err(AuthError::InvalidResetToken.into())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

/// Record store whose every call fails with a transport error.
pub struct FailingRecordStore;

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn fetch_by_id(&self, _collection: &str, _id: &str) -> Result<Option<Value>, FetchError> {
        Err(FetchError::transport("connection refused"))
    }

    async fn upsert(&self, _collection: &str, _id: &str, _record: Value) -> Result<(), FetchError> {
        Err(FetchError::transport("connection refused"))
    }

    async fn delete(&self, _collection: &str, _id: &str) -> Result<bool, FetchError> {
        Err(FetchError::transport("connection refused"))
    }

    async fn list(&self, _collection: &str) -> Result<Vec<(String, Value)>, FetchError> {
        Err(FetchError::transport("connection refused"))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Forwards to another store, yielding to the scheduler before every call so
/// concurrent futures interleave between their reads and writes.
pub struct YieldingRecordStore {
    inner: Arc<dyn RecordStore>,
}

impl YieldingRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RecordStore for YieldingRecordStore {
    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FetchError> {
        tokio::task::yield_now().await;
        self.inner.fetch_by_id(collection, id).await
    }

    async fn upsert(&self, collection: &str, id: &str, record: Value) -> Result<(), FetchError> {
        tokio::task::yield_now().await;
        self.inner.upsert(collection, id, record).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, FetchError> {
        self.inner.delete(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, FetchError> {
        self.inner.list(collection).await
    }

    fn backend_name(&self) -> &'static str {
        "yielding"
    }
}

/// Reads from another store and rejects every write.
pub struct ReadOnlyRecordStore {
    inner: Arc<dyn RecordStore>,
}

impl ReadOnlyRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RecordStore for ReadOnlyRecordStore {
    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FetchError> {
        self.inner.fetch_by_id(collection, id).await
    }

    async fn upsert(&self, _collection: &str, _id: &str, _record: Value) -> Result<(), FetchError> {
        Err(FetchError::transport("store is read-only"))
    }

    async fn delete(&self, _collection: &str, _id: &str) -> Result<bool, FetchError> {
        Err(FetchError::transport("store is read-only"))
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, FetchError> {
        self.inner.list(collection).await
    }

    fn backend_name(&self) -> &'static str {
        "read-only"
    }
}

/// In-memory store where fetches of chosen ids block until released.
#[derive(Default)]
pub struct GatedRecordStore {
    inner: MemoryRecordStore,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl GatedRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close_gate(&self, id: &str) {
        self.gates.lock().unwrap().insert(id.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn open_gate(&self, id: &str) {
        if let Some(gate) = self.gates.lock().unwrap().remove(id) {
            gate.close();
        }
    }
}

#[async_trait]
impl RecordStore for GatedRecordStore {
    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FetchError> {
        let gate = self.gates.lock().unwrap().get(id).cloned();
        if let Some(gate) = gate {
            // Closing the semaphore is what releases waiters.
            let _ = gate.acquire().await;
        }
        self.inner.fetch_by_id(collection, id).await
    }

    async fn upsert(&self, collection: &str, id: &str, record: Value) -> Result<(), FetchError> {
        self.inner.upsert(collection, id, record).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, FetchError> {
        self.inner.delete(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, FetchError> {
        self.inner.list(collection).await
    }

    fn backend_name(&self) -> &'static str {
        "gated"
    }
}

/// A full application context over in-memory records and a temporary blob
/// directory, with one company `c1`.
pub struct TestSession {
    pub context: Arc<AppContext>,
    scripted: Option<Arc<ScriptedIdentityProvider>>,
    blob_dir: TempDir,
}

impl TestSession {
    async fn build(
        identity: impl FnOnce(Arc<dyn RecordStore>) -> Arc<dyn IdentityProvider>,
        scripted: Option<Arc<ScriptedIdentityProvider>>,
        settings: CompanySettings,
    ) -> Self {
        let blob_dir = tempfile::tempdir().expect("temp dir");
        let mut config = Config::default();
        config.storage.root_dir = blob_dir.path().to_string_lossy().into_owned();
        config.storage.public_base_url = TEST_FILES_URL.to_string();
        config.session.identity_ack_timeout_ms = 1_000;

        let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let mut company = sample_company(TEST_COMPANY_ID, "Acme");
        company.settings = settings;
        put_record(records.as_ref(), collections::COMPANIES, TEST_COMPANY_ID, &company).await.unwrap();

        let blobs = Arc::new(FsBlobStore::new(blob_dir.path(), TEST_FILES_URL));
        let identity = identity(Arc::clone(&records));
        let context = AppContext::from_parts(config, records, blobs, identity);
        Self { context, scripted, blob_dir }
    }

    pub async fn logged_out() -> Self {
        let provider = Arc::new(ScriptedIdentityProvider::new());
        let identity: Arc<dyn IdentityProvider> = provider.clone();
        Self::build(|_| identity, Some(provider), CompanySettings::default()).await
    }

    pub async fn signed_in(role: UserRole) -> Self {
        Self::signed_in_with(role, |_| {}).await
    }

    pub async fn signed_in_with(role: UserRole, configure: impl FnOnce(&mut CompanySettings)) -> Self {
        let mut settings = CompanySettings::default();
        configure(&mut settings);
        let provider = Arc::new(ScriptedIdentityProvider::new());
        let identity: Arc<dyn IdentityProvider> = provider.clone();
        let session = Self::build(|_| identity, Some(provider), settings).await;
        session.switch_user("u1", role).await;
        session
    }

    /// Uses the real local identity provider, for sign-in flows.
    pub async fn with_local_identity() -> Self {
        Self::build(|records| Arc::new(identity_provider_over(records)), None, CompanySettings::default()).await
    }

    /// Signs in as `id`, a member of `c1` with `role`.
    pub async fn switch_user(&self, id: &str, role: UserRole) {
        let scripted = self.scripted.as_ref().expect("session uses a scripted identity provider");
        let mut user = sample_user(id, TEST_COMPANY_ID);
        user.role = role;
        put_record(self.records(), collections::USERS, id, &user).await.unwrap();

        scripted.emit(None);
        settled(&self.context.session, None).await;
        scripted.emit(Some(Identity {
            id: id.to_string(),
            email: user.email.clone(),
        }));
        settled(&self.context.session, Some(id)).await;
    }

    pub async fn sign_out(&self) {
        let scripted = self.scripted.as_ref().expect("session uses a scripted identity provider");
        scripted.emit(None);
        settled(&self.context.session, None).await;
    }

    pub async fn switch_role(&self, role: UserRole) {
        let id = self.user_id();
        self.switch_user(&id, role).await;
    }

    pub fn user_id(&self) -> String {
        self.context.session.snapshot().current_user_id.unwrap_or_default()
    }

    pub fn company_id(&self) -> &'static str {
        TEST_COMPANY_ID
    }

    pub fn records(&self) -> &dyn RecordStore {
        self.context.records.as_ref()
    }

    pub fn blob_root(&self) -> &Path {
        self.blob_dir.path()
    }

    pub fn deviations(&self) -> DeviationService<'_> {
        self.context.deviations()
    }

    pub fn documents(&self) -> DocumentService<'_> {
        self.context.documents()
    }

    pub async fn client(&self) -> Client {
        let rocket = crate::build_rocket(self.context.config.clone(), Arc::clone(&self.context)).expect("valid rocket configuration");
        Client::tracked(rocket).await.expect("valid rocket instance")
    }
}
