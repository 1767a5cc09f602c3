use crate::config::PasswordResetConfig;
use crate::database::record_store::{RecordStore, collections, fetch_optional_record, list_records, put_record};
use crate::error::app_error::{AppError, AuthError, FetchError};
use crate::models::identity::Identity;
use crate::models::password_reset::PasswordReset;
use crate::models::user::validate_password_strength;
use crate::service::email::EmailService;
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use password_hash::rand_core::{OsRng, RngCore};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::ValidateEmail;

/// External service that issues and validates credentials.
///
/// Sign-in and sign-out are reported through [`IdentityProvider::subscribe`];
/// callers never learn about session changes any other way.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Creates an account. The new account is not signed in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AppError>;

    /// Starts a password reset. Succeeds for unknown emails too.
    async fn reset_password(&self, email: &str) -> Result<(), AppError>;

    async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<(), AppError>;

    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// The `accounts/{email}` record, keyed by normalized email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    id: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

/// Identity provider backed by Argon2 password hashes. Accounts and reset
/// tokens live in the record store, so they outlast the process.
pub struct LocalIdentityProvider {
    hasher: Argon2<'static>,
    /// Real hash with the provider's parameters, used as a timing decoy so
    /// sign-in attempts for unknown emails take as long as real ones.
    dummy_hash: String,
    records: Arc<dyn RecordStore>,
    /// Serializes account creation and reset bookkeeping.
    write_lock: Mutex<()>,
    current: watch::Sender<Option<Identity>>,
    email: EmailService,
    reset_config: PasswordResetConfig,
}

impl LocalIdentityProvider {
    pub fn new(records: Arc<dyn RecordStore>, email: EmailService, reset_config: PasswordResetConfig) -> Self {
        Self::with_hasher(Argon2::default(), records, email, reset_config)
    }

    pub fn with_hasher(hasher: Argon2<'static>, records: Arc<dyn RecordStore>, email: EmailService, reset_config: PasswordResetConfig) -> Self {
        let (current, _) = watch::channel(None);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = hasher
            .hash_password(b"dummy-never-matches", &salt)
            .map(|hash| hash.to_string())
            .unwrap_or_default();
        Self {
            hasher,
            dummy_hash,
            records,
            write_lock: Mutex::new(()),
            current,
            email,
            reset_config,
        }
    }

    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Unknown(format!("password hashing failed: {}", e)))
    }

    fn verify_password(&self, account: &Account, password: &str) -> Result<(), AuthError> {
        let hash = PasswordHash::new(&account.password_hash).map_err(|e| AuthError::Unknown(format!("stored hash is corrupt: {}", e)))?;
        self.hasher
            .verify_password(password.as_bytes(), &hash)
            .map_err(|_| AuthError::InvalidCredentials)
    }

    /// Throwaway verification so unknown emails cost the same as known ones.
    fn dummy_verify(&self, password: &str) {
        if let Ok(hash) = PasswordHash::new(&self.dummy_hash) {
            let _ = self.hasher.verify_password(password.as_bytes(), &hash);
        }
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, AuthError> {
        fetch_optional_record(self.records.as_ref(), collections::ACCOUNTS, email)
            .await
            .map_err(account_store_error)
    }

    async fn save_account(&self, account: &Account) -> Result<(), AuthError> {
        put_record(self.records.as_ref(), collections::ACCOUNTS, &account.email, account)
            .await
            .map_err(account_store_error)
    }

    /// Records a reset for `email` and returns the plain token, or `None` when
    /// the account is unknown or has hit the hourly cap.
    pub(crate) async fn issue_reset_token(&self, email: &str) -> Result<Option<String>, AppError> {
        let email = normalize_email(email);
        let Some(account) = self.find_account(&email).await? else {
            self.dummy_verify("fake_password");
            info!(email = %email, "password reset requested for unknown email");
            return Ok(None);
        };

        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let resets: Vec<PasswordReset> = list_records(self.records.as_ref(), collections::PASSWORD_RESETS).await?;
        for stale in resets.iter().filter(|reset| reset.is_expired() && reset.created_at <= now - Duration::hours(1)) {
            self.records.delete(collections::PASSWORD_RESETS, &stale.token_hash).await?;
        }

        let attempts = count_recent_attempts(&resets, &account.id, now - Duration::hours(1));
        if attempts >= self.reset_config.max_attempts_per_hour as usize {
            warn!(account_id = %account.id, attempts, "password reset rate limit exceeded");
            return Ok(None);
        }

        let (token, token_hash) = generate_reset_token();
        let reset = PasswordReset {
            account_id: account.id.clone(),
            email: account.email.clone(),
            token_hash,
            created_at: now,
            expires_at: now + Duration::seconds(self.reset_config.token_ttl_seconds),
            used_at: None,
        };
        put_record(self.records.as_ref(), collections::PASSWORD_RESETS, &reset.token_hash, &reset).await?;

        info!(account_id = %account.id, "password reset token issued");
        Ok(Some(token))
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(AuthError::InvalidEmail(email));
        }

        let Some(account) = self.find_account(&email).await? else {
            self.dummy_verify(password);
            return Err(AuthError::InvalidCredentials);
        };
        self.verify_password(&account, password)?;

        let identity = Identity {
            id: account.id,
            email: account.email,
        };
        info!(identity_id = %identity.id, "signed in");
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(AuthError::InvalidEmail(email));
        }
        validate_password_strength(password).map_err(|_| AuthError::WeakPassword)?;

        let password_hash = self.hash_password(password)?;
        let _guard = self.write_lock.lock().await;
        if self.find_account(&email).await?.is_some() {
            return Err(AuthError::EmailInUse(email));
        }

        let account = Account {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            created_at: Utc::now(),
        };
        self.save_account(&account).await?;

        info!(identity_id = %account.id, "account created");
        Ok(Identity {
            id: account.id,
            email: account.email,
        })
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        if let Some(previous) = self.current.send_replace(None) {
            info!(identity_id = %previous.id, "signed out");
        }
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), AppError> {
        if let Some(token) = self.issue_reset_token(email).await? {
            let ttl_minutes = self.reset_config.token_ttl_seconds / 60;
            if let Err(e) = self
                .email
                .send_password_reset_email(&normalize_email(email), &token, &self.reset_config.frontend_reset_url, ttl_minutes)
                .await
            {
                error!(error = %e, "Failed to send password reset email");
            }
        }
        Ok(())
    }

    async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        validate_password_strength(new_password).map_err(|_| AuthError::WeakPassword)?;
        let token_hash = hash_token(token);
        let password_hash = self.hash_password(new_password)?;

        let _guard = self.write_lock.lock().await;
        let mut reset = fetch_optional_record::<PasswordReset>(self.records.as_ref(), collections::PASSWORD_RESETS, &token_hash)
            .await?
            .filter(PasswordReset::is_valid)
            .ok_or(AuthError::InvalidResetToken)?;
        let mut account = self
            .find_account(&reset.email)
            .await?
            .filter(|account| account.id == reset.account_id)
            .ok_or(AuthError::InvalidResetToken)?;

        reset.used_at = Some(Utc::now());
        put_record(self.records.as_ref(), collections::PASSWORD_RESETS, &token_hash, &reset).await?;
        account.password_hash = password_hash;
        self.save_account(&account).await?;

        let pending: Vec<PasswordReset> = list_records(self.records.as_ref(), collections::PASSWORD_RESETS).await?;
        for other in pending.iter().filter(|other| other.account_id == account.id && !other.is_used()) {
            self.records.delete(collections::PASSWORD_RESETS, &other.token_hash).await?;
        }
        info!(account_id = %account.id, "password reset completed");
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

fn account_store_error(e: FetchError) -> AuthError {
    error!(error = %e, "account store unavailable");
    AuthError::Unknown(format!("account store unavailable: {}", e))
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn count_recent_attempts(resets: &[PasswordReset], account_id: &str, since: DateTime<Utc>) -> usize {
    resets.iter().filter(|reset| reset.account_id == account_id && reset.created_at > since).count()
}

/// Returns `(plain_token, token_hash)`: 32 random bytes as hex, and its SHA-256.
fn generate_reset_token() -> (String, String) {
    let mut token_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut token_bytes);
    let token = hex::encode(token_bytes);
    let token_hash = hash_token(&token);
    (token, token_hash)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
