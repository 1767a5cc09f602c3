use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub password_reset: PasswordResetConfig,
}

/// Which record store backs the daemon.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub backend: RecordBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    pub auth_limit: u32,
    pub window_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

/// What the synchronizer does with a failed profile fetch.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetchFailurePolicy {
    /// Log only; the snapshot just lacks the record.
    #[default]
    Suppress,
    /// Log and publish the failure in the snapshot's `last_error`.
    Surface,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub fetch_failure_policy: FetchFailurePolicy,
    /// How long `sign_in` waits for the listener to pick up the new identity.
    pub identity_ack_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub root_dir: String,
    pub public_base_url: String,
    /// Largest file accepted over HTTP. Company upload policies apply below this ceiling.
    pub max_upload_mb: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PasswordResetConfig {
    pub token_ttl_seconds: i64,
    pub max_attempts_per_hour: u32,
    pub frontend_reset_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: RecordBackend::Memory,
            url: "postgres://localhost/driftpro".to_string(),
            max_connections: 16,
            min_connections: 2,
            acquire_timeout: 5,
            run_migrations: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: "/api".to_string(),
            enable_swagger: true,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_limit: 10,
            window_seconds: 60,
            cleanup_interval_seconds: 300,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fetch_failure_policy: FetchFailurePolicy::Suppress,
            identity_ack_timeout_ms: 2_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: "./blobs".to_string(),
            public_base_url: "http://127.0.0.1:8000/files".to_string(),
            max_upload_mb: 50,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "noreply@driftpro.no".to_string(),
            from_name: "DriftPro".to_string(),
            enabled: false,
        }
    }
}

impl Default for PasswordResetConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: 900,
            max_attempts_per_hour: 3,
            frontend_reset_url: "http://localhost:3000/reset-password".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Built-in defaults
    /// 2. DriftPro.toml (base configuration file)
    /// 3. Environment variables (prefixed with DRIFTPRO_, `__` separates sections)
    /// 4. DATABASE_URL environment variable
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("DriftPro.toml").nested())
            .merge(Env::prefixed("DRIFTPRO_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
    }
}
