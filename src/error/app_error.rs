use rocket::http::Status;
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

/// Failures reported by the identity provider. These always reach the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("Password is too weak")]
    WeakPassword,
    #[error("Email {0} is already registered")]
    EmailInUse(String),
    #[error("Password reset token is invalid or expired")]
    InvalidResetToken,
    #[error("Authentication failed: {0}")]
    Unknown(String),
}

/// Failures reading from or writing to the record store.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Record {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("Record {collection}/{id} could not be decoded")]
    Decode {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Record store unavailable: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },
}

/// Failures of the blob store and of the upload policy in front of it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),
    #[error("File is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("File type '{0}' is not allowed")]
    FileTypeNotAllowed(String),
    #[error("Failed to upload {path}")]
    Upload {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to delete {path}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error")]
    Email { message: String },
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Server failed: {0}")]
    Launch(String),
    #[error("Internal server error")]
    ConfigurationError {
        message: String,
        #[source]
        source: figment::Error,
    },
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn email(message: impl Into<String>) -> Self {
        Self::Email { message: message.into() }
    }
}

impl FetchError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn decode(collection: &str, id: &str, source: serde_json::Error) -> Self {
        Self::Decode {
            collection: collection.to_string(),
            id: id.to_string(),
            source,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

impl From<sqlx::Error> for FetchError {
    fn from(e: sqlx::Error) -> Self {
        FetchError::Transport {
            message: e.to_string(),
            source: Some(e),
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::ConfigurationError {
            message: "Failed to read configuration".to_string(),
            source: e,
        }
    }
}

impl From<rocket::Error> for AppError {
    fn from(e: rocket::Error) -> Self {
        // kind() marks the error handled so dropping it does not abort
        AppError::Launch(e.kind().to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::db("Database error", e)
    }
}

impl From<&AuthError> for Status {
    fn from(e: &AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => Status::Forbidden,
            AuthError::InvalidEmail(_) => Status::BadRequest,
            AuthError::WeakPassword => Status::BadRequest,
            AuthError::EmailInUse(_) => Status::Conflict,
            AuthError::InvalidResetToken => Status::BadRequest,
            AuthError::Unknown(_) => Status::InternalServerError,
        }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Auth(auth) => Status::from(auth),
            AppError::Fetch(FetchError::NotFound { .. }) => Status::NotFound,
            AppError::Fetch(FetchError::Decode { .. }) => Status::InternalServerError,
            AppError::Fetch(FetchError::Transport { .. }) => Status::ServiceUnavailable,
            AppError::Storage(StorageError::InvalidPath(_)) => Status::BadRequest,
            AppError::Storage(StorageError::TooLarge { .. }) => Status::PayloadTooLarge,
            AppError::Storage(StorageError::FileTypeNotAllowed(_)) => Status::UnsupportedMediaType,
            AppError::Storage(StorageError::Upload { .. } | StorageError::Delete { .. }) => Status::InternalServerError,
            AppError::Db { .. } => Status::InternalServerError,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::Forbidden(_) => Status::Forbidden,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Email { .. } => Status::InternalServerError,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::InvalidConfig(_) | AppError::ConfigurationError { .. } => Status::InternalServerError,
            AppError::Launch(_) => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        error!(
            error = ?self,
            request_id = %request_id,
            method = %method,
            uri = %uri,
            "request failed"
        );

        let status = Status::from(&self);
        let body = self.to_string();

        Response::build().status(status).sized_body(body.len(), Cursor::new(body)).ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("500", "Internal Server Error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}
