pub mod rate_limit;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::request::Request;
use rocket::{Data, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::AppContext;

const FILES_PREFIX: &str = "/files";

/// Per-request id, echoed in `X-Request-Id` and attached to every log line of the request.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestStart(Instant);

/// Assigns request ids and logs each request with its outcome, latency and
/// the signed-in user at completion.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let request_id = RequestId::new();
        let method = request.method();
        let uri = request.uri();

        request.local_cache(|| Some(request_id.clone()));
        request.local_cache(|| RequestStart(Instant::now()));

        info!(
            request_id = %request_id.0,
            method = %method,
            uri = %uri,
            "incoming request"
        );
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let request_id = request
            .local_cache(|| None::<RequestId>)
            .as_ref()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let status = response.status();
        let method = request.method();
        let uri = request.uri();
        let elapsed_ms = request.local_cache(|| RequestStart(Instant::now())).0.elapsed().as_millis() as u64;
        let user_id = request
            .rocket()
            .state::<Arc<AppContext>>()
            .and_then(|ctx| ctx.session.snapshot().current_user_id)
            .unwrap_or_else(|| "-".to_string());

        response.set_header(Header::new("X-Request-Id", request_id.clone()));
        response.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        response.set_header(Header::new("X-Frame-Options", "DENY"));
        // Stored files are access-checked, so only the client may cache them.
        let cache_control = if is_file_request(uri.path().as_str()) { "private" } else { "no-store" };
        response.set_header(Header::new("Cache-Control", cache_control));

        if status.class().is_server_error() || status.class().is_client_error() {
            warn!(
                request_id = %request_id,
                user_id = %user_id,
                method = %method,
                uri = %uri,
                status = status.code,
                elapsed_ms,
                "request failed"
            );
        } else {
            info!(
                request_id = %request_id,
                user_id = %user_id,
                method = %method,
                uri = %uri,
                status = status.code,
                elapsed_ms,
                "request completed"
            );
        }
    }
}

fn is_file_request(path: &str) -> bool {
    path == FILES_PREFIX || path.starts_with("/files/")
}
