use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tokio::sync::Mutex;
use tracing::warn;

const MISSING_IP: &str = "missing-ip";

#[derive(Debug, Clone)]
struct Counter {
    window_start: Instant,
    count: u32,
}

/// Fixed-window counter of auth attempts per client IP.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    limit: u32,
    window: Duration,
    cleanup_interval: Duration,
    counters: Mutex<HashMap<String, Counter>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.auth_limit,
            window: Duration::from_secs(config.window_seconds.max(1)),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_seconds.max(1)),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn spawn_cleanup_task(self: Arc<Self>) {
        let cleanup_interval = self.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let window = self.window;
                let mut counters = self.counters.lock().await;
                counters.retain(|_, counter| now.duration_since(counter.window_start) < window);
            }
        });
    }

    async fn check(&self, client: &str) -> RateLimitDecision {
        // Fixed window: bursts can exceed the limit around window boundaries.
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(client.to_string()).or_insert_with(|| Counter { window_start: now, count: 0 });

        if now.duration_since(counter.window_start) >= self.window {
            counter.window_start = now;
            counter.count = 0;
        }

        if counter.count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(counter.window_start));
            return RateLimitDecision::Limited { retry_after: remaining };
        }

        counter.count += 1;
        RateLimitDecision::Allow
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateLimitDecision {
    Allow,
    Limited { retry_after: Duration },
}

/// Request guard for sign-in, sign-up and password-reset endpoints.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AuthRateLimit;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetryAfter(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TooManyRequests;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthRateLimit {
    type Error = TooManyRequests;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(limiter) = request.rocket().state::<Arc<RateLimiter>>() else {
            return Outcome::Success(AuthRateLimit);
        };

        let request_id = request
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let client = match request.client_ip() {
            Some(ip) => ip.to_string(),
            None => {
                warn!(request_id = %request_id, uri = %request.uri(), "client ip unavailable for rate limiting");
                MISSING_IP.to_string()
            }
        };

        match limiter.check(&client).await {
            RateLimitDecision::Allow => Outcome::Success(AuthRateLimit),
            RateLimitDecision::Limited { retry_after } => {
                let retry_after_secs = (retry_after.as_millis().div_ceil(1000) as u64).max(1);
                request.local_cache(|| Some(RateLimitRetryAfter(retry_after_secs)));
                warn!(
                    request_id = %request_id,
                    client = %client,
                    uri = %request.uri(),
                    retry_after_secs,
                    "auth rate limit exceeded"
                );
                Outcome::Error((Status::TooManyRequests, TooManyRequests))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthRateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        responses.responses.insert(
            "429".to_string(),
            RefOr::Object(OpenApiResponse {
                description: "Too Many Requests".to_string(),
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}
