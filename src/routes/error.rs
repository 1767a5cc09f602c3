use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::Header;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, Responder, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

#[derive(Responder)]
#[response(status = 429)]
pub struct TooManyRequests {
    body: Json<Error>,
    retry_after: Header<'static>,
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Not found".to_string(),
    })
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Conflict".to_string(),
    })
}

#[catch(429)]
pub fn too_many_requests(request: &Request) -> TooManyRequests {
    let retry_after = request.local_cache(|| None::<RateLimitRetryAfter>).map(|r| r.0).unwrap_or(1);
    TooManyRequests {
        body: Json(Error {
            message: "Too many requests".to_string(),
        }),
        retry_after: Header::new("Retry-After", retry_after.to_string()),
    }
}
