use crate::context::AppContext;
use crate::models::health::HealthResponse;
use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_okapi::openapi;
use std::sync::Arc;

/// Liveness check, reporting the active record store backend
#[openapi(tag = "Health")]
#[get("/")]
pub async fn healthcheck(ctx: &State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        record_store: ctx.records.backend_name(),
    })
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![healthcheck]
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestSession;
    use rocket::http::Status;

    #[rocket::async_test]
    async fn health_check_works() {
        let session = TestSession::logged_out().await;
        let client = session.client().await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value = response.into_json().await.expect("json body");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["recordStore"], "memory");
    }
}
