use crate::context::AppContext;
use crate::error::app_error::AppError;
use crate::models::company::{CompanyProfile, CompanyRequest};
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use std::sync::Arc;

/// Search companies by name, for picking one at sign-up
#[openapi(tag = "Companies")]
#[get("/?<q>")]
pub async fn search_companies(ctx: &State<Arc<AppContext>>, q: Option<String>) -> Result<Json<Vec<CompanyProfile>>, AppError> {
    let companies = ctx.companies().search(q.as_deref().unwrap_or_default()).await?;
    Ok(Json(companies))
}

/// Register a new company
#[openapi(tag = "Companies")]
#[post("/", data = "<payload>")]
pub async fn create_company(ctx: &State<Arc<AppContext>>, payload: Json<CompanyRequest>) -> Result<Json<CompanyProfile>, AppError> {
    let company = ctx.companies().register(&payload).await?;
    Ok(Json(company))
}

#[openapi(tag = "Companies")]
#[get("/<id>")]
pub async fn get_company(ctx: &State<Arc<AppContext>>, id: String) -> Result<Json<CompanyProfile>, AppError> {
    Ok(Json(ctx.companies().get(&id).await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![search_companies, create_company, get_company]
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestSession;
    use rocket::http::{ContentType, Status};
    use serde_json::{Value, json};

    #[rocket::async_test]
    async fn search_finds_seeded_company() {
        let session = TestSession::logged_out().await;
        let client = session.client().await;

        let body: Value = client.get("/api/companies?q=acm").dispatch().await.into_json().await.unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], "c1");

        let body: Value = client.get("/api/companies").dispatch().await.into_json().await.unwrap();
        assert!(body.as_array().unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn create_then_fetch() {
        let session = TestSession::logged_out().await;
        let client = session.client().await;

        let response = client
            .post("/api/companies")
            .header(ContentType::JSON)
            .body(json!({"name": "Nordlys Drift", "primaryColor": "#123456"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let created: Value = response.into_json().await.unwrap();
        assert_eq!(created["secondaryColor"], "#5856D6");

        let id = created["id"].as_str().unwrap();
        let response = client.get(format!("/api/companies/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn invalid_color_is_rejected() {
        let session = TestSession::logged_out().await;
        let client = session.client().await;

        let response = client
            .post("/api/companies")
            .header(ContentType::JSON)
            .body(json!({"name": "Nordlys", "primaryColor": "blue"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn unknown_company_is_not_found() {
        let session = TestSession::logged_out().await;
        let client = session.client().await;
        assert_eq!(client.get("/api/companies/nope").dispatch().await.status(), Status::NotFound);
    }
}
