use crate::context::AppContext;
use crate::error::app_error::AppError;
use crate::models::document::{Document, DocumentCategory, DocumentUploadRequest};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use rocket_okapi::openapi;
use std::sync::Arc;

/// List active documents, optionally limited to one category
#[openapi(tag = "Documents")]
#[get("/?<category>")]
pub async fn list_documents(ctx: &State<Arc<AppContext>>, category: Option<String>) -> Result<Json<Vec<Document>>, AppError> {
    let category = category.map(|c| parse_category(&c)).transpose()?;
    Ok(Json(ctx.documents().list_for_company(category).await?))
}

/// Upload a document, sent as base64
#[openapi(tag = "Documents")]
#[post("/", data = "<payload>")]
pub async fn upload_document(ctx: &State<Arc<AppContext>>, payload: Json<DocumentUploadRequest>) -> Result<Json<Document>, AppError> {
    Ok(Json(ctx.documents().upload(&payload).await?))
}

/// Count a download and return the document with its file URL
#[openapi(tag = "Documents")]
#[post("/<id>/download")]
pub async fn download_document(ctx: &State<Arc<AppContext>>, id: String) -> Result<Json<Document>, AppError> {
    Ok(Json(ctx.documents().record_download(&id).await?))
}

#[openapi(tag = "Documents")]
#[delete("/<id>")]
pub async fn delete_document(ctx: &State<Arc<AppContext>>, id: String) -> Result<Status, AppError> {
    ctx.documents().delete(&id).await?;
    Ok(Status::NoContent)
}

fn parse_category(raw: &str) -> Result<DocumentCategory, AppError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| AppError::BadRequest(format!("Unknown document category '{}'", raw)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![list_documents, upload_document, download_document, delete_document]
}
