use crate::context::AppContext;
use crate::error::app_error::AppError;
use crate::models::deviation::{Deviation, DeviationCommentRequest, DeviationMediaRequest, DeviationRequest, DeviationStatusRequest};
use crate::service::service_util::decode_upload;
use rocket::serde::json::Json;
use rocket::{State, get, post, put};
use rocket_okapi::openapi;
use std::sync::Arc;
use validator::Validate;

/// List the company's deviations, newest first
#[openapi(tag = "Deviations")]
#[get("/")]
pub async fn list_deviations(ctx: &State<Arc<AppContext>>) -> Result<Json<Vec<Deviation>>, AppError> {
    Ok(Json(ctx.deviations().list_for_company().await?))
}

/// Report a new deviation
#[openapi(tag = "Deviations")]
#[post("/", data = "<payload>")]
pub async fn report_deviation(ctx: &State<Arc<AppContext>>, payload: Json<DeviationRequest>) -> Result<Json<Deviation>, AppError> {
    Ok(Json(ctx.deviations().report(&payload).await?))
}

#[openapi(tag = "Deviations")]
#[get("/<id>")]
pub async fn get_deviation(ctx: &State<Arc<AppContext>>, id: String) -> Result<Json<Deviation>, AppError> {
    Ok(Json(ctx.deviations().get(&id).await?))
}

/// Change status or assignee (administrators only)
#[openapi(tag = "Deviations")]
#[put("/<id>/status", data = "<payload>")]
pub async fn update_deviation_status(ctx: &State<Arc<AppContext>>, id: String, payload: Json<DeviationStatusRequest>) -> Result<Json<Deviation>, AppError> {
    Ok(Json(ctx.deviations().update_status(&id, &payload).await?))
}

#[openapi(tag = "Deviations")]
#[post("/<id>/comments", data = "<payload>")]
pub async fn add_deviation_comment(ctx: &State<Arc<AppContext>>, id: String, payload: Json<DeviationCommentRequest>) -> Result<Json<Deviation>, AppError> {
    Ok(Json(ctx.deviations().add_comment(&id, &payload).await?))
}

/// Attach a photo or video, sent as base64
#[openapi(tag = "Deviations")]
#[post("/<id>/media", data = "<payload>")]
pub async fn attach_deviation_media(ctx: &State<Arc<AppContext>>, id: String, payload: Json<DeviationMediaRequest>) -> Result<Json<Deviation>, AppError> {
    payload.validate()?;
    let bytes = decode_upload(&payload.content_base64)?;
    Ok(Json(ctx.deviations().attach_media(&id, &payload.file_name, &bytes).await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        list_deviations,
        report_deviation,
        get_deviation,
        update_deviation_status,
        add_deviation_comment,
        attach_deviation_media
    ]
}
