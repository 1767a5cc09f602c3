use crate::context::AppContext;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::AuthRateLimit;
use crate::models::password_reset::{PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetResponse};
use crate::models::session::SessionResponse;
use crate::models::user::{SignInRequest, SignUpRequest};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use std::sync::Arc;
use validator::Validate;

const RESET_REQUESTED_MESSAGE: &str = "If your email address exists in our system, you will receive a password reset link shortly.";

/// Current session snapshot
#[openapi(tag = "Session")]
#[get("/")]
pub async fn get_session(ctx: &State<Arc<AppContext>>) -> Json<SessionResponse> {
    Json(SessionResponse::from(&ctx.session.snapshot()))
}

/// Sign in with email and password
#[openapi(tag = "Session")]
#[post("/sign-in", data = "<payload>")]
pub async fn sign_in(ctx: &State<Arc<AppContext>>, _rate_limit: AuthRateLimit, payload: Json<SignInRequest>) -> Result<Json<SessionResponse>, AppError> {
    payload.validate()?;
    ctx.session.sign_in(&payload.email, &payload.password).await?;
    Ok(Json(SessionResponse::from(&ctx.session.snapshot())))
}

/// Create an account in an existing company and sign it in
#[openapi(tag = "Session")]
#[post("/sign-up", data = "<payload>")]
pub async fn sign_up(ctx: &State<Arc<AppContext>>, _rate_limit: AuthRateLimit, payload: Json<SignUpRequest>) -> Result<Json<SessionResponse>, AppError> {
    ctx.session.sign_up(&payload).await?;
    Ok(Json(SessionResponse::from(&ctx.session.snapshot())))
}

#[openapi(tag = "Session")]
#[post("/sign-out")]
pub async fn sign_out(ctx: &State<Arc<AppContext>>) -> Result<Status, AppError> {
    ctx.session.sign_out().await?;
    Ok(Status::NoContent)
}

/// Request a password reset email
#[openapi(tag = "Password Reset")]
#[post("/password-reset", data = "<payload>")]
pub async fn request_password_reset(
    ctx: &State<Arc<AppContext>>,
    _rate_limit: AuthRateLimit,
    payload: Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, AppError> {
    payload.validate()?;
    ctx.session.reset_password(&payload.email).await?;
    Ok(Json(PasswordResetResponse {
        message: RESET_REQUESTED_MESSAGE.to_string(),
    }))
}

/// Set a new password with a reset token
#[openapi(tag = "Password Reset")]
#[post("/password-reset/confirm", data = "<payload>")]
pub async fn confirm_password_reset(
    ctx: &State<Arc<AppContext>>,
    _rate_limit: AuthRateLimit,
    payload: Json<PasswordResetConfirmRequest>,
) -> Result<Json<PasswordResetResponse>, AppError> {
    payload.validate()?;
    ctx.session.confirm_password_reset(&payload.token, &payload.new_password).await?;
    Ok(Json(PasswordResetResponse {
        message: "Your password has been reset.".to_string(),
    }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_session, sign_in, sign_up, sign_out, request_password_reset, confirm_password_reset]
}
