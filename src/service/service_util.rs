use crate::error::app_error::AppError;
use crate::models::user::UserProfile;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decodes a base64 upload body, tolerating surrounding whitespace and a
/// `data:<mime>;base64,` prefix.
pub fn decode_upload(content_base64: &str) -> Result<Vec<u8>, AppError> {
    let trimmed = content_base64.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => trimmed,
    };
    STANDARD
        .decode(payload)
        .map_err(|e| AppError::BadRequest(format!("File content is not valid base64: {}", e)))
}

pub fn require_feature(enabled: bool, feature: &str) -> Result<(), AppError> {
    if enabled {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("{} is disabled for this company", feature)))
    }
}

/// Admins may act on anything in their company; others only on their own records.
pub fn can_manage(user: &UserProfile, owner_id: &str) -> bool {
    user.role.is_admin() || user.id == owner_id
}
