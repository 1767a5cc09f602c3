use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum UserRole {
    #[default]
    Employee,
    Admin,
    SuperAdmin,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

/// The `users/{id}` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub company_id: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default, rename = "profileImageURL")]
    pub profile_image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub employee_id: Option<String>,
}

impl UserProfile {
    pub fn new(id: &str, email: &str, first_name: &str, last_name: &str, role: UserRole, company_id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role,
            company_id: company_id.to_string(),
            department: None,
            phone_number: None,
            profile_image_url: None,
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
            birthday: None,
            employee_id: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn initials(&self) -> String {
        let first = self.first_name.chars().next().map(|c| c.to_uppercase().to_string()).unwrap_or_default();
        let last = self.last_name.chars().next().map(|c| c.to_uppercase().to_string()).unwrap_or_default();
        format!("{}{}", first, last)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    #[validate(custom(function = "crate::models::user::validate_password_strength"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 1))]
    pub company_id: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct SignInRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Rejects passwords zxcvbn scores below 3 ("safely unguessable").
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let entropy = zxcvbn::zxcvbn(password, &[]);
    if u8::from(entropy.score()) < 3 {
        let mut error = ValidationError::new("password_strength");
        error.message = Some("Password is too weak".into());
        return Err(error);
    }
    Ok(())
}
