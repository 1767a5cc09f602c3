use chrono::{DateTime, Utc};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("invalid color pattern"));

/// Accepts `#RRGGBB` colour codes.
pub fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    if HEX_COLOR.is_match(color) {
        return Ok(());
    }
    let mut error = ValidationError::new("hex_color");
    error.message = Some("Colour must be written as #RRGGBB".into());
    Err(error)
}

pub const DEFAULT_PRIMARY_COLOR: &str = "#007AFF";
pub const DEFAULT_SECONDARY_COLOR: &str = "#5856D6";

/// Feature toggles and upload policy for one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanySettings {
    pub enable_deviation_reporting: bool,
    pub enable_risk_analysis: bool,
    pub enable_document_archive: bool,
    pub enable_internal_control: bool,
    pub enable_chat: bool,
    pub enable_birthday_calendar: bool,
    #[serde(rename = "maxFileSizeMB")]
    pub max_file_size_mb: u32,
    pub allowed_file_types: Vec<String>,
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            enable_deviation_reporting: true,
            enable_risk_analysis: true,
            enable_document_archive: true,
            enable_internal_control: true,
            enable_chat: true,
            enable_birthday_calendar: true,
            max_file_size_mb: 50,
            allowed_file_types: ["jpg", "jpeg", "png", "pdf", "doc", "docx", "mp4", "mov"].iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// The `companies/{id}` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "logoURL")]
    pub logo_url: Option<String>,
    pub primary_color: String,
    pub secondary_color: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub admin_user_id: String,
    #[serde(default)]
    pub settings: CompanySettings,
}

fn default_true() -> bool {
    true
}

impl CompanyProfile {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            logo_url: None,
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
            secondary_color: DEFAULT_SECONDARY_COLOR.to_string(),
            address: None,
            phone_number: None,
            email: None,
            website: None,
            description: None,
            is_active: true,
            created_at: Utc::now(),
            admin_user_id: String::new(),
            settings: CompanySettings::default(),
        }
    }

    /// Case-insensitive substring match used by the company picker.
    pub fn matches_search(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(&query.trim().to_lowercase())
    }
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom(function = "crate::models::company::validate_hex_color"))]
    pub primary_color: Option<String>,
    #[validate(custom(function = "crate::models::company::validate_hex_color"))]
    pub secondary_color: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(url)]
    pub website: Option<String>,
    pub description: Option<String>,
}

impl From<&CompanyRequest> for CompanyProfile {
    fn from(request: &CompanyRequest) -> Self {
        let mut company = CompanyProfile::new(&uuid::Uuid::new_v4().to_string(), &request.name);
        if let Some(color) = &request.primary_color {
            company.primary_color = color.clone();
        }
        if let Some(color) = &request.secondary_color {
            company.secondary_color = color.clone();
        }
        company.address = request.address.clone();
        company.phone_number = request.phone_number.clone();
        company.email = request.email.clone();
        company.website = request.website.clone();
        company.description = request.description.clone();
        company
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colours_must_be_six_digit_hex() {
        assert!(validate_hex_color("#0a7AfF").is_ok());
        for bad in ["blue", "#12345", "#1234567", "123456", "#12345g"] {
            assert!(validate_hex_color(bad).is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn company_request_rejects_named_colours() {
        let request: CompanyRequest = serde_json::from_value(serde_json::json!({
            "name": "Nordlys",
            "primaryColor": "blue"
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("primary_color"));

        let request: CompanyRequest = serde_json::from_value(serde_json::json!({
            "name": "Nordlys",
            "primaryColor": "#112233",
            "secondaryColor": "#445566"
        }))
        .unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn settings_default_to_everything_enabled() {
        let settings = CompanySettings::default();
        assert!(settings.enable_deviation_reporting && settings.enable_document_archive);
        assert_eq!(settings.max_file_size_mb, 50);
        assert!(settings.allowed_file_types.contains(&"docx".to_string()));
    }

    #[test]
    fn sparse_company_record_gets_defaults() {
        let company: CompanyProfile = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "name": "Acme",
            "primaryColor": "#112233",
            "secondaryColor": "#445566"
        }))
        .unwrap();
        assert_eq!(company.name, "Acme");
        assert!(company.is_active);
        assert_eq!(company.settings, CompanySettings::default());
    }

    #[test]
    fn settings_use_record_field_names() {
        let value = serde_json::to_value(CompanySettings::default()).unwrap();
        assert_eq!(value["maxFileSizeMB"], 50);
        assert_eq!(value["enableChat"], true);
    }

    #[test]
    fn search_is_case_insensitive() {
        let company = CompanyProfile::new("c1", "Acme Bygg AS");
        assert!(company.matches_search("bygg"));
        assert!(company.matches_search(" ACME "));
        assert!(!company.matches_search("rør"));
    }

    #[test]
    fn request_rejects_bad_colors() {
        let request = CompanyRequest {
            name: "Acme".to_string(),
            primary_color: Some("blue".to_string()),
            secondary_color: None,
            address: None,
            phone_number: None,
            email: None,
            website: None,
            description: None,
        };
        assert!(request.validate().is_err());

        let company = CompanyProfile::from(&CompanyRequest {
            primary_color: Some("#FF0000".to_string()),
            ..request
        });
        assert_eq!(company.primary_color, "#FF0000");
        assert_eq!(company.secondary_color, DEFAULT_SECONDARY_COLOR);
    }
}
