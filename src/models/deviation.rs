use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DeviationCategory {
    Safety,
    Quality,
    Environment,
    Equipment,
    Process,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DeviationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DeviationStatus {
    Reported,
    UnderReview,
    InProgress,
    Resolved,
    Closed,
}

impl DeviationStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, DeviationStatus::Resolved | DeviationStatus::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviationComment {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "mediaURLs")]
    pub media_urls: Vec<String>,
}

/// The `deviations/{id}` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deviation {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: DeviationCategory,
    pub severity: DeviationSeverity,
    pub status: DeviationStatus,
    pub reported_by: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub company_id: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "mediaURLs")]
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Vec<DeviationComment>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Deviation {
    pub fn media_blob_path(company_id: &str, deviation_id: &str, media_id: &str, file_type: &str) -> String {
        format!("companies/{}/deviations/{}/{}.{}", company_id, deviation_id, media_id, file_type)
    }

    /// Moves to `status`, keeping `resolved_at` in step with it.
    pub fn transition(&mut self, status: DeviationStatus, now: DateTime<Utc>) {
        if status.is_finished() {
            if !self.status.is_finished() {
                self.resolved_at = Some(now);
            }
        } else {
            self.resolved_at = None;
        }
        self.status = status;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviationRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub category: DeviationCategory,
    pub severity: DeviationSeverity,
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviationStatusRequest {
    pub status: DeviationStatus,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct DeviationCommentRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviationMediaRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    /// File content, standard base64.
    pub content_base64: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_deviation;
    use chrono::Duration;

    #[test]
    fn resolving_sets_resolved_at_once() {
        let mut deviation = sample_deviation("d1", "c1", "u1");
        let t1 = Utc::now();
        deviation.transition(DeviationStatus::Resolved, t1);
        assert_eq!(deviation.resolved_at, Some(t1));

        let t2 = t1 + Duration::minutes(5);
        deviation.transition(DeviationStatus::Closed, t2);
        assert_eq!(deviation.resolved_at, Some(t1));
        assert_eq!(deviation.updated_at, t2);
    }

    #[test]
    fn reopening_clears_resolved_at() {
        let mut deviation = sample_deviation("d1", "c1", "u1");
        deviation.transition(DeviationStatus::Closed, Utc::now());
        deviation.transition(DeviationStatus::InProgress, Utc::now());
        assert!(deviation.resolved_at.is_none());
        assert_eq!(deviation.status, DeviationStatus::InProgress);
    }

    #[test]
    fn status_uses_camel_case() {
        assert_eq!(serde_json::to_string(&DeviationStatus::UnderReview).unwrap(), "\"underReview\"");
        assert!(DeviationSeverity::Critical > DeviationSeverity::High);
    }
}
