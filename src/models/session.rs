use crate::models::company::CompanyProfile;
use crate::models::user::UserProfile;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where the synchronizer is in its fetch chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    LoggedOut,
    LoadingProfile,
    LoadingCompany,
    Authenticated,
}

impl SessionPhase {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionPhase::LoadingProfile | SessionPhase::LoadingCompany)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionPhase::LoadingCompany | SessionPhase::Authenticated)
    }
}

/// Published session state. Only the synchronizer's listener task writes the
/// phase and profile fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub current_user_id: Option<String>,
    pub current_user: Option<UserProfile>,
    pub current_company: Option<CompanyProfile>,
    pub last_error: Option<String>,
    /// Identity the listener last observed, acknowledged before any fetch starts.
    pub observed_identity_id: Option<String>,
    /// Number of identity events the listener has picked up, repeats included.
    pub observed_events: u64,
    pub auth_calls_in_flight: u32,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.phase.is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.phase.is_loading() || self.auth_calls_in_flight > 0
    }
}

/// Wire shape of the session for presentation clients.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub phase: SessionPhase,
    pub current_user_id: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub current_user: Option<UserProfile>,
    pub current_company: Option<CompanyProfile>,
    pub last_error: Option<String>,
}

impl From<&SessionSnapshot> for SessionResponse {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            phase: snapshot.phase,
            current_user_id: snapshot.current_user_id.clone(),
            is_authenticated: snapshot.is_authenticated(),
            is_loading: snapshot.is_loading(),
            current_user: snapshot.current_user.clone(),
            current_company: snapshot.current_company.clone(),
            last_error: snapshot.last_error.clone(),
        }
    }
}
