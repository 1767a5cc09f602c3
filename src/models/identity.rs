use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What the identity provider reports about the signed-in account. The
/// synchronizer only relies on `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Identity {
    pub id: String,
    pub email: String,
}
