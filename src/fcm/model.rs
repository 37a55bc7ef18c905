use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Google service-account key, as downloaded from the Firebase console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub auth_uri: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Load a key from a JSON file on disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid service-account JSON in {}", path.display()))
    }
}

/// Cached OAuth2 access token.
#[derive(Debug, Clone)]
pub struct TokenCache {
    pub access_token: String,
    pub expires_at: i64,
}

/// JWT claims for the OAuth2 service-account assertion.
#[derive(Debug, Serialize)]
pub struct JwtClaims {
    pub iss: String,
    pub sub: String,
    pub scope: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// Request envelope for the FCM HTTP v1 `messages:send` endpoint.
#[derive(Debug, Serialize)]
pub struct FcmMessage {
    pub message: FcmMessageContent,
}

#[derive(Debug, Serialize)]
pub struct FcmMessageContent {
    pub token: String,
    pub notification: FcmNotification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

/// Response from `messages:send`; `name` is the server-assigned message id.
#[derive(Debug, Deserialize)]
pub struct FcmApiResponse {
    pub name: Option<String>,
}

/// Per-token outcome inside a fan-out report. Callers generally only look at
/// the counts on [`SendReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub token: String,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregated result of one multi-token send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub outcomes: Vec<SendOutcome>,
}

impl SendReport {
    pub fn from_outcomes(outcomes: Vec<SendOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.error.is_none()).count();
        Self {
            success_count,
            failure_count: outcomes.len() - success_count,
            outcomes,
        }
    }
}
