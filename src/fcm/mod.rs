use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::model::EventNotification;

pub mod model;

pub use model::{SendOutcome, SendReport, ServiceAccountKey};

use model::{
    FcmApiResponse, FcmMessage, FcmMessageContent, FcmNotification, GoogleTokenResponse,
    JwtClaims, TokenCache,
};

const FCM_API_BASE: &str = "https://fcm.googleapis.com/";
const FCM_OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// How many `messages:send` requests are in flight at once during a fan-out.
const SEND_CONCURRENCY: usize = 8;

/// The seam between the notifier and the push infrastructure. One call per
/// trigger invocation; implementations own whatever per-token mechanics the
/// backing service requires.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    async fn send_to_devices(
        &self,
        tokens: &[String],
        message: &EventNotification,
    ) -> Result<SendReport>;
}

/// Firebase Cloud Messaging HTTP v1 client.
///
/// Signs a service-account JWT, exchanges it for an OAuth2 access token
/// (cached until shortly before expiry), and fans a notification out to
/// device tokens via per-token `messages:send` calls.
#[derive(Clone)]
pub struct FcmClient {
    http: Client,
    base_url: Url,
    project_id: String,
    credentials: Arc<ServiceAccountKey>,
    token_cache: Arc<Mutex<Option<TokenCache>>>,
}

impl fmt::Debug for FcmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmClient")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl FcmClient {
    pub fn new(project_id: String, credentials: ServiceAccountKey) -> Self {
        let base_url = Url::parse(FCM_API_BASE).expect("valid default FCM URL");
        Self::with_base_url(project_id, credentials, base_url)
    }

    /// The token endpoint comes from `credentials.token_uri`, so tests can
    /// point both the API and the OAuth2 exchange at a local stub.
    pub fn with_base_url(
        project_id: String,
        credentials: ServiceAccountKey,
        base_url: Url,
    ) -> Self {
        let http = Client::builder()
            .user_agent("event-herald/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            project_id,
            credentials: Arc::new(credentials),
            token_cache: Arc::new(Mutex::new(None)),
        }
    }

    fn send_endpoint(&self) -> Result<Url> {
        self.base_url
            .join(&format!("v1/projects/{}/messages:send", self.project_id))
            .context("invalid FCM base URL")
    }

    /// Get an OAuth2 access token, reusing the cached one while it has at
    /// least a minute of validity left.
    pub async fn access_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.lock().expect("token cache lock poisoned");
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Utc::now().timestamp() + 60 {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let now = Utc::now();
        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            sub: self.credentials.client_email.clone(),
            scope: FCM_OAUTH_SCOPE.to_string(),
            aud: self.credentials.token_uri.clone(),
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .context("failed to parse service-account private key")?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .context("failed to sign OAuth2 assertion")?;

        let params = [
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ];
        let res = self
            .http
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .context("failed to reach OAuth2 token endpoint")?;

        if !res.status().is_success() {
            return Err(anyhow!(
                "token request failed with status {}",
                res.status()
            ));
        }

        let token: GoogleTokenResponse = res
            .json()
            .await
            .context("invalid OAuth2 token response")?;

        let expires_at = Utc::now().timestamp() + token.expires_in;
        {
            let mut cache = self.token_cache.lock().expect("token cache lock poisoned");
            *cache = Some(TokenCache {
                access_token: token.access_token.clone(),
                expires_at,
            });
        }
        Ok(token.access_token)
    }

    async fn send_one(
        &self,
        access_token: &str,
        device_token: &str,
        message: &EventNotification,
    ) -> Result<String> {
        let endpoint = self.send_endpoint()?;
        let body = build_message(device_token, message);
        let res = self
            .http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&body)
            .send()
            .await
            .context("failed to reach FCM")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from FCM: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("fcm error {}: {}", status, body));
        }

        let payload: FcmApiResponse =
            res.json().await.context("invalid FCM response JSON")?;
        Ok(payload.name.unwrap_or_default())
    }
}

#[async_trait]
impl PushDelivery for FcmClient {
    async fn send_to_devices(
        &self,
        tokens: &[String],
        message: &EventNotification,
    ) -> Result<SendReport> {
        use futures::stream::{self, StreamExt};

        // A failed token exchange fails the whole send: nothing was delivered
        // and the caller gets one error to log.
        let access_token = self.access_token().await?;

        let this = &*self;
        let message = &*message;
        let access_token = access_token.as_str();
        let outcomes: Vec<SendOutcome> = stream::iter(tokens.iter().cloned())
            .map(move |token| async move {
                match this.send_one(access_token, &token, message).await {
                    Ok(message_id) => {
                        debug!(%token, %message_id, "fcm send ok");
                        SendOutcome {
                            token,
                            message_id: Some(message_id),
                            error: None,
                        }
                    }
                    Err(err) => {
                        warn!(%token, ?err, "fcm send failed");
                        SendOutcome {
                            token,
                            message_id: None,
                            error: Some(err.to_string()),
                        }
                    }
                }
            })
            .buffered(SEND_CONCURRENCY)
            .collect()
            .await;

        Ok(SendReport::from_outcomes(outcomes))
    }
}

/// Build the v1 request envelope for one device token.
pub fn build_message(device_token: &str, message: &EventNotification) -> FcmMessage {
    FcmMessage {
        message: FcmMessageContent {
            token: device_token.to_string(),
            notification: FcmNotification {
                title: message.title.clone(),
                body: message.body.clone(),
            },
            data: Some(message.data.clone()),
        },
    }
}
