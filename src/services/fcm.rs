use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::FcmConfig;
use crate::error::{AppError, AppResult};
use crate::services::dispatch::{
    validate_message, DispatchFailure, DispatchResult, PushMessage, PushProvider,
};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// The subset of a Google service-account key file we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &str) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to read service account key {}: {}",
                path,
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to parse service account key {}: {}",
                path,
                e
            ))
        })
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    const REFRESH_MARGIN_SECS: i64 = 60;

    fn is_fresh(&self) -> bool {
        self.expires_at - Duration::seconds(Self::REFRESH_MARGIN_SECS) > Utc::now()
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: &'a PushMessage,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FcmErrorEnvelope {
    error: FcmErrorBody,
}

#[derive(Debug, Deserialize)]
struct FcmErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "fieldViolations", default)]
    field_violations: Vec<FieldViolation>,
}

#[derive(Debug, Deserialize)]
struct FieldViolation {
    #[serde(default)]
    field: String,
}

/// Firebase Cloud Messaging HTTP v1 client.
#[derive(Clone)]
pub struct FcmService {
    client: Client,
    api_url: String,
    project_id: String,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    access_token: Arc<RwLock<Option<AccessToken>>>,
}

impl FcmService {
    pub fn new(config: &FcmConfig) -> AppResult<Self> {
        let key = ServiceAccountKey::from_file(&config.service_account_path)?;
        Self::from_key(key, config)
    }

    pub fn from_key(key: ServiceAccountKey, config: &FcmConfig) -> AppResult<Self> {
        let project_id = config
            .project_id
            .clone()
            .or(key.project_id)
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "No FCM project id in service account key or FCM_PROJECT_ID"
                ))
            })?;

        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Invalid service account private key: {}", e))
        })?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        tracing::info!(
            "FCM client initialized for project {} as {}",
            project_id,
            key.client_email
        );

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            project_id,
            client_email: key.client_email,
            token_uri: key.token_uri,
            signing_key,
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/projects/{}/messages:send", self.api_url, self.project_id)
    }

    /// Exchange a signed service-account assertion for an OAuth2 access token.
    async fn fetch_access_token(&self) -> AppResult<AccessToken> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: FCM_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| AppError::Provider(format!("Failed to sign FCM assertion: {}", e)))?;

        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to get FCM access token: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Google OAuth error ({}): {}",
                status, error_text
            )));
        }

        let token_response: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse token response: {}", e)))?;

        let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);
        tracing::info!("Refreshed FCM access token; expires at {}", expires_at);

        Ok(AccessToken {
            token: token_response.access_token,
            expires_at,
        })
    }

    /// Cached access token, refreshed when it would expire within a minute.
    ///
    /// Refreshing happens under the write lock, so concurrent callers that
    /// find the cache stale wait for a single exchange instead of each
    /// minting their own token.
    async fn get_valid_access_token(&self) -> AppResult<String> {
        {
            let guard = self.access_token.read().await;
            if let Some(t) = guard.as_ref().filter(|t| t.is_fresh()) {
                return Ok(t.token.clone());
            }
        }

        let mut guard = self.access_token.write().await;
        if let Some(t) = guard.as_ref().filter(|t| t.is_fresh()) {
            return Ok(t.token.clone());
        }

        let fresh = self.fetch_access_token().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    async fn invalidate_access_token(&self) {
        *self.access_token.write().await = None;
    }
}

#[async_trait]
impl PushProvider for FcmService {
    async fn send(&self, message: &PushMessage) -> DispatchResult {
        validate_message(message)?;

        let access_token = self
            .get_valid_access_token()
            .await
            .map_err(|e| DispatchFailure::transient(e.to_string()))?;

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&SendRequest { message })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchFailure::transient("FCM request timed out")
                } else {
                    DispatchFailure::transient(format!("Failed to reach FCM: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response.json().await.map_err(|e| {
                DispatchFailure::transient(format!("Failed to parse FCM response: {}", e))
            })?;
            return Ok(message_id_from_name(&sent.name));
        }

        if status == StatusCode::UNAUTHORIZED {
            // Next send will mint a fresh token.
            self.invalidate_access_token().await;
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(classify_error(status, &error_text))
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

/// `projects/{project}/messages/{id}` → `{id}`
fn message_id_from_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

/// Map an FCM error response onto the dispatch failure kinds.
fn classify_error(status: StatusCode, body: &str) -> DispatchFailure {
    let parsed = serde_json::from_str::<FcmErrorEnvelope>(body).ok();

    if let Some(ref envelope) = parsed {
        let err = &envelope.error;
        let unregistered = err
            .details
            .iter()
            .any(|d| d.error_code.as_deref() == Some("UNREGISTERED"));
        let bad_token = err.status == "INVALID_ARGUMENT"
            && err
                .details
                .iter()
                .flat_map(|d| d.field_violations.iter())
                .any(|v| v.field == "message.token");

        if unregistered || bad_token || status == StatusCode::NOT_FOUND {
            return DispatchFailure::invalid_token(format!(
                "FCM rejected token ({}): {}",
                status, err.message
            ));
        }

        return DispatchFailure::transient(format!("FCM error ({}): {}", status, err.message));
    }

    if status == StatusCode::NOT_FOUND {
        return DispatchFailure::invalid_token(format!("FCM rejected token ({})", status));
    }

    DispatchFailure::transient(format!("FCM error ({}): {}", status, body))
}
