use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::services::dispatch::NotificationRequest;
use crate::services::notifications::NotificationService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/save-token",
            post(save_token).fallback(method_not_allowed),
        )
        .route(
            "/send-notification",
            post(send_notification).fallback(method_not_allowed),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTokenRequest {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTokenResponse {
    pub success: bool,
    pub tokens_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub recipient_id: Option<String>,
    pub sender_id: Option<String>,
    pub message: Option<String>,
    pub chat_id: Option<String>,
    pub sender_name: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationResponse {
    pub success: bool,
    pub message_id: String,
}

/// Blank strings count as absent.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    present(value).ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))
}

impl SendNotificationRequest {
    fn validate(self) -> AppResult<NotificationRequest> {
        Ok(NotificationRequest {
            recipient_id: required(self.recipient_id, "recipientId")?,
            message: required(self.message, "message")?,
            sender_id: present(self.sender_id),
            chat_id: present(self.chat_id),
            sender_name: present(self.sender_name),
            title: present(self.title),
            body: present(self.body),
        })
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Register (or replace) the push token for a user
async fn save_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SaveTokenRequest>, JsonRejection>,
) -> AppResult<Json<SaveTokenResponse>> {
    let body = json_body(payload)?;
    let user_id = required(body.user_id, "userId")?;
    let token = required(body.token, "token")?;

    let tokens_count = NotificationService::new(&state)
        .register(&user_id, &token)
        .await?;

    Ok(Json(SaveTokenResponse {
        success: true,
        tokens_count,
    }))
}

/// Push a chat notification to the recipient's registered device
async fn send_notification(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SendNotificationRequest>, JsonRejection>,
) -> AppResult<Json<SendNotificationResponse>> {
    let request = json_body(payload)?.validate()?;

    let message_id = NotificationService::new(&state).send(&request).await?;

    Ok(Json(SendNotificationResponse {
        success: true,
        message_id,
    }))
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
