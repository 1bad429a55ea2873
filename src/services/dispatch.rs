//! Types shared by the dispatch path: the validated notification request,
//! the FCM payload built from it, and the normalized provider outcome.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

/// A validated request to notify one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub message: String,
    pub chat_id: Option<String>,
    pub sender_name: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// FCM HTTP v1 `message` object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub notification: PushNotification,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    pub webpush: WebpushConfig,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebpushConfig {
    pub notification: WebpushNotification,
    pub fcm_options: WebpushFcmOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebpushNotification {
    pub icon: String,
    pub badge: String,
    pub actions: Vec<WebpushAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebpushAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebpushFcmOptions {
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AndroidConfig {
    pub priority: String,
    pub notification: AndroidNotification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AndroidNotification {
    pub channel_id: String,
    pub sound: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApnsConfig {
    pub payload: ApnsPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aps {
    pub sound: String,
    pub badge: u32,
}

/// Why a dispatch did not go through. Each kind drives a different reaction
/// in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The provider no longer recognises the device token; evict it.
    InvalidRecipientToken,
    /// Network, timeout, throttling or any other provider-side failure.
    TransientProviderError,
    /// The payload was rejected locally before any network call.
    ValidationError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidRecipientToken => "invalid_recipient_token",
            FailureKind::TransientProviderError => "transient_provider_error",
            FailureKind::ValidationError => "validation_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl DispatchFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_token(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidRecipientToken, detail)
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientProviderError, detail)
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ValidationError, detail)
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.detail)
    }
}

/// Provider message id on success.
pub type DispatchResult = Result<String, DispatchFailure>;

/// A push delivery backend. One `send` performs at most one delivery call.
#[async_trait]
pub trait PushProvider: Send + Sync + 'static {
    async fn send(&self, message: &PushMessage) -> DispatchResult;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

/// Local checks run before anything leaves the process.
pub fn validate_message(message: &PushMessage) -> Result<(), DispatchFailure> {
    if message.token.trim().is_empty() {
        return Err(DispatchFailure::validation("push token is empty"));
    }
    if message.notification.title.trim().is_empty() {
        return Err(DispatchFailure::validation("notification title is empty"));
    }
    if message.notification.body.trim().is_empty() {
        return Err(DispatchFailure::validation("notification body is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushDefaults;
    use crate::services::formatter::MessageFormatter;

    fn message() -> PushMessage {
        let request = NotificationRequest {
            recipient_id: "bob".to_string(),
            sender_id: Some("alice".to_string()),
            message: "hi bob".to_string(),
            chat_id: None,
            sender_name: Some("Alice".to_string()),
            title: None,
            body: None,
        };
        MessageFormatter::new(PushDefaults::default()).format(&request, "device-token")
    }

    #[test]
    fn formatted_message_passes_validation() {
        assert_eq!(validate_message(&message()), Ok(()));
    }

    #[test]
    fn blank_token_is_rejected() {
        let mut msg = message();
        msg.token = "  ".to_string();
        let err = validate_message(&msg).unwrap_err();
        assert_eq!(err.kind, FailureKind::ValidationError);
        assert_eq!(err.detail, "push token is empty");
    }

    #[test]
    fn blank_title_or_body_is_rejected() {
        let mut msg = message();
        msg.notification.title = String::new();
        assert_eq!(
            validate_message(&msg).unwrap_err().detail,
            "notification title is empty"
        );

        let mut msg = message();
        msg.notification.body = "\n".to_string();
        assert_eq!(
            validate_message(&msg).unwrap_err().detail,
            "notification body is empty"
        );
    }

    #[test]
    fn failure_display_names_the_kind() {
        let f = DispatchFailure::transient("FCM request timed out");
        assert_eq!(f.to_string(), "transient_provider_error: FCM request timed out");
    }
}
