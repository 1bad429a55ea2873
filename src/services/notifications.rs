use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::dispatch::{FailureKind, NotificationRequest, PushProvider};
use crate::services::formatter::MessageFormatter;
use crate::services::token_store::{redact_token, TokenStore};
use crate::AppState;

/// Registration and dispatch of push notifications.
pub struct NotificationService {
    tokens: Arc<dyn TokenStore>,
    provider: Arc<dyn PushProvider>,
    formatter: MessageFormatter,
}

impl NotificationService {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            tokens: state.tokens.clone(),
            provider: state.push.clone(),
            formatter: MessageFormatter::new(state.config.push.clone()),
        }
    }

    /// Record the device token for a user and return how many users have a token.
    pub async fn register(&self, user_id: &str, token: &str) -> AppResult<usize> {
        self.tokens.register(user_id, token).await?;
        let count = self.tokens.count().await?;

        tracing::info!(
            user_id = %user_id,
            token = %redact_token(token),
            tokens_count = count,
            "Registered push token"
        );

        Ok(count)
    }

    /// Look up the recipient's token, format the payload and hand it to the provider.
    ///
    /// Returns the provider message id. A token the provider reports as invalid
    /// is evicted and the request is reported as not found.
    pub async fn send(&self, request: &NotificationRequest) -> AppResult<String> {
        let dispatch_id = Uuid::new_v4();

        let token = match self.tokens.lookup(&request.recipient_id).await? {
            Some(token) => token,
            None => {
                tracing::info!(
                    %dispatch_id,
                    recipient_id = %request.recipient_id,
                    "No push token registered for recipient"
                );
                return Err(AppError::NotFound(format!(
                    "No push token registered for user {}",
                    request.recipient_id
                )));
            }
        };

        let payload = self.formatter.format(request, &token);

        tracing::debug!(
            %dispatch_id,
            provider = self.provider.name(),
            recipient_id = %request.recipient_id,
            token = %redact_token(&token),
            "Dispatching push notification"
        );

        match self.provider.send(&payload).await {
            Ok(message_id) => {
                tracing::info!(
                    %dispatch_id,
                    recipient_id = %request.recipient_id,
                    message_id = %message_id,
                    "Push notification sent"
                );
                Ok(message_id)
            }
            Err(failure) => match failure.kind {
                FailureKind::InvalidRecipientToken => {
                    tracing::warn!(
                        %dispatch_id,
                        recipient_id = %request.recipient_id,
                        token = %redact_token(&token),
                        "Provider rejected push token, removing registration: {}",
                        failure.detail
                    );
                    self.tokens.remove(&request.recipient_id).await?;
                    Err(AppError::NotFound(format!(
                        "Push token for user {} is no longer valid",
                        request.recipient_id
                    )))
                }
                FailureKind::ValidationError => {
                    tracing::warn!(%dispatch_id, "Push payload rejected: {}", failure.detail);
                    Err(AppError::BadRequest(failure.detail))
                }
                FailureKind::TransientProviderError => {
                    tracing::error!(
                        %dispatch_id,
                        recipient_id = %request.recipient_id,
                        "Push dispatch failed: {}",
                        failure.detail
                    );
                    Err(AppError::Provider(failure.detail))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dispatch::DispatchFailure;
    use crate::services::testing::{test_state, FakeProvider};

    fn request(recipient: &str, message: &str) -> NotificationRequest {
        NotificationRequest {
            recipient_id: recipient.to_string(),
            sender_id: Some("alice".to_string()),
            message: message.to_string(),
            chat_id: Some("c1".to_string()),
            sender_name: Some("Alice".to_string()),
            title: None,
            body: None,
        }
    }

    #[tokio::test]
    async fn register_reports_token_count() {
        let (state, _provider) = test_state(FakeProvider::succeeding());
        let service = NotificationService::new(&state);

        assert_eq!(service.register("bob", "t1").await.unwrap(), 1);
        assert_eq!(service.register("bob", "t2").await.unwrap(), 1);
        assert_eq!(service.register("carol", "t3").await.unwrap(), 2);
        assert_eq!(state.tokens.lookup("bob").await.unwrap().as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn send_without_registration_is_not_found_and_skips_provider() {
        let (state, provider) = test_state(FakeProvider::succeeding());
        let service = NotificationService::new(&state);

        let err = service.send(&request("ghost", "hi")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(provider.sent().is_empty());
    }

    #[tokio::test]
    async fn send_formats_and_dispatches_once() {
        let (state, provider) = test_state(FakeProvider::succeeding());
        let service = NotificationService::new(&state);
        service.register("bob", "device-token").await.unwrap();

        let long = "m".repeat(80);
        let id = service.send(&request("bob", &long)).await.unwrap();
        assert_eq!(id, "msg-1");

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].token, "device-token");
        assert!(sent[0].notification.body.chars().count() <= 53);
    }

    #[tokio::test]
    async fn invalid_token_evicts_registration() {
        let (state, provider) = test_state(FakeProvider::failing(DispatchFailure::invalid_token(
            "UNREGISTERED",
        )));
        let service = NotificationService::new(&state);
        service.register("bob", "stale").await.unwrap();

        let err = service.send(&request("bob", "hi")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(state.tokens.lookup("bob").await.unwrap(), None);
        assert_eq!(provider.sent().len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_keeps_registration() {
        let (state, _provider) = test_state(FakeProvider::failing(DispatchFailure::transient(
            "FCM error (503)",
        )));
        let service = NotificationService::new(&state);
        service.register("bob", "tok").await.unwrap();

        let err = service.send(&request("bob", "hi")).await.unwrap_err();
        match err {
            AppError::Provider(detail) => assert_eq!(detail, "FCM error (503)"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(state.tokens.lookup("bob").await.unwrap().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn validation_failure_is_bad_request() {
        let (state, _provider) = test_state(FakeProvider::failing(DispatchFailure::validation(
            "notification body is empty",
        )));
        let service = NotificationService::new(&state);
        service.register("bob", "tok").await.unwrap();

        let err = service.send(&request("bob", "hi")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
