use std::collections::BTreeMap;

use crate::config::PushDefaults;
use crate::services::dispatch::{
    AndroidConfig, AndroidNotification, ApnsConfig, ApnsPayload, Aps, NotificationRequest,
    PushMessage, PushNotification, WebpushAction, WebpushConfig, WebpushFcmOptions,
    WebpushNotification,
};

/// Bodies longer than this many characters are cut and suffixed with `...`.
pub const MAX_BODY_CHARS: usize = 50;
const ELLIPSIS: &str = "...";

/// Cut `text` to `MAX_BODY_CHARS` characters, appending an ellipsis when cut.
pub fn truncate_body(text: &str) -> String {
    match text.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => format!("{}{}", &text[..idx], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Builds FCM payloads with the static platform defaults from configuration.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    defaults: PushDefaults,
}

impl MessageFormatter {
    pub fn new(defaults: PushDefaults) -> Self {
        Self { defaults }
    }

    pub fn format(&self, request: &NotificationRequest, token: &str) -> PushMessage {
        let title = match (&request.title, &request.sender_name) {
            (Some(title), _) => title.clone(),
            (None, Some(sender)) => format!("New message from {}", sender),
            (None, None) => "New message".to_string(),
        };
        let body = truncate_body(request.body.as_deref().unwrap_or(&request.message));

        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "chat_message".to_string());
        if let Some(chat_id) = &request.chat_id {
            data.insert("chatId".to_string(), chat_id.clone());
        }
        if let Some(sender_id) = &request.sender_id {
            data.insert("senderId".to_string(), sender_id.clone());
        }
        if let Some(sender_name) = &request.sender_name {
            data.insert("senderName".to_string(), sender_name.clone());
        }

        PushMessage {
            token: token.to_string(),
            notification: PushNotification { title, body },
            data,
            webpush: WebpushConfig {
                notification: WebpushNotification {
                    icon: self.defaults.icon_url.clone(),
                    badge: self.defaults.badge_url.clone(),
                    actions: vec![
                        WebpushAction {
                            action: "open".to_string(),
                            title: "Open".to_string(),
                        },
                        WebpushAction {
                            action: "dismiss".to_string(),
                            title: "Dismiss".to_string(),
                        },
                    ],
                },
                fcm_options: WebpushFcmOptions {
                    link: self.click_link(request.chat_id.as_deref()),
                },
            },
            android: AndroidConfig {
                priority: "high".to_string(),
                notification: AndroidNotification {
                    channel_id: self.defaults.android_channel_id.clone(),
                    sound: "default".to_string(),
                },
            },
            apns: ApnsConfig {
                payload: ApnsPayload {
                    aps: Aps {
                        sound: "default".to_string(),
                        badge: 1,
                    },
                },
            },
        }
    }

    fn click_link(&self, chat_id: Option<&str>) -> String {
        let base = self.defaults.app_url.trim_end_matches('/');
        match chat_id {
            Some(id) => format!("{}/chat/{}", base, id),
            None => base.to_string(),
        }
    }
}
