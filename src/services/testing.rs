//! Test doubles shared by service and route tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Config;
use crate::services::dispatch::{DispatchFailure, DispatchResult, PushMessage, PushProvider};
use crate::services::token_store::MemoryTokenStore;
use crate::AppState;

/// Records every payload and answers with a fixed outcome.
pub struct FakeProvider {
    failure: Option<DispatchFailure>,
    sent: Mutex<Vec<PushMessage>>,
}

impl FakeProvider {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(failure: DispatchFailure) -> Self {
        Self {
            failure: Some(failure),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushProvider for FakeProvider {
    async fn send(&self, message: &PushMessage) -> DispatchResult {
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(format!("msg-{}", sent.len())),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// App state with an in-memory token store and the given provider.
pub fn test_state(provider: FakeProvider) -> (Arc<AppState>, Arc<FakeProvider>) {
    let provider = Arc::new(provider);
    let state = Arc::new(AppState {
        config: Config::default(),
        tokens: Arc::new(MemoryTokenStore::new()),
        push: provider.clone(),
    });
    (state, provider)
}
