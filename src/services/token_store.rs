use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::db::{Registration, RegistrationRepository};
use crate::error::AppResult;

/// Storage for user → push token registrations.
///
/// Implementations must tolerate concurrent calls from many request handlers.
/// All mutations are single-key, so no cross-key ordering is required.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Record `token` for `user_id`, replacing any previous token.
    async fn register(&self, user_id: &str, token: &str) -> AppResult<()>;

    /// Current token for `user_id`, or `None` if the user never registered
    /// (or their token was evicted).
    async fn lookup(&self, user_id: &str) -> AppResult<Option<String>>;

    /// Forget the registration for `user_id`. Removing an unknown user is a no-op.
    async fn remove(&self, user_id: &str) -> AppResult<()>;

    /// Number of users with a registered token.
    async fn count(&self) -> AppResult<usize>;
}

/// Process-local store. Registrations are lost on restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    registrations: RwLock<HashMap<String, Registration>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn register(&self, user_id: &str, token: &str) -> AppResult<()> {
        let mut guard = self.registrations.write().await;
        guard.insert(user_id.to_string(), Registration::new(user_id, token));
        Ok(())
    }

    async fn lookup(&self, user_id: &str) -> AppResult<Option<String>> {
        let guard = self.registrations.read().await;
        Ok(guard.get(user_id).map(|r| r.token.clone()))
    }

    async fn remove(&self, user_id: &str) -> AppResult<()> {
        self.registrations.write().await.remove(user_id);
        Ok(())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.registrations.read().await.len())
    }
}

/// SQLite-backed store; registrations survive restarts.
#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn register(&self, user_id: &str, token: &str) -> AppResult<()> {
        RegistrationRepository::upsert(&self.pool, &Registration::new(user_id, token)).await
    }

    async fn lookup(&self, user_id: &str) -> AppResult<Option<String>> {
        Ok(RegistrationRepository::find_by_user_id(&self.pool, user_id)
            .await?
            .map(|r| r.token))
    }

    async fn remove(&self, user_id: &str) -> AppResult<()> {
        RegistrationRepository::delete(&self.pool, user_id).await
    }

    async fn count(&self) -> AppResult<usize> {
        let n = RegistrationRepository::count(&self.pool).await?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

/// Shorten a push token for log output.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}…", prefix)
    } else {
        prefix
    }
}
