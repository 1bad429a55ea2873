use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Association between an application user and their current push token.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Registration {
    pub user_id: String,
    pub token: String,
    pub created_at: NaiveDateTime,
}

impl Registration {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}
