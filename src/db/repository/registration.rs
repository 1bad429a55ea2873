use crate::db::models::Registration;
use crate::error::{AppError, AppResult};
use sqlx::SqlitePool;

pub struct RegistrationRepository;

impl RegistrationRepository {
    /// Insert or replace the token for a user (last write wins)
    pub async fn upsert(pool: &SqlitePool, registration: &Registration) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO push_registrations (user_id, token, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                token = excluded.token,
                created_at = excluded.created_at
            "#,
        )
        .bind(&registration.user_id)
        .bind(&registration.token)
        .bind(registration.created_at)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Option<Registration>> {
        sqlx::query_as::<_, Registration>(
            r#"
            SELECT
                user_id,
                token,
                created_at
            FROM push_registrations
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete(pool: &SqlitePool, user_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM push_registrations WHERE user_id = ?")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn count(pool: &SqlitePool) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM push_registrations")
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }
}
