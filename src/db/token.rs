//! Refresh token storage for rotation, reuse detection and revocation.
//!
//! Only refresh tokens are stored in the database. Access tokens are stateless
//! and short-lived.

use sqlx::sqlite::SqlitePool;

/// A refresh token record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub jti: String,
    pub user_id: i64,
    pub issued_at: i64,
    pub expires_at: i64,
    /// JTI of the token this one was exchanged for
    pub replaced_by: Option<String>,
    pub revoked_at: Option<i64>,
}

impl RefreshTokenRecord {
    /// A token that was already exchanged or revoked must not be presented again.
    pub fn is_spent(&self) -> bool {
        self.replaced_by.is_some() || self.revoked_at.is_some()
    }
}

/// Store for managing refresh tokens.
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new refresh token record.
    pub async fn create(
        &self,
        jti: &str,
        user_id: i64,
        issued_at: u64,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (jti, user_id, issued_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(issued_at as i64)
        .bind(expires_at as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a token record by its JWT ID.
    pub async fn get_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, jti, user_id, issued_at, expires_at, replaced_by, revoked_at
             FROM refresh_tokens WHERE jti = ?",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
    }

    /// Exchange `old_jti` for a new token record in one transaction.
    ///
    /// Returns false if the old token was already spent (another exchange won the race).
    pub async fn rotate(
        &self,
        old_jti: &str,
        new_jti: &str,
        user_id: i64,
        issued_at: u64,
        expires_at: u64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query(
            "UPDATE refresh_tokens SET replaced_by = ?
             WHERE jti = ? AND replaced_by IS NULL AND revoked_at IS NULL",
        )
        .bind(new_jti)
        .bind(old_jti)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO refresh_tokens (jti, user_id, issued_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(new_jti)
        .bind(user_id)
        .bind(issued_at as i64)
        .bind(expires_at as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete a token by its JWT ID (logout).
    pub async fn delete_by_jti(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE jti = ?")
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every live token of a user (reuse detected, password changed).
    pub async fn revoke_all_by_user(&self, user_id: i64, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(now as i64)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete all tokens that expired at or before `now`.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Count tokens of a user that can still be exchanged.
    pub async fn count_live_by_user(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_tokens
             WHERE user_id = ? AND replaced_by IS NULL AND revoked_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create_with_roles("uuid-1", "alice@example.com", "alice", "hash", &[])
            .await
            .unwrap()
            .unwrap();
        (db, id)
    }

    #[tokio::test]
    async fn test_rotate_marks_old_and_creates_new() {
        let (db, id) = setup().await;
        db.tokens().create("old", id, 10, 1000).await.unwrap();

        assert!(db.tokens().rotate("old", "new", id, 20, 1010).await.unwrap());

        let old = db.tokens().get_by_jti("old").await.unwrap().unwrap();
        assert_eq!(old.replaced_by.as_deref(), Some("new"));
        assert!(old.is_spent());

        let new = db.tokens().get_by_jti("new").await.unwrap().unwrap();
        assert!(!new.is_spent());
        assert_eq!(new.expires_at, 1010);
    }

    #[tokio::test]
    async fn test_rotate_spent_token_fails() {
        let (db, id) = setup().await;
        db.tokens().create("old", id, 10, 1000).await.unwrap();
        db.tokens().rotate("old", "new-1", id, 20, 1010).await.unwrap();

        assert!(!db.tokens().rotate("old", "new-2", id, 30, 1020).await.unwrap());
        assert!(db.tokens().get_by_jti("new-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_all_by_user() {
        let (db, id) = setup().await;
        db.tokens().create("a", id, 10, 1000).await.unwrap();
        db.tokens().create("b", id, 10, 1000).await.unwrap();
        assert_eq!(db.tokens().count_live_by_user(id).await.unwrap(), 2);

        assert_eq!(db.tokens().revoke_all_by_user(id, 50).await.unwrap(), 2);
        assert_eq!(db.tokens().count_live_by_user(id).await.unwrap(), 0);
        assert_eq!(
            db.tokens().get_by_jti("a").await.unwrap().unwrap().revoked_at,
            Some(50)
        );
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (db, id) = setup().await;
        db.tokens().create("old", id, 10, 100).await.unwrap();
        db.tokens().create("fresh", id, 10, 1000).await.unwrap();

        assert_eq!(db.tokens().delete_expired(100).await.unwrap(), 1);
        assert!(db.tokens().get_by_jti("old").await.unwrap().is_none());
        assert!(db.tokens().get_by_jti("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_jti() {
        let (db, id) = setup().await;
        db.tokens().create("a", id, 10, 1000).await.unwrap();

        assert!(db.tokens().delete_by_jti("a").await.unwrap());
        assert!(!db.tokens().delete_by_jti("a").await.unwrap());
    }
}
