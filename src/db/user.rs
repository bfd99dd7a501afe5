use sqlx::sqlite::SqlitePool;

use super::role::assign_roles;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub active: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    email: String,
    username: String,
    password_hash: String,
    active: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            active: row.active != 0,
        }
    }
}

/// Public user summary for the admin endpoints. Does not expose internal database IDs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserSummary {
    pub uuid: String,
    pub email: String,
    pub username: String,
    pub active: bool,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct UserSummaryRow {
    uuid: String,
    email: String,
    username: String,
    active: i32,
    created_at: String,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(row: UserSummaryRow) -> Self {
        Self {
            uuid: row.uuid,
            email: row.email,
            username: row.username,
            active: row.active != 0,
            created_at: row.created_at,
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new active user holding the named roles, in one transaction.
    /// Returns None (and creates nothing) if a role name is unknown.
    pub async fn create_with_roles(
        &self,
        uuid: &str,
        email: &str,
        username: &str,
        password_hash: &str,
        roles: &[String],
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO users (uuid, email, username, password_hash, active) VALUES (?, ?, ?, ?, 1)",
        )
        .bind(uuid)
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if !assign_roles(&mut tx, id, roles).await? {
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(id))
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, username, password_hash, active FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, username, password_hash, active FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, username, password_hash, active FROM users WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Set the active flag for a user.
    pub async fn set_active(&self, id: i64, active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET active = ? WHERE id = ?")
            .bind(active as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all users. Does not expose internal IDs.
    pub async fn list(&self) -> Result<Vec<UserSummary>, sqlx::Error> {
        let rows: Vec<UserSummaryRow> = sqlx::query_as(
            "SELECT uuid, email, username, active, created_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    /// Store a password reset token hash, replacing any previous one.
    pub async fn set_reset_token(
        &self,
        id: i64,
        token_hash: &str,
        expires_at: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET reset_token_hash = ?, reset_token_expires_at = ? WHERE id = ?")
            .bind(token_hash)
            .bind(expires_at as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Find the user holding an unexpired reset token.
    pub async fn get_by_reset_token(
        &self,
        token_hash: &str,
        now: u64,
    ) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, username, password_hash, active FROM users
             WHERE reset_token_hash = ? AND reset_token_expires_at > ?",
        )
        .bind(token_hash)
        .bind(now as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Consume a reset token and set the new password in a single statement.
    /// Returns the user ID, or None if the token is unknown, expired or already used.
    pub async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: u64,
        password_hash: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE users
             SET password_hash = ?, reset_token_hash = NULL, reset_token_expires_at = NULL
             WHERE reset_token_hash = ? AND reset_token_expires_at > ?
             RETURNING id",
        )
        .bind(password_hash)
        .bind(token_hash)
        .bind(now as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Clear reset tokens that expired before `now`.
    pub async fn clear_expired_reset_tokens(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET reset_token_hash = NULL, reset_token_expires_at = NULL
             WHERE reset_token_expires_at IS NOT NULL AND reset_token_expires_at <= ?",
        )
        .bind(now as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
