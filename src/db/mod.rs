mod role;
mod ticket;
mod token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use role::RoleStore;
pub use ticket::{NewTicket, Ticket, TicketStatus, TicketStore, TicketUpdate};
pub use token::{RefreshTokenRecord, TokenStore};
pub use user::{User, UserStore, UserSummary};

/// Returns true if the error is a UNIQUE constraint violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        if version < 2 {
            self.migrate_v2().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    username TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1,
                    reset_token_hash TEXT,
                    reset_token_expires_at INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_reset_token ON users(reset_token_hash)",
                "CREATE TABLE roles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL
                )",
                // One row per (role, resource, action); order of insertion is the permission order
                "CREATE TABLE role_permissions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                    resource TEXT NOT NULL,
                    action TEXT NOT NULL CHECK (action IN ('create', 'read', 'update', 'delete')),
                    UNIQUE (role_id, resource, action)
                )",
                "CREATE TABLE user_roles (
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                    position INTEGER NOT NULL,
                    PRIMARY KEY (user_id, role_id)
                )",
                // Refresh tokens are rotated: a used token keeps its row with replaced_by set
                // until it expires, so that reuse can be detected.
                "CREATE TABLE refresh_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    jti TEXT UNIQUE NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    issued_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    replaced_by TEXT,
                    revoked_at INTEGER
                )",
                "CREATE INDEX idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
                "CREATE INDEX idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
                "INSERT INTO roles (name) VALUES ('admin'), ('member'), ('viewer')",
                "INSERT INTO role_permissions (role_id, resource, action)
                    SELECT r.id, p.resource, p.action
                    FROM roles r
                    JOIN (
                        SELECT 'tickets' AS resource, 'create' AS action UNION ALL
                        SELECT 'tickets', 'read' UNION ALL
                        SELECT 'tickets', 'update' UNION ALL
                        SELECT 'tickets', 'delete' UNION ALL
                        SELECT 'users', 'create' UNION ALL
                        SELECT 'users', 'read' UNION ALL
                        SELECT 'users', 'update' UNION ALL
                        SELECT 'users', 'delete' UNION ALL
                        SELECT 'roles', 'read'
                    ) p
                    WHERE r.name = 'admin'",
                "INSERT INTO role_permissions (role_id, resource, action)
                    SELECT r.id, p.resource, p.action
                    FROM roles r
                    JOIN (
                        SELECT 'tickets' AS resource, 'create' AS action UNION ALL
                        SELECT 'tickets', 'read' UNION ALL
                        SELECT 'tickets', 'update'
                    ) p
                    WHERE r.name = 'member'",
                "INSERT INTO role_permissions (role_id, resource, action)
                    SELECT id, 'tickets', 'read' FROM roles WHERE name = 'viewer'",
            ],
        )
        .await
    }

    async fn migrate_v2(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            2,
            &[
                "CREATE TABLE tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'open',
                    created_by INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_tickets_updated_at ON tickets(updated_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the role store.
    pub fn roles(&self) -> RoleStore {
        RoleStore::new(self.pool.clone())
    }

    /// Get the refresh token store.
    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.pool.clone())
    }

    /// Get the ticket store.
    pub fn tickets(&self) -> TicketStore {
        TicketStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Action;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create_with_roles("uuid-123", "alice@example.com", "alice", "hash", &[])
            .await
            .unwrap()
            .unwrap();

        let user = db
            .users()
            .get_by_email("ALICE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.uuid, "uuid-123");
        assert_eq!(user.username, "alice");
        assert!(user.active);

        let user = db.users().get_by_uuid("uuid-123").await.unwrap().unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create_with_roles("uuid-1", "alice@example.com", "alice", "hash", &[])
            .await
            .unwrap()
            .unwrap();
        let err = db
            .users()
            .create_with_roles("uuid-2", "alice@example.com", "alice2", "hash", &[])
            .await
            .unwrap_err();

        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_seeded_roles() {
        let db = Database::open(":memory:").await.unwrap();

        let roles = db.roles().list().await.unwrap();
        let names: Vec<_> = roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "member", "viewer"]);

        let viewer = roles.iter().find(|r| r.name == "viewer").unwrap();
        assert_eq!(viewer.permissions.len(), 1);
        assert_eq!(viewer.permissions[0].resource, "tickets");
        assert_eq!(viewer.permissions[0].action, Action::Read);

        let member = roles.iter().find(|r| r.name == "member").unwrap();
        assert!(
            !member
                .permissions
                .iter()
                .any(|p| p.action == Action::Delete)
        );
    }

    #[tokio::test]
    async fn test_user_roles_are_expanded_in_order() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create_with_roles("uuid-1", "alice@example.com", "alice", "hash", &[])
            .await
            .unwrap()
            .unwrap();
        db.roles()
            .set_user_roles(id, &["viewer".to_string(), "member".to_string()])
            .await
            .unwrap();

        let roles = db.roles().for_user(id).await.unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].name, "viewer");
        assert_eq!(roles[1].name, "member");
        assert_eq!(roles[1].permissions.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_permission_rejected() {
        let db = Database::open(":memory:").await.unwrap();

        let result = sqlx::query(
            "INSERT INTO role_permissions (role_id, resource, action)
             SELECT id, 'tickets', 'read' FROM roles WHERE name = 'viewer'",
        )
        .execute(db.pool())
        .await;

        assert!(is_unique_violation(&result.unwrap_err()));
    }

    #[tokio::test]
    async fn test_delete_user_cascades_tokens() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create_with_roles("uuid-1", "alice@example.com", "alice", "hash", &[])
            .await
            .unwrap()
            .unwrap();
        db.tokens().create("jti-1", id, 10, 4_000_000_000).await.unwrap();

        db.users().delete(id).await.unwrap();
        assert!(db.tokens().get_by_jti("jti-1").await.unwrap().is_none());
    }
}
