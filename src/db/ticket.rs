use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct TicketStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Done,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Done => "done",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "in_progress" => TicketStatus::InProgress,
            "done" => TicketStatus::Done,
            _ => TicketStatus::Open,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub uuid: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    /// UUID of the user who created the ticket
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    uuid: String,
    title: String,
    description: String,
    status: String,
    created_by: String,
    created_at: i64,
    updated_at: i64,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Self {
            uuid: row.uuid,
            title: row.title,
            description: row.description,
            status: TicketStatus::from_db(&row.status),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
}

impl TicketStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a ticket. Returns the ticket ID.
    pub async fn create(
        &self,
        uuid: &str,
        user_id: i64,
        ticket: &NewTicket,
        now: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO tickets (uuid, title, description, status, created_by, created_at, updated_at)
             VALUES (?, ?, ?, 'open', ?, ?, ?)",
        )
        .bind(uuid)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(user_id)
        .bind(now as i64)
        .bind(now as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// List all tickets, most recently updated first.
    pub async fn list(&self) -> Result<Vec<Ticket>, sqlx::Error> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT t.uuid, t.title, t.description, t.status, u.uuid AS created_by,
                    t.created_at, t.updated_at
             FROM tickets t JOIN users u ON u.id = t.created_by
             ORDER BY t.updated_at DESC, t.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Ticket>, sqlx::Error> {
        let row: Option<TicketRow> = sqlx::query_as(
            "SELECT t.uuid, t.title, t.description, t.status, u.uuid AS created_by,
                    t.created_at, t.updated_at
             FROM tickets t JOIN users u ON u.id = t.created_by
             WHERE t.uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Ticket::from))
    }

    /// Apply a partial update. Returns false if the ticket does not exist.
    pub async fn update(
        &self,
        uuid: &str,
        update: &TicketUpdate,
        now: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tickets SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                status = COALESCE(?, status),
                updated_at = ?
             WHERE uuid = ?",
        )
        .bind(update.title.as_deref())
        .bind(update.description.as_deref())
        .bind(update.status.map(|s| s.as_str()))
        .bind(now as i64)
        .bind(uuid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tickets WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
