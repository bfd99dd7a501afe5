//! Roles, their permissions, and user role assignments.

use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::auth::{Action, Permission, Role};

#[derive(Clone)]
pub struct RoleStore {
    pool: SqlitePool,
}

/// Row of a role joined with one of its permissions (None for roles without permissions).
type RolePermissionRow = (i64, String, Option<String>, Option<String>);

/// Fold joined rows (already ordered by role then permission) into roles.
fn group_roles(rows: Vec<RolePermissionRow>) -> Vec<Role> {
    let mut roles: Vec<(i64, Role)> = Vec::new();

    for (role_id, name, resource, action) in rows {
        if roles.last().map(|(id, _)| *id) != Some(role_id) {
            roles.push((
                role_id,
                Role {
                    name,
                    permissions: Vec::new(),
                },
            ));
        }

        let (Some(resource), Some(action)) = (resource, action) else {
            continue;
        };
        let Some(action) = Action::parse(&action) else {
            tracing::warn!(role_id, action = %action, "Skipping unknown permission action");
            continue;
        };
        if let Some((_, role)) = roles.last_mut() {
            role.permissions.push(Permission { resource, action });
        }
    }

    roles.into_iter().map(|(_, role)| role).collect()
}

impl RoleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List all roles with their permissions.
    pub async fn list(&self) -> Result<Vec<Role>, sqlx::Error> {
        let rows: Vec<RolePermissionRow> = sqlx::query_as(
            "SELECT r.id, r.name, p.resource, p.action
             FROM roles r
             LEFT JOIN role_permissions p ON p.role_id = r.id
             ORDER BY r.id, p.id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(group_roles(rows))
    }

    /// Resolve a user's roles, in assignment order, with their permissions.
    pub async fn for_user(&self, user_id: i64) -> Result<Vec<Role>, sqlx::Error> {
        let rows: Vec<RolePermissionRow> = sqlx::query_as(
            "SELECT r.id, r.name, p.resource, p.action
             FROM user_roles ur
             JOIN roles r ON r.id = ur.role_id
             LEFT JOIN role_permissions p ON p.role_id = r.id
             WHERE ur.user_id = ?
             ORDER BY ur.position, p.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(group_roles(rows))
    }

    /// Replace a user's roles with the named roles, in the given order.
    /// Returns false (and changes nothing) if any role name is unknown.
    pub async fn set_user_roles(&self, user_id: i64, names: &[String]) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if !assign_roles(&mut tx, user_id, names).await? {
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }
}

/// Replace a user's roles on an open connection or transaction.
/// Returns false before writing anything if a role name is unknown.
pub(crate) async fn assign_roles(
    conn: &mut SqliteConnection,
    user_id: i64,
    names: &[String],
) -> Result<bool, sqlx::Error> {
    let mut role_ids = Vec::with_capacity(names.len());
    for name in names {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some((id,)) if !role_ids.contains(&id) => role_ids.push(id),
            Some(_) => {}
            None => return Ok(false),
        }
    }

    sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for (position, role_id) in role_ids.iter().enumerate() {
        sqlx::query("INSERT INTO user_roles (user_id, role_id, position) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(role_id)
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }

    Ok(true)
}
