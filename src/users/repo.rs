use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{on_unique_violation, ApiError};

/// Stored role. A separate super-admin flag is kept orthogonal to this; see
/// [`User::authority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

/// Effective authority granted to a request principal. The super-admin flag
/// always wins; the stored role is authoritative otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    User,
    Admin,
    SuperAdmin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub super_admin: bool,
    pub deleted: bool,
    pub deletion_date: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str =
    "id, email, password_hash, role, super_admin, deleted, deletion_date, created_at";

impl User {
    pub fn authority(&self) -> Authority {
        if self.super_admin {
            Authority::SuperAdmin
        } else {
            match self.role {
                Role::User => Authority::User,
                Role::Admin => Authority::Admin,
            }
        }
    }

    /// Find a user by email, including soft-deleted accounts.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by email, excluding soft-deleted accounts. Authentication
    /// goes through this lookup so a deleted account cannot obtain tokens.
    pub async fn find_active_by_email(db: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted = FALSE"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn exists_by_email(db: &PgPool, email: &str) -> Result<bool, ApiError> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(db)
                .await?;
        Ok(row.0)
    }

    /// Insert a new account. Email uniqueness is enforced by the unique
    /// index and surfaces as `Conflict`.
    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(db)
        .await
        .map_err(|e| on_unique_violation(e, "Email is already registered or in history"))?;
        Ok(user)
    }

    pub async fn update_email(db: &PgPool, id: Uuid, email: &str) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET email = $2 WHERE id = $1")
            .bind(id)
            .bind(email)
            .execute(db)
            .await
            .map_err(|e| on_unique_violation(e, "The email is already in use."))?;
        Ok(())
    }

    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn update_role(db: &PgPool, id: Uuid, role: Role) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET role = $2 WHERE id = $1")
            .bind(id)
            .bind(role)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn soft_delete(db: &PgPool, id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET deleted = TRUE, deletion_date = $2 WHERE id = $1")
            .bind(id)
            .bind(OffsetDateTime::now_utc())
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn clear_deletion(db: &PgPool, id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET deleted = FALSE, deletion_date = NULL WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn hard_delete(db: &PgPool, id: Uuid) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> Result<Vec<User>, ApiError> {
        let rows = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn count(db: &PgPool) -> Result<i64, ApiError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await?;
        Ok(row.0)
    }
}

/// Append-only log of an account's previous email addresses, consulted so a
/// retired address cannot be re-registered.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmailHistoryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub changed_at: OffsetDateTime,
}

impl EmailHistoryRecord {
    pub async fn record_change(db: &PgPool, user_id: Uuid, email: &str) -> Result<(), ApiError> {
        sqlx::query("INSERT INTO user_email_history (user_id, email) VALUES ($1, $2)")
            .bind(user_id)
            .bind(email)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn exists_by_email(db: &PgPool, email: &str) -> Result<bool, ApiError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM user_email_history WHERE email = $1)",
        )
        .bind(email)
        .fetch_one(db)
        .await?;
        Ok(row.0)
    }

    pub async fn delete_all_for_user(db: &PgPool, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM user_email_history WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }
}
