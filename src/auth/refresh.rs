use std::fmt::Write as _;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ApiError;

/// Raw token entropy. 64 bytes encodes to an 86-character URL-safe value.
const TOKEN_BYTES: usize = 64;

/// Stored refresh-token row. Only the SHA-256 hash of the raw value is
/// persisted; `token_hash`, `expires_at` and `created_at` never change after
/// insert.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub revoked: bool,
    pub last_used_at: Option<OffsetDateTime>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Generate a new opaque refresh token. The raw value is only ever returned
/// to the client; the database sees its hash.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// SHA-256 hex digest of a raw token value. Deterministic, so presented
/// tokens can be looked up by hash.
pub fn hash_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Refresh-token lifecycle over the `refresh_tokens` table.
///
/// Each operation is one transaction. Validation takes a `FOR UPDATE` row
/// lock keyed by token hash, so two requests presenting the same token
/// serialize: rotation revokes the row before commit and the loser finds no
/// active record.
#[derive(Clone)]
pub struct RefreshTokens {
    db: PgPool,
}

impl RefreshTokens {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Issue a new token for the user and return the raw value.
    pub async fn issue(&self, user_id: Uuid, validity_days: i64) -> Result<String, ApiError> {
        let raw = generate_token();
        let expires_at = OffsetDateTime::now_utc() + Duration::days(validity_days);
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(hash_token(&raw))
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        debug!(user_id = %user_id, days = validity_days, "refresh token issued");
        Ok(raw)
    }

    /// Validate a presented raw token and stamp `last_used_at`.
    ///
    /// Unknown or already-revoked hash fails with `InvalidToken`. An expired
    /// record is marked revoked before the `TokenExpired` failure is
    /// returned, so it can never be presented again.
    pub async fn validate(&self, raw: &str) -> Result<RefreshTokenRecord, ApiError> {
        let mut tx = self.db.begin().await?;
        let mut stored = Self::lock_active(&mut tx, raw).await?;

        let now = OffsetDateTime::now_utc();
        if stored.is_expired(now) {
            Self::mark_revoked(&mut tx, stored.id).await?;
            tx.commit().await?;
            return Err(ApiError::TokenExpired);
        }

        sqlx::query("UPDATE refresh_tokens SET last_used_at = $2 WHERE id = $1")
            .bind(stored.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        stored.last_used_at = Some(now);
        Ok(stored)
    }

    /// Validate, revoke the presented token and issue its replacement for
    /// the same user, all in one transaction. A refresh token is never
    /// usable after its first successful use.
    pub async fn rotate(
        &self,
        raw: &str,
        validity_days: i64,
    ) -> Result<(RefreshTokenRecord, String), ApiError> {
        let mut tx = self.db.begin().await?;
        let mut stored = Self::lock_active(&mut tx, raw).await?;

        let now = OffsetDateTime::now_utc();
        if stored.is_expired(now) {
            Self::mark_revoked(&mut tx, stored.id).await?;
            tx.commit().await?;
            return Err(ApiError::TokenExpired);
        }

        sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, last_used_at = $2 WHERE id = $1",
        )
        .bind(stored.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let new_raw = generate_token();
        let expires_at = now + Duration::days(validity_days);
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(stored.user_id)
        .bind(hash_token(&new_raw))
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = %stored.user_id, "refresh token rotated");
        stored.revoked = true;
        stored.last_used_at = Some(now);
        Ok((stored, new_raw))
    }

    /// Bulk-revoke every active token of a user. Used on logout, credential
    /// change and account deletion.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, ApiError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        info!(user_id = %user_id, count = result.rows_affected(), "refresh tokens revoked");
        Ok(result.rows_affected())
    }

    /// Remove every token record of a user (hard-delete cascade).
    pub async fn delete_all_for_user(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn lock_active(
        tx: &mut Transaction<'_, Postgres>,
        raw: &str,
    ) -> Result<RefreshTokenRecord, ApiError> {
        sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at, revoked, last_used_at
            FROM refresh_tokens
            WHERE token_hash = $1 AND revoked = FALSE
            FOR UPDATE
            "#,
        )
        .bind(hash_token(raw))
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ApiError::InvalidToken)
    }

    /// Idempotent revoke of a single record, inside the caller's
    /// transaction. Both the expired-validation housekeeping and rotation go
    /// through this transition.
    async fn mark_revoked(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<(), ApiError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        // 64 bytes -> 86 characters of unpadded base64.
        assert_eq!(a.len(), 86);
        assert_ne!(a, b);
    }

    #[test]
    fn generated_tokens_are_url_safe() {
        let token = generate_token();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_is_stable_hex_digest() {
        let first = hash_token("token");
        let second = hash_token("token");
        let different = hash_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_matches_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn expiry_check_uses_stored_timestamp() {
        let now = OffsetDateTime::now_utc();
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: hash_token("abc"),
            expires_at: now - Duration::minutes(1),
            created_at: now - Duration::days(14),
            revoked: false,
            last_used_at: None,
        };
        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - Duration::minutes(2)));
    }
}
