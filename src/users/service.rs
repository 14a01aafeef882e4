//! Account lifecycle: signup, profile mutation, soft/hard delete, restore.
//!
//! Every mutation that touches credentials or account state is coupled to
//! the refresh-token store: a soft delete or a credential change must not
//! leave live sessions behind.

use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        guard::CurrentUser,
        password::{check_password_policy, hash_password, verify_password},
        refresh::RefreshTokens,
    },
    error::ApiError,
    users::repo::{Authority, EmailHistoryRecord, Role, User},
};

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Profile mutation request, shared by the self-edit and admin-edit paths.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub role: Option<Role>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

pub async fn sign_up(
    db: &PgPool,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<User, ApiError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Please enter a valid email".into()));
    }
    check_password_policy(password, Some(confirm_password))?;

    // Retired addresses stay blocked through the email history.
    if User::exists_by_email(db, &email).await?
        || EmailHistoryRecord::exists_by_email(db, &email).await?
    {
        return Err(ApiError::Conflict(
            "Email is already registered or in history".into(),
        ));
    }

    let hash = hash_password(password)?;
    User::create(db, &email, &hash, Role::User).await
}

/// Admin-created account with an explicit role. The super-admin flag can
/// never be granted through this path.
pub async fn admin_create(
    db: &PgPool,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, ApiError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Please enter a valid email".into()));
    }
    check_password_policy(password, None)?;

    if User::exists_by_email(db, &email).await?
        || EmailHistoryRecord::exists_by_email(db, &email).await?
    {
        return Err(ApiError::Conflict(
            "Email is already registered or in history".into(),
        ));
    }

    let hash = hash_password(password)?;
    User::create(db, &email, &hash, role).await
}

pub async fn update_profile(
    db: &PgPool,
    caller: &CurrentUser,
    target_id: Uuid,
    update: ProfileUpdate,
) -> Result<(), ApiError> {
    let target = User::find_by_id(db, target_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    // Protection invariant: no caller may touch a super-admin account, not
    // even the account itself.
    if target.super_admin {
        return Err(ApiError::IllegalState("Super admin cannot be modified.".into()));
    }

    let is_super = caller.authority == Authority::SuperAdmin;
    let is_self = caller.id == target.id;
    if !is_self && !is_super {
        warn!(caller = %caller.id, target = %target.id, "profile update denied");
        return Err(ApiError::AccessDenied);
    }

    let mut credentials_changed = false;

    if let Some(new_email) = update.email.as_deref() {
        let new_email = normalize_email(new_email);
        if new_email != target.email {
            if !is_valid_email(&new_email) {
                return Err(ApiError::Validation("Please enter a valid email".into()));
            }
            if User::exists_by_email(db, &new_email).await?
                || EmailHistoryRecord::exists_by_email(db, &new_email).await?
            {
                return Err(ApiError::Conflict("The email is already in use.".into()));
            }
            EmailHistoryRecord::record_change(db, target.id, &target.email).await?;
            User::update_email(db, target.id, &new_email).await?;
            credentials_changed = true;
        }
    }

    if let Some(new_password) = update.new_password.as_deref() {
        check_password_policy(new_password, None)?;
        if !is_super {
            let current = update
                .current_password
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    ApiError::Validation("Current password is required.".into())
                })?;
            if !verify_password(current, &target.password_hash)? {
                return Err(ApiError::Validation("Wrong current password".into()));
            }
        }
        let hash = hash_password(new_password)?;
        User::update_password(db, target.id, &hash).await?;
        credentials_changed = true;
    }

    if let Some(role) = update.role {
        if role != target.role {
            if !is_super {
                warn!(caller = %caller.id, "role change requires super admin");
                return Err(ApiError::AccessDenied);
            }
            User::update_role(db, target.id, role).await?;
        }
    }

    // A changed email or password invalidates every open session.
    if credentials_changed {
        RefreshTokens::new(db.clone())
            .revoke_all_for_user(target.id)
            .await?;
    }

    info!(target = %target.id, "profile updated");
    Ok(())
}

/// Soft delete by the owner or any super-admin; hard delete when the caller
/// is a super-admin. Both paths kill every open session immediately.
pub async fn delete_account(
    db: &PgPool,
    caller: &CurrentUser,
    target_id: Uuid,
) -> Result<(), ApiError> {
    let target = User::find_by_id(db, target_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let is_super = caller.authority == Authority::SuperAdmin;
    if !is_super && caller.id != target.id {
        return Err(ApiError::AccessDenied);
    }
    if target.super_admin {
        return Err(ApiError::IllegalState(
            "SuperAdmin accounts cannot be deleted".into(),
        ));
    }

    let tokens = RefreshTokens::new(db.clone());
    if is_super {
        // Irreversible: cascade through owned records, then the row itself.
        tokens.delete_all_for_user(target.id).await?;
        EmailHistoryRecord::delete_all_for_user(db, target.id).await?;
        User::hard_delete(db, target.id).await?;
        info!(target = %target.id, "account hard-deleted");
    } else {
        User::soft_delete(db, target.id).await?;
        tokens.revoke_all_for_user(target.id).await?;
        info!(target = %target.id, "account soft-deleted");
    }
    Ok(())
}

/// Restore a soft-deleted account. Unauthenticated by design: the owner of a
/// deleted account has no session, so the password alone vouches for them.
pub async fn restore_account(db: &PgPool, email: &str, password: &str) -> Result<User, ApiError> {
    let email = normalize_email(email);
    let user = User::find_by_email(db, &email)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    if !user.deleted {
        return Err(ApiError::IllegalState(
            "Account is not scheduled for deletion.".into(),
        ));
    }
    if !verify_password(password, &user.password_hash)? {
        return Err(ApiError::Validation("Incorrect password.".into()));
    }

    User::clear_deletion(db, user.id).await?;
    User::find_by_id(db, user.id)
        .await?
        .ok_or(ApiError::NotFound("User"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(is_valid_email("a@example.com"));
        assert!(is_valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing-at.example.com"));
        assert!(!is_valid_email("missing-domain@"));
    }

    #[test]
    fn profile_update_defaults_to_no_changes() {
        let update = ProfileUpdate::default();
        assert!(update.email.is_none());
        assert!(update.role.is_none());
        assert!(update.current_password.is_none());
        assert!(update.new_password.is_none());
    }
}
