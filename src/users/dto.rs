use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo::{Role, User};

/// Public view of the current user's account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub super_admin: bool,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            super_admin: user.super_admin,
        }
    }
}

/// Self-service profile update.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditProfileRequest {
    pub email: Option<String>,
    pub role: Option<Role>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// Password confirmation for self-service account deletion.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountRequest {
    pub current_password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminCreateRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Admin-side user edit. `restore` lifts a pending soft delete before the
/// field updates are applied.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEditRequest {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
    #[serde(default)]
    pub restore: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDeleteRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboardResponse {
    pub users: Vec<User>,
    pub total_pages: i64,
    pub current_page: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_request_accepts_partial_bodies() {
        let req: EditProfileRequest =
            serde_json::from_str(r#"{"newPassword":"secret2","currentPassword":"secret1"}"#)
                .expect("deserialize");
        assert!(req.email.is_none());
        assert!(req.role.is_none());
        assert_eq!(req.new_password.as_deref(), Some("secret2"));
    }

    #[test]
    fn admin_edit_restore_defaults_to_false() {
        let req: AdminEditRequest = serde_json::from_str(&format!(
            r#"{{"userId":"{}"}}"#,
            Uuid::new_v4()
        ))
        .expect("deserialize");
        assert!(!req.restore);
    }

    #[test]
    fn role_deserializes_from_uppercase() {
        let req: AdminCreateRequest = serde_json::from_str(
            r#"{"email":"a@test.com","password":"secret1","role":"ADMIN"}"#,
        )
        .expect("deserialize");
        assert_eq!(req.role, Role::Admin);
    }
}
