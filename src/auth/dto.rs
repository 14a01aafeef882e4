use serde::{Deserialize, Serialize};

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for signup.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Request body for account restore. Reachable without a session by design:
/// the owner proves themselves with the password alone.
#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub email: String,
    pub password: String,
}

/// Response returned after login: access token in the body, refresh token in
/// the cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub email: String,
}

/// Response returned after a successful refresh rotation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Restore confirmation, echoing the restored address.
#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub message: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_response_uses_camel_case() {
        let json = serde_json::to_string(&RefreshResponse {
            access_token: "abc".into(),
        })
        .expect("serialize");
        assert_eq!(json, r#"{"accessToken":"abc"}"#);
    }

    #[test]
    fn signup_request_accepts_camel_case_confirmation() {
        let req: SignUpRequest = serde_json::from_str(
            r#"{"email":"a@test.com","password":"secret1","confirmPassword":"secret1"}"#,
        )
        .expect("deserialize");
        assert_eq!(req.confirm_password, "secret1");
    }

    #[test]
    fn login_response_carries_token_and_email() {
        let json = serde_json::to_string(&LoginResponse {
            access_token: "jwt".into(),
            email: "a@test.com".into(),
        })
        .expect("serialize");
        assert!(json.contains(r#""accessToken":"jwt""#));
        assert!(json.contains(r#""email":"a@test.com""#));
    }
}
