use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Domain error for the auth and account-lifecycle core.
///
/// Store and lifecycle operations return these kinds explicitly; the
/// `IntoResponse` impl is the single place where kinds become HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidToken,

    #[error("Refresh token expired")]
    TokenExpired,

    #[error("Unauthorized action.")]
    AccessDenied,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    IllegalState(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials | ApiError::InvalidToken | ApiError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::AccessDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) | ApiError::IllegalState(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Never leak internal failure details to the client.
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(anyhow::Error::new(e))
    }
}

/// Maps a Postgres unique violation (23505) to `Conflict`, everything else
/// to `Internal`.
pub fn on_unique_violation(e: sqlx::Error, conflict_message: &str) -> ApiError {
    if is_unique_violation(&e) {
        ApiError::Conflict(conflict_message.to_string())
    } else {
        e.into()
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_error_kinds() {
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("User").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Conflict("Email is already in use".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Validation("Password too short".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::IllegalState("Account is not scheduled for deletion.".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn not_found_message_names_the_resource() {
        assert_eq!(ApiError::NotFound("User").to_string(), "User not found");
    }

    #[test]
    fn row_not_found_is_not_a_unique_violation() {
        let err = on_unique_violation(sqlx::Error::RowNotFound, "dup");
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
