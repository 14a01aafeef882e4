//! Per-request authentication and the role policy table.
//!
//! The middleware never rejects on its own authority: it resolves a
//! principal when it can and leaves the request untouched when it cannot.
//! Rejection is the policy check's job, in one place, keyed by method and
//! path prefix.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::jwt::JwtKeys,
    state::AppState,
    users::repo::{Authority, User},
};

/// Request principal resolved from a verified access token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub authority: Authority,
}

/// Paths served without authentication: login, signup, refresh, restore and
/// logout all operate before or outside a valid access token.
const EXEMPT_PATHS: &[&str] = &[
    "/api/auth/login",
    "/api/auth/signup",
    "/api/auth/refresh",
    "/api/auth/restore",
    "/api/auth/logout",
    // Liveness probe stays open.
    "/api/health",
];

const ADMIN_ONLY: &[Authority] = &[Authority::Admin, Authority::SuperAdmin];
const ANY_ROLE: &[Authority] = &[Authority::User, Authority::Admin, Authority::SuperAdmin];

/// Role rules keyed by (method, path prefix). The longest matching prefix
/// wins; paths with no entry just require an authenticated principal.
const POLICIES: &[(Method, &str, &[Authority])] = &[
    (Method::GET, "/api/admin", ADMIN_ONLY),
    (Method::POST, "/api/admin", ADMIN_ONLY),
    (Method::GET, "/api/user", ANY_ROLE),
    (Method::POST, "/api/user", ANY_ROLE),
];

pub fn is_exempt(method: &Method, path: &str) -> bool {
    // Never gate CORS preflight.
    if *method == Method::OPTIONS {
        return true;
    }
    EXEMPT_PATHS.iter().any(|p| path.starts_with(p))
}

/// Single authorization decision for a resolved (or absent) principal.
pub fn authorize(
    method: &Method,
    path: &str,
    principal: Option<&CurrentUser>,
) -> Result<(), StatusCode> {
    let Some(user) = principal else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let matched = POLICIES
        .iter()
        .filter(|(m, prefix, _)| m == method && path.starts_with(prefix))
        .max_by_key(|(_, prefix, _)| prefix.len());
    match matched {
        Some((_, _, allowed)) if allowed.contains(&user.authority) => Ok(()),
        Some(_) => Err(StatusCode::FORBIDDEN),
        None => Ok(()),
    }
}

/// Axum middleware: resolve the bearer principal, then apply the policy
/// table. Verification failures clear the principal and fall through to the
/// policy check; they are never surfaced as errors from this layer.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if is_exempt(req.method(), req.uri().path()) {
        return next.run(req).await;
    }

    if let Some(user) = resolve_principal(&state, req.headers()).await {
        req.extensions_mut().insert(user);
    }

    let principal = req.extensions().get::<CurrentUser>().cloned();
    match authorize(req.method(), req.uri().path(), principal.as_ref()) {
        Ok(()) => next.run(req).await,
        Err(status) => status.into_response(),
    }
}

async fn resolve_principal(state: &AppState, headers: &HeaderMap) -> Option<CurrentUser> {
    let token = bearer_token(headers)?;
    let keys = JwtKeys::from_ref(state);
    let claims = match keys.verify(token) {
        Ok(c) => c,
        Err(_) => {
            warn!("invalid or expired access token");
            return None;
        }
    };
    // Soft-deleted accounts are excluded from authentication.
    match User::find_active_by_email(&state.db, &claims.sub).await {
        Ok(Some(user)) => {
            debug!(user_id = %user.id, "principal resolved");
            Some(CurrentUser {
                id: user.id,
                email: user.email.clone(),
                authority: user.authority(),
            })
        }
        Ok(None) => {
            warn!(subject = %claims.sub, "token subject has no active account");
            None
        }
        Err(e) => {
            warn!(error = %e, "principal lookup failed");
            None
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or((StatusCode::UNAUTHORIZED, "Authentication required".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn principal(authority: Authority) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "a@test.com".into(),
            authority,
        }
    }

    #[test]
    fn auth_endpoints_are_exempt() {
        assert!(is_exempt(&Method::POST, "/api/auth/login"));
        assert!(is_exempt(&Method::POST, "/api/auth/signup"));
        assert!(is_exempt(&Method::POST, "/api/auth/refresh"));
        assert!(is_exempt(&Method::POST, "/api/auth/restore"));
        assert!(is_exempt(&Method::POST, "/api/auth/logout"));
    }

    #[test]
    fn preflight_is_always_exempt() {
        assert!(is_exempt(&Method::OPTIONS, "/api/admin"));
    }

    #[test]
    fn health_probe_is_exempt() {
        assert!(is_exempt(&Method::GET, "/api/health"));
    }

    #[test]
    fn protected_paths_are_not_exempt() {
        assert!(!is_exempt(&Method::GET, "/api/user"));
        assert!(!is_exempt(&Method::POST, "/api/admin/delete"));
    }

    #[test]
    fn missing_principal_is_unauthorized() {
        assert_eq!(
            authorize(&Method::GET, "/api/user", None),
            Err(StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn admin_paths_reject_plain_users() {
        let user = principal(Authority::User);
        assert_eq!(
            authorize(&Method::POST, "/api/admin/delete", Some(&user)),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn admin_paths_allow_admin_and_super_admin() {
        let admin = principal(Authority::Admin);
        let root = principal(Authority::SuperAdmin);
        assert_eq!(authorize(&Method::GET, "/api/admin", Some(&admin)), Ok(()));
        assert_eq!(
            authorize(&Method::POST, "/api/admin/edit", Some(&root)),
            Ok(())
        );
    }

    #[test]
    fn user_paths_allow_every_role() {
        for authority in [Authority::User, Authority::Admin, Authority::SuperAdmin] {
            let p = principal(authority);
            assert_eq!(authorize(&Method::GET, "/api/user", Some(&p)), Ok(()));
            assert_eq!(
                authorize(&Method::POST, "/api/user/edit", Some(&p)),
                Ok(())
            );
        }
    }

    #[test]
    fn unlisted_paths_need_only_authentication() {
        let user = principal(Authority::User);
        assert_eq!(authorize(&Method::GET, "/api/health", Some(&user)), Ok(()));
        assert_eq!(
            authorize(&Method::GET, "/api/health", None),
            Err(StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwdw=="),
        );
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer "),
        );
        assert_eq!(bearer_token(&headers), None);
    }
}
