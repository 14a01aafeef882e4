use axum::{
    extract::{FromRef, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        cookies::{self, CookieScope},
        dto::{
            LoginRequest, LoginResponse, MessageResponse, RefreshResponse, RestoreRequest,
            RestoreResponse, SignUpRequest,
        },
        jwt::JwtKeys,
        refresh::RefreshTokens,
    },
    error::ApiError,
    state::AppState,
    users::{
        repo::User,
        service::{self, normalize_email},
    },
};

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let email = normalize_email(&payload.email);

    // One failure for unknown, deleted and wrong-password alike.
    let user = User::find_active_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| {
            warn!(email = %email, "login unknown or deleted account");
            ApiError::InvalidCredentials
        })?;

    let ok = crate::auth::password::verify_password(&payload.password, &user.password_hash)?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign(&user.email)?;

    let refresh_cfg = &state.config.refresh;
    let raw_refresh = RefreshTokens::new(state.db.clone())
        .issue(user.id, refresh_cfg.validity_days)
        .await?;
    let cookie = cookies::set_cookie(
        CookieScope::Login,
        &raw_refresh,
        refresh_cfg.validity_days,
        refresh_cfg.cookie_secure,
    )
    .map_err(|e| ApiError::Internal(e.into()))?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    info!(user_id = %user.id, "user logged in");
    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            email: user.email,
        }),
    )
        .into_response())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<Response, ApiError> {
    let user = service::sign_up(
        &state.db,
        &payload.email,
        &payload.password,
        &payload.confirm_password,
    )
    .await?;
    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Account created")),
    )
        .into_response())
}

#[instrument(skip(state, headers))]
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let refresh_cfg = &state.config.refresh;
    let secure = refresh_cfg.cookie_secure;

    let Some(raw) = cookies::read_refresh_cookie(&headers) else {
        warn!("refresh without cookie");
        return unauthorized_with_clear("Missing refresh token", CookieScope::Refresh, secure);
    };

    let tokens = RefreshTokens::new(state.db.clone());
    let (record, new_raw) = match tokens.rotate(&raw, refresh_cfg.validity_days).await {
        Ok(pair) => pair,
        Err(e @ (ApiError::InvalidToken | ApiError::TokenExpired)) => {
            warn!(error = %e, "refresh token rejected");
            return unauthorized_with_clear(&e.to_string(), CookieScope::Refresh, secure);
        }
        Err(e) => return e.into_response(),
    };

    // The rotated record proves possession, but only a live account may mint
    // a new access token.
    let user = match User::find_by_id(&state.db, record.user_id).await {
        Ok(Some(user)) if !user.deleted => user,
        Ok(_) => {
            warn!(user_id = %record.user_id, "refresh for missing or deleted account");
            return unauthorized_with_clear("Invalid refresh token", CookieScope::Refresh, secure);
        }
        Err(e) => return e.into_response(),
    };

    let keys = JwtKeys::from_ref(&state);
    let access_token = match keys.sign(&user.email) {
        Ok(t) => t,
        Err(e) => return ApiError::Internal(e).into_response(),
    };

    let cookie = match cookies::set_cookie(
        CookieScope::Refresh,
        &new_raw,
        refresh_cfg.validity_days,
        secure,
    ) {
        Ok(c) => c,
        Err(e) => return ApiError::Internal(e.into()).into_response(),
    };
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);

    info!(user_id = %user.id, "refresh token rotated, new access token issued");
    (response_headers, Json(RefreshResponse { access_token })).into_response()
}

/// Logout always succeeds: revocation is best-effort and an unusable
/// presented token is simply ignored.
#[instrument(skip(state, headers))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(raw) = cookies::read_refresh_cookie(&headers) {
        let tokens = RefreshTokens::new(state.db.clone());
        match tokens.validate(&raw).await {
            Ok(record) => {
                if let Err(e) = tokens.revoke_all_for_user(record.user_id).await {
                    error!(error = %e, user_id = %record.user_id, "logout revocation failed");
                }
            }
            Err(e) => {
                debug!(error = %e, "logout with unusable refresh token");
            }
        }
    }

    let mut response_headers = HeaderMap::new();
    match cookies::clear_cookie(CookieScope::Login, state.config.refresh.cookie_secure) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(e) => error!(error = %e, "building logout cookie failed"),
    }

    (
        response_headers,
        Json(MessageResponse::new("Logged out successfully")),
    )
        .into_response()
}

#[instrument(skip(state, payload))]
pub async fn restore(
    State(state): State<AppState>,
    Json(payload): Json<RestoreRequest>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let user = service::restore_account(&state.db, &payload.email, &payload.password).await?;
    info!(user_id = %user.id, "account restored");
    Ok(Json(RestoreResponse {
        message: "Account restored successfully".into(),
        email: user.email,
    }))
}

fn unauthorized_with_clear(message: &str, scope: CookieScope, secure: bool) -> Response {
    let mut headers = HeaderMap::new();
    match cookies::clear_cookie(scope, secure) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(e) => error!(error = %e, "building clear cookie failed"),
    }
    (
        StatusCode::UNAUTHORIZED,
        headers,
        Json(MessageResponse::new(message)),
    )
        .into_response()
}
