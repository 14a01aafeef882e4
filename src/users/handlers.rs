use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{dto::MessageResponse, guard::CurrentUser, password::verify_password},
    error::ApiError,
    state::AppState,
    users::{
        dto::{
            AdminCreateRequest, AdminDashboardResponse, AdminDeleteRequest, AdminEditRequest,
            DeleteAccountRequest, EditProfileRequest, ListQuery, ProfileResponse,
        },
        repo::User,
        service::{self, ProfileUpdate},
    },
};

const PAGE_SIZE: i64 = 10;

#[instrument(skip(state, current))]
pub async fn get_profile(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = User::find_by_id(&state.db, current.id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, current, payload))]
pub async fn edit_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<EditProfileRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    service::update_profile(
        &state.db,
        &current,
        current.id,
        ProfileUpdate {
            email: payload.email,
            role: payload.role,
            current_password: payload.current_password,
            new_password: payload.new_password,
        },
    )
    .await?;
    Ok(Json(MessageResponse::new("Profile updated successfully.")))
}

#[instrument(skip(state, current, payload))]
pub async fn delete_own_account(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<DeleteAccountRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = User::find_by_id(&state.db, current.id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(user_id = %current.id, "self delete with wrong password");
        return Err(ApiError::Validation("Incorrect current password.".into()));
    }

    service::delete_account(&state.db, &current, current.id).await?;
    Ok(Json(MessageResponse::new("Account deleted successfully.")))
}

#[instrument(skip(state))]
pub async fn admin_list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<AdminDashboardResponse>, ApiError> {
    let page = query.page.max(0);
    let users = User::list(&state.db, PAGE_SIZE, page * PAGE_SIZE).await?;
    let total = User::count(&state.db).await?;
    Ok(Json(AdminDashboardResponse {
        users,
        total_pages: (total + PAGE_SIZE - 1) / PAGE_SIZE,
        current_page: page,
    }))
}

#[instrument(skip(state, payload))]
pub async fn admin_create(
    State(state): State<AppState>,
    Json(payload): Json<AdminCreateRequest>,
) -> Result<Response, ApiError> {
    let user =
        service::admin_create(&state.db, &payload.email, &payload.password, payload.role).await?;
    info!(user_id = %user.id, "user created by admin");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    )
        .into_response())
}

#[instrument(skip(state, current, payload))]
pub async fn admin_edit(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<AdminEditRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.restore {
        let target = User::find_by_id(&state.db, payload.user_id)
            .await?
            .ok_or(ApiError::NotFound("User"))?;
        if target.deleted {
            User::clear_deletion(&state.db, target.id).await?;
            info!(target = %target.id, "pending deletion lifted by admin");
        }
    }

    service::update_profile(
        &state.db,
        &current,
        payload.user_id,
        ProfileUpdate {
            email: payload.email,
            role: payload.role,
            current_password: None,
            new_password: payload.password,
        },
    )
    .await?;
    Ok(Json(MessageResponse::new("User updated successfully")))
}

#[instrument(skip(state, current, payload))]
pub async fn admin_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<AdminDeleteRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    service::delete_account(&state.db, &current, payload.user_id).await?;
    Ok(Json(MessageResponse::new("User deleted successfully.")))
}
