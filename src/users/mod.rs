use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user", get(handlers::get_profile))
        .route("/user/edit", post(handlers::edit_profile))
        .route("/user/delete", post(handlers::delete_own_account))
        .route("/admin", get(handlers::admin_list))
        .route("/admin/create", post(handlers::admin_create))
        .route("/admin/edit", post(handlers::admin_edit))
        .route("/admin/delete", post(handlers::admin_delete))
}
