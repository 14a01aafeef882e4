use axum::{routing::post, Router};

use crate::state::AppState;

pub mod cookies;
pub mod dto;
pub mod guard;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod refresh;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/restore", post(handlers::restore))
}
