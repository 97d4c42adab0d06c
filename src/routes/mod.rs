use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::AppState;

pub mod web;

// Server-side rendered pages.
pub fn get_web_router() -> Router<Arc<AppState>> {
    Router::new()
        // Front Page
        .route("/", get(web::home))
        // Auth
        .route("/login", get(web::login_view).post(web::login_handler))
        .route("/logout", post(web::logout_handler))
        // Posts
        .route("/posts", post(web::create_post))
        .route("/posts/{post_id}", get(web::view_post))
}

pub fn build_router(app_state: AppState, static_dir: &str) -> Router {
    Router::new()
        .merge(get_web_router())
        .layer(middleware::from_fn(web::session_middleware))
        // STATIC CONTENT
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        // STATE
        .with_state(Arc::new(app_state))
}
