pub mod access;
pub mod admin;
pub mod auth;
pub mod error;
pub mod files;
pub mod middleware;
pub mod pages;
pub mod view;

#[cfg(test)]
mod tests;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::error;

use crate::auth::AppState;
use crate::error::AppError;
use crate::middleware::{require_admin, require_user};

/// Assemble every route. Upload bodies above `max_upload_bytes` are refused.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let public_routes = Router::new()
        .route("/", get(pages::index))
        .route("/health", get(pages::health))
        .route("/login/", get(auth::login_page).post(auth::login))
        .route("/register/", get(auth::register_page).post(auth::register))
        .route("/logout/", get(auth::logout))
        .route("/admin/login/", get(auth::admin_login_page).post(auth::admin_login));

    let user_routes = Router::new()
        .route("/home/", get(files::home))
        .route("/upload/", post(files::upload_file))
        .route("/files/", get(files::list_files))
        .route("/view/{file_id}/", get(files::view_file))
        .route("/download/{file_id}/", get(files::download_file))
        .route("/delete/{file_id}/", get(files::delete_file))
        .route_layer(from_fn_with_state(state.clone(), require_user));

    let admin_routes = Router::new()
        .route("/admin/dashboard/", get(admin::dashboard))
        .route("/admin/view/{file_id}/", get(admin::view_file))
        .route("/admin/download/{file_id}/", get(admin::download_file))
        .route("/admin/delete/{file_id}/", get(admin::delete_file))
        .route("/admin/promote/{user_id}/", post(admin::promote))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Run blocking DB or crypto work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        AppError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}
