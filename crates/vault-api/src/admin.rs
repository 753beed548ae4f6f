use axum::{
    Extension, Json,
    extract::{Path, State},
    response::{Redirect, Response},
};
use tracing::info;

use vault_types::api::DashboardPage;
use vault_types::models::Role;

use crate::auth::AppState;
use crate::blocking;
use crate::error::AppError;
use crate::files::{remove_file, render_download, render_view};
use crate::middleware::CurrentUser;

/// GET /admin/dashboard/: every user and every file.
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardPage>, AppError> {
    let db = state.clone();
    let (users, files) =
        blocking(move || Ok((db.db.list_users()?, db.db.list_all_files()?))).await?;

    Ok(Json(DashboardPage {
        users: users.into_iter().map(Into::into).collect(),
        files: files.into_iter().map(Into::into).collect(),
    }))
}

/// GET /admin/view/{file_id}/
pub async fn view_file(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(file_id): Path<i64>,
) -> Result<Response, AppError> {
    render_view(&state, &admin, file_id).await
}

/// GET /admin/download/{file_id}/
pub async fn download_file(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(file_id): Path<i64>,
) -> Result<Response, AppError> {
    render_download(&state, &admin, file_id).await
}

/// GET /admin/delete/{file_id}/
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(file_id): Path<i64>,
) -> Result<Redirect, AppError> {
    remove_file(&state, &admin, file_id).await?;
    Ok(Redirect::to("/admin/dashboard/"))
}

/// POST /admin/promote/{user_id}/: grant the admin role.
pub async fn promote(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(user_id): Path<i64>,
) -> Result<Redirect, AppError> {
    let db = state.clone();
    if !blocking(move || Ok(db.db.set_role(user_id, Role::Admin)?)).await? {
        return Err(AppError::NotFound);
    }

    info!("User {} promoted to admin by {}", user_id, admin.username);
    Ok(Redirect::to("/admin/dashboard/"))
}
