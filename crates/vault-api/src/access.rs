use tracing::warn;
use vault_db::models::FileRow;

use crate::auth::AppState;
use crate::blocking;
use crate::error::AppError;
use crate::middleware::CurrentUser;

/// Owners may touch their own files; admins may touch any file.
pub fn may_access(user: &CurrentUser, owner_id: i64) -> bool {
    user.role.is_admin() || user.id == owner_id
}

/// Fetch a file on behalf of `user`.
///
/// A file that exists but belongs to someone else yields the same
/// `NotFound` as one that does not exist.
pub async fn load_file(state: &AppState, user: &CurrentUser, file_id: i64) -> Result<FileRow, AppError> {
    let db = state.clone();
    let file = blocking(move || Ok(db.db.get_file(file_id)?))
        .await?
        .ok_or(AppError::NotFound)?;

    if !may_access(user, file.owner_id) {
        warn!("User {} denied access to file {}", user.username, file_id);
        return Err(AppError::NotFound);
    }

    Ok(file)
}
