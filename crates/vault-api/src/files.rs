use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tracing::info;

use vault_types::api::{FileListPage, FileViewPage, HomePage};

use crate::access::load_file;
use crate::auth::AppState;
use crate::blocking;
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::view::ViewKind;

/// Multipart field carrying the upload.
pub const UPLOAD_FIELD: &str = "file";

const MAX_FILENAME_LEN: usize = 255;
const FIELD_REQUIRED: &str = "This field is required.";

/// GET /home/: upload form context.
pub async fn home(Extension(user): Extension<CurrentUser>) -> Json<HomePage> {
    Json(HomePage {
        username: user.username,
        upload_field: UPLOAD_FIELD.to_string(),
    })
}

/// POST /upload/: read the whole file, encrypt it, store the token.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let (filename, data) = read_upload(multipart).await?;
    let size = data.len();

    let st = state.clone();
    let name = filename.clone();
    let file_id = blocking(move || {
        let encrypted = st.codec.encrypt(&data);
        Ok(st.db.create_file(user.id, &name, &encrypted, Utc::now())?)
    })
    .await?;

    info!("File {} ({}, {} bytes) uploaded", file_id, filename, size);
    Ok(Redirect::to("/files/"))
}

/// GET /files/: the caller's own files.
pub async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<FileListPage>, AppError> {
    let db = state.clone();
    let owner = user.id;
    let rows = blocking(move || Ok(db.db.list_files_for_owner(owner)?)).await?;

    Ok(Json(FileListPage {
        username: user.username,
        files: rows.into_iter().map(Into::into).collect(),
    }))
}

/// GET /view/{file_id}/
pub async fn view_file(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(file_id): Path<i64>,
) -> Result<Response, AppError> {
    render_view(&state, &user, file_id).await
}

/// GET /download/{file_id}/
pub async fn download_file(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(file_id): Path<i64>,
) -> Result<Response, AppError> {
    render_download(&state, &user, file_id).await
}

/// GET /delete/{file_id}/
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(file_id): Path<i64>,
) -> Result<Redirect, AppError> {
    remove_file(&state, &user, file_id).await?;
    Ok(Redirect::to("/files/"))
}

// -- Shared with the admin routes --

pub(crate) async fn render_view(
    state: &AppState,
    user: &CurrentUser,
    file_id: i64,
) -> Result<Response, AppError> {
    let file = load_file(state, user, file_id).await?;
    let kind = ViewKind::for_filename(&file.filename);

    if kind == ViewKind::DownloadOnly {
        return Ok(Json(FileViewPage {
            filename: file.filename,
            content: None,
        })
        .into_response());
    }

    let st = state.clone();
    let token = file.encrypted_data;
    let plaintext = blocking(move || Ok(st.codec.decrypt(&token)?)).await?;

    match kind {
        ViewKind::Pdf => Ok((
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"))],
            plaintext,
        )
            .into_response()),
        _ => Ok(Json(FileViewPage {
            filename: file.filename,
            content: Some(String::from_utf8(plaintext)?),
        })
        .into_response()),
    }
}

pub(crate) async fn render_download(
    state: &AppState,
    user: &CurrentUser,
    file_id: i64,
) -> Result<Response, AppError> {
    let file = load_file(state, user, file_id).await?;

    let st = state.clone();
    let token = file.encrypted_data;
    let plaintext = blocking(move || Ok(st.codec.decrypt(&token)?)).await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        header_safe(&file.filename)
    ))
    .map_err(anyhow::Error::from)?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        plaintext,
    )
        .into_response())
}

pub(crate) async fn remove_file(
    state: &AppState,
    user: &CurrentUser,
    file_id: i64,
) -> Result<(), AppError> {
    load_file(state, user, file_id).await?;

    let db = state.clone();
    // A concurrent delete may win the race; that is just a 404.
    if !blocking(move || Ok(db.db.delete_file(file_id)?)).await? {
        return Err(AppError::NotFound);
    }

    info!("File {} deleted by {}", file_id, user.username);
    Ok(())
}

// -- Upload form --

/// Pull the single `file` field out of the form.
async fn read_upload(mut multipart: Multipart) -> Result<(String, Bytes), AppError> {
    let mut upload: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        if upload.is_some() {
            return Err(AppError::Validation("Send exactly one file.".into()));
        }
        let filename = field.file_name().map(base_name).filter(|n| !n.is_empty());
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, data));
    }

    let (filename, data) = upload.ok_or_else(|| AppError::Validation(FIELD_REQUIRED.into()))?;
    let filename = filename.ok_or_else(|| AppError::Validation(FIELD_REQUIRED.into()))?;

    if data.is_empty() {
        return Err(AppError::Validation("The submitted file is empty.".into()));
    }
    if filename.chars().count() > MAX_FILENAME_LEN {
        return Err(AppError::Validation(format!(
            "Ensure this filename has at most {MAX_FILENAME_LEN} characters."
        )));
    }

    Ok((filename, data))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::Validation(e.body_text())
    }
}

/// Browsers may send a client-side path; keep only the last component.
fn base_name(name: &str) -> String {
    name.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
        .trim()
        .to_string()
}

/// Make a filename safe inside a quoted header parameter.
fn header_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}
