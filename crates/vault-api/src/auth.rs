use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};

use vault_crypto::Codec;
use vault_db::Database;
use vault_db::models::UserRow;
use vault_types::api::{Claims, FormPage, LoginForm, RegisterForm};
use vault_types::models::Role;

use crate::blocking;
use crate::error::AppError;
use crate::middleware::{
    PREFILL_COOKIE, SESSION_COOKIE, authenticate, expired_cookie, prefill_cookie, read_cookie,
    session_cookie,
};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub codec: Codec,
    pub jwt_secret: String,
    /// Mark cookies `Secure` (set when served over HTTPS).
    pub secure_cookies: bool,
}

const MAX_USERNAME_LEN: usize = 150;

/// Checked against when the username is unknown, so a miss costs the same
/// Argon2 verification as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("vault-no-such-user").ok());

/// GET /login/: form context, prefilled once after a fresh registration.
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match read_cookie(&headers, PREFILL_COOKIE) {
        Some(username) => (
            AppendHeaders([(
                header::SET_COOKIE,
                expired_cookie(PREFILL_COOKIE, state.secure_cookies),
            )]),
            Json(FormPage {
                prefill_username: Some(username),
                error: None,
            }),
        )
            .into_response(),
        None => Json(FormPage::default()).into_response(),
    }
}

/// POST /login/
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let Some(user) = check_credentials(&state, &form).await? else {
        warn!("Failed login for '{}'", form.username);
        return Ok(form_error(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials",
            Some(form.username),
        ));
    };

    start_session(&state, user, "/home/").await
}

/// GET /admin/login/
pub async fn admin_login_page() -> Json<FormPage> {
    Json(FormPage::default())
}

/// POST /admin/login/: same credentials check, but only admins get a session.
pub async fn admin_login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match check_credentials(&state, &form).await? {
        Some(user) if user.role.is_admin() => start_session(&state, user, "/admin/dashboard/").await,
        _ => {
            warn!("Failed admin login for '{}'", form.username);
            Ok(form_error(
                StatusCode::UNAUTHORIZED,
                "Invalid admin credentials",
                None,
            ))
        }
    }
}

/// GET /register/
pub async fn register_page() -> Json<FormPage> {
    Json(FormPage::default())
}

/// POST /register/: create the account and send the user to the login form.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if form.username.trim().is_empty() || form.email.trim().is_empty() || form.password.is_empty() {
        return Ok(form_error(StatusCode::BAD_REQUEST, "All fields are required", None));
    }
    if let Err(message) = validate_username(&form.username) {
        return Ok(form_error(StatusCode::BAD_REQUEST, message, None));
    }

    let db = state.clone();
    let username = form.username.clone();
    let created = blocking(move || {
        if db.db.get_user_by_username(&username)?.is_some() {
            return Ok(None);
        }
        let password_hash = hash_password(&form.password)?;
        Ok(db.db.create_user(&username, &form.email, &password_hash, Role::User)?)
    })
    .await?;

    let Some(user_id) = created else {
        return Ok(form_error(StatusCode::CONFLICT, "Username already taken", None));
    };

    info!("Registered user {} (id {})", form.username, user_id);

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            prefill_cookie(&form.username, state.secure_cookies),
        )]),
        Redirect::to("/login/"),
    )
        .into_response())
}

/// GET /logout/: records the logout, which also revokes the presented token.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    if let Some(user) = authenticate(&state, &headers).await? {
        // Never earlier than the session's own login, so this token is dead.
        let at = DateTime::from_timestamp_millis(Utc::now().timestamp_millis().max(user.login_at))
            .unwrap_or_else(Utc::now);
        let db = state.clone();
        blocking(move || Ok(db.db.record_logout(user.id, at)?)).await?;
        info!("User {} logged out", user.username);
    }

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            expired_cookie(SESSION_COOKIE, state.secure_cookies),
        )]),
        Redirect::to("/"),
    )
        .into_response())
}

async fn check_credentials(state: &AppState, form: &LoginForm) -> Result<Option<UserRow>, AppError> {
    let db = state.clone();
    let username = form.username.clone();
    let password = form.password.clone();

    blocking(move || {
        let Some(user) = db.db.get_user_by_username(&username)? else {
            if let Some(hash) = DUMMY_HASH.as_deref() {
                verify_password(hash, &password);
            }
            return Ok(None);
        };
        Ok(verify_password(&user.password, &password).then_some(user))
    })
    .await
}

async fn start_session(state: &AppState, user: UserRow, redirect_to: &str) -> Result<Response, AppError> {
    // Strictly after the last logout, or the new token would be born revoked.
    let floor = user.last_logout.map_or(i64::MIN, |t| t.timestamp_millis() + 1);
    let login_at = Utc::now().timestamp_millis().max(floor);
    let at = DateTime::from_timestamp_millis(login_at).unwrap_or_else(Utc::now);

    let db = state.clone();
    let user_id = user.id;
    blocking(move || Ok(db.db.record_login(user_id, at)?)).await?;

    let token = create_token(&state.jwt_secret, user.id, &user.username, login_at)?;
    info!("User {} logged in", user.username);

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(&token, state.secure_cookies),
        )]),
        Redirect::to(redirect_to),
    )
        .into_response())
}

fn form_error(status: StatusCode, message: &str, prefill_username: Option<String>) -> Response {
    (
        status,
        Json(FormPage {
            prefill_username,
            error: Some(message.to_string()),
        }),
    )
        .into_response()
}

/// Letters, digits and `@.+-_`, at most 150 characters.
fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err("Username must be at most 150 characters");
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || "@.+-_".contains(c);
    if !username.chars().all(allowed) {
        return Err("Username may contain only letters, digits and @/./+/-/_");
    }
    Ok(())
}

pub fn create_token(secret: &str, user_id: i64, username: &str, login_at: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
        login_at,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Hash a password with Argon2id into a PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string. Unparseable hashes never match.
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Make sure `username` exists and holds the admin role, creating the account
/// if needed. An existing account keeps its password.
pub fn ensure_admin(db: &Database, username: &str, email: &str, password: &str) -> anyhow::Result<i64> {
    if let Some(user) = db.get_user_by_username(username)? {
        if !user.role.is_admin() {
            db.set_role(user.id, Role::Admin)?;
            info!("Promoted existing user {} to admin", username);
        }
        return Ok(user.id);
    }

    let password_hash = hash_password(password)?;
    let id = db
        .create_user(username, email, &password_hash, Role::Admin)?
        .ok_or_else(|| anyhow::anyhow!("Username {} was taken concurrently", username))?;
    info!("Created admin account {}", username);
    Ok(id)
}
