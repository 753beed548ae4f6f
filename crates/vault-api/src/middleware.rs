use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Cookie, HeaderMapExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, warn};
use vault_types::api::Claims;
use vault_types::models::Role;

use crate::auth::AppState;
use crate::blocking;
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "vault_session";
pub const PREFILL_COOKIE: &str = "vault_prefill";

pub const USER_LOGIN: &str = "/login/";
pub const ADMIN_LOGIN: &str = "/admin/login/";

/// The authenticated caller, inserted into request extensions by
/// [`require_user`] and [`require_admin`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    /// Login instant of the presented session, Unix milliseconds.
    pub login_at: i64,
}

/// Session token from an `Authorization: Bearer` header or the session cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    read_cookie(headers, SESSION_COOKIE)
}

/// Resolve the caller's session, if any.
///
/// A token is accepted only if its signature and expiry check out, the user
/// still exists, and the user has not logged out since the token was issued.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<CurrentUser>, AppError> {
    let Some(token) = session_token(headers) else {
        return Ok(None);
    };

    let claims = match decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data.claims,
        Err(e) => {
            debug!("Rejected session token: {}", e);
            return Ok(None);
        }
    };

    let db = state.clone();
    let user_id = claims.sub;
    let Some(user) = blocking(move || Ok(db.db.get_user_by_id(user_id)?)).await? else {
        return Ok(None);
    };

    if user
        .last_logout
        .is_some_and(|out| out.timestamp_millis() >= claims.login_at)
    {
        debug!("Session of {} ended by logout", user.username);
        return Ok(None);
    }

    Ok(Some(CurrentUser {
        id: user.id,
        username: user.username,
        role: user.role,
        login_at: claims.login_at,
    }))
}

pub async fn require_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, &headers)
        .await?
        .ok_or(AppError::Unauthenticated { login: USER_LOGIN })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, &headers)
        .await?
        .ok_or(AppError::Unauthenticated { login: ADMIN_LOGIN })?;

    if !user.role.is_admin() {
        warn!("Non-admin {} tried {}", user.username, req.uri().path());
        return Err(AppError::Unauthenticated { login: ADMIN_LOGIN });
    }

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

// -- Cookies --

pub(crate) fn session_cookie(token: &str, secure: bool) -> String {
    cookie(SESSION_COOKIE, token, 30 * 24 * 60 * 60, secure)
}

pub(crate) fn prefill_cookie(username: &str, secure: bool) -> String {
    cookie(PREFILL_COOKIE, username, 5 * 60, secure)
}

pub(crate) fn expired_cookie(name: &str, secure: bool) -> String {
    cookie(name, "", 0, secure)
}

fn cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub(crate) fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .typed_get::<Cookie>()
        .and_then(|c| c.get(name).map(str::to_string))
}
