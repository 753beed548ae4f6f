use serde::{Deserialize, Serialize};

use crate::models::{FileInfo, User};

// -- JWT Claims --

/// Session token claims. `login_at` is the login instant in Unix milliseconds;
/// a token is dead once the user logs out at or after that instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
    pub login_at: i64,
}

// -- Auth forms --

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

// -- Pages --

#[derive(Debug, Serialize)]
pub struct IndexPage {
    pub app: &'static str,
    pub authenticated: bool,
}

/// Context for the login, admin login and registration forms.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FormPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefill_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HomePage {
    pub username: String,
    /// Name of the multipart field `/upload/` expects.
    pub upload_field: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileListPage {
    pub username: String,
    pub files: Vec<FileInfo>,
}

/// Inline view of a file. `content` is only present for text files.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileViewPage {
    pub filename: String,
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardPage {
    pub users: Vec<User>,
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
