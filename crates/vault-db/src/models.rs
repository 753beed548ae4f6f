//! Database row types. These map directly to SQLite rows and stay distinct
//! from the vault-types models so the DB layer keeps its own shape.

use chrono::{DateTime, Utc};
use vault_types::models::{FileInfo, Role, User};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
    pub role: Role,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_logout: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            role: row.role,
            date_joined: row.date_joined,
            last_login: row.last_login,
            last_logout: row.last_logout,
        }
    }
}

/// A stored file including its ciphertext.
pub struct FileRow {
    pub id: i64,
    pub owner_id: i64,
    pub filename: String,
    pub encrypted_data: Vec<u8>,
    pub upload_time: DateTime<Utc>,
}

/// A stored file without its payload, joined with the owner's name.
pub struct FileMetaRow {
    pub id: i64,
    pub owner_id: i64,
    pub owner_username: String,
    pub filename: String,
    pub upload_time: DateTime<Utc>,
}

impl From<FileMetaRow> for FileInfo {
    fn from(row: FileMetaRow) -> Self {
        FileInfo {
            id: row.id,
            owner_id: row.owner_id,
            owner_username: row.owner_username,
            filename: row.filename,
            upload_time: row.upload_time,
        }
    }
}
