use crate::Database;
use crate::models::{FileMetaRow, FileRow, UserRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use vault_types::models::Role;

const USER_COLUMNS: &str =
    "id, username, email, password, role, date_joined, last_login, last_logout";

impl Database {
    // -- Users --

    /// Insert a user. Returns `None` when the username is already taken.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, email, password, role, date_joined)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![username, email, password_hash, role.as_str(), Utc::now()],
            );

            match inserted {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn record_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                rusqlite::params![at, user_id],
            )?;
            Ok(())
        })
    }

    pub fn record_logout(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_logout = ?1 WHERE id = ?2",
                rusqlite::params![at, user_id],
            )?;
            Ok(())
        })
    }

    /// Change a user's role. Returns false if no such user exists.
    pub fn set_role(&self, user_id: i64, role: Role) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                rusqlite::params![role.as_str(), user_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Files --

    pub fn create_file(
        &self,
        owner_id: i64,
        filename: &str,
        encrypted_data: &[u8],
        upload_time: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO files (owner_id, filename, encrypted_data, upload_time)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![owner_id, filename, encrypted_data, upload_time],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_file(&self, id: i64) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, owner_id, filename, encrypted_data, upload_time
                     FROM files WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(FileRow {
                            id: row.get(0)?,
                            owner_id: row.get(1)?,
                            filename: row.get(2)?,
                            encrypted_data: row.get(3)?,
                            upload_time: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Permanently delete a file. Returns false if it was already gone.
    pub fn delete_file(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM files WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn list_files_for_owner(&self, owner_id: i64) -> Result<Vec<FileMetaRow>> {
        self.with_conn(|conn| query_file_meta(conn, Some(owner_id)))
    }

    pub fn list_all_files(&self) -> Result<Vec<FileMetaRow>> {
        self.with_conn(|conn| query_file_meta(conn, None))
    }
}

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    value: P,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {predicate}"
    ))?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let role: String = row.get(4)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role,
        date_joined: row.get(5)?,
        last_login: row.get(6)?,
        last_logout: row.get(7)?,
    })
}

fn query_file_meta(conn: &Connection, owner_id: Option<i64>) -> Result<Vec<FileMetaRow>> {
    // JOIN users to fetch the owner's name in a single query
    let mut stmt = conn.prepare(
        "SELECT f.id, f.owner_id, u.username, f.filename, f.upload_time
         FROM files f
         JOIN users u ON f.owner_id = u.id
         WHERE ?1 IS NULL OR f.owner_id = ?1
         ORDER BY f.upload_time, f.id",
    )?;

    let rows = stmt
        .query_map([owner_id], |row| {
            Ok(FileMetaRow {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                owner_username: row.get(2)?,
                filename: row.get(3)?,
                upload_time: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
