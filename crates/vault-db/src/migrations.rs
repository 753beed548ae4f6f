use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, files)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                username     TEXT NOT NULL UNIQUE,
                email        TEXT NOT NULL,
                password     TEXT NOT NULL,
                role         TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                date_joined  TEXT NOT NULL,
                last_login   TEXT,
                last_logout  TEXT
            );

            CREATE TABLE files (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                filename        TEXT NOT NULL,
                encrypted_data  BLOB NOT NULL,
                upload_time     TEXT NOT NULL
            );

            CREATE INDEX idx_files_owner ON files(owner_id, upload_time);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
