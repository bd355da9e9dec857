use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS admins (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS issues (
            id                  TEXT PRIMARY KEY,
            latitude            REAL NOT NULL,
            longitude           REAL NOT NULL,
            location            TEXT NOT NULL,
            issue_title         TEXT NOT NULL,
            description         TEXT,
            category            TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'open',
            assigned_official   TEXT,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_issues_created
            ON issues(created_at);

        CREATE TABLE IF NOT EXISTS issue_images (
            id          TEXT PRIMARY KEY,
            issue_id    TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
            image_url   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_issue_images_issue
            ON issue_images(issue_id);

        CREATE TABLE IF NOT EXISTS issue_upvotes (
            issue_id    TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (issue_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS issue_comments (
            id          TEXT PRIMARY KEY,
            issue_id    TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            comment     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_issue_comments_issue
            ON issue_comments(issue_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
