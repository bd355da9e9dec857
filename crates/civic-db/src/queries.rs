use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};
use uuid::Uuid;

use civic_types::api::IssuePatch;
use civic_types::models::PrincipalKind;

use crate::models::{
    CommentDeletion, CommentRow, ImageRow, IssueRow, NewIssue, PrincipalRow, UpvoteRow,
};
use crate::{Database, DbError, Result};

const ISSUE_COLUMNS: &str = "id, latitude, longitude, location, issue_title, description, \
                             category, status, assigned_official, created_at";

/// Timestamps are stored as fixed-width RFC 3339 strings so they sort
/// lexicographically.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn principal_table(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => "users",
        PrincipalKind::Admin => "admins",
    }
}

impl Database {
    // -- Principals --

    pub fn create_principal(
        &self,
        kind: PrincipalKind,
        id: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<PrincipalRow> {
        let created_at = now();
        let sql = format!(
            "INSERT INTO {} (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            principal_table(kind)
        );
        self.with_conn_mut(|conn| {
            conn.execute(&sql, params![id, username, password_hash, created_at])
                .map_err(|e| DbError::from_constraint(e, "username", kind.as_str()))?;
            Ok(PrincipalRow {
                id: id.to_string(),
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at,
            })
        })
    }

    pub fn get_principal_by_username(
        &self,
        kind: PrincipalKind,
        username: &str,
    ) -> Result<Option<PrincipalRow>> {
        let sql = format!(
            "SELECT id, username, password_hash, created_at FROM {} WHERE username = ?1",
            principal_table(kind)
        );
        self.with_conn(|conn| {
            conn.query_row(&sql, [username], |row| {
                Ok(PrincipalRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .optional()
        })
    }

    // -- Issues --

    /// Insert an issue, the submitter's upvote and the image rows in one
    /// transaction. Nothing is written if any insert fails.
    pub fn create_issue(
        &self,
        id: &str,
        issue: &NewIssue,
        submitter: Option<&str>,
        image_urls: &[String],
    ) -> Result<IssueRow> {
        let created_at = now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO issues (id, latitude, longitude, location, issue_title, description, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    issue.latitude,
                    issue.longitude,
                    issue.location,
                    issue.issue_title,
                    issue.description,
                    issue.category,
                    created_at
                ],
            )?;

            if let Some(user_id) = submitter {
                tx.execute(
                    "INSERT INTO issue_upvotes (issue_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    params![id, user_id, created_at],
                )
                .map_err(|e| DbError::from_constraint(e, "upvote", "user"))?;
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO issue_images (id, issue_id, image_url) VALUES (?1, ?2, ?3)",
                )?;
                for url in image_urls {
                    stmt.execute(params![Uuid::new_v4().to_string(), id, url])?;
                }
            }

            let row = query_issue(&tx, id)?.ok_or(DbError::NotFound("issue"))?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// All issues, newest first. Rows inserted in the same microsecond keep
    /// insertion order.
    pub fn get_issues(&self) -> Result<Vec<IssueRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ISSUE_COLUMNS} FROM issues ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], issue_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_issue(&self, id: &str) -> Result<Option<IssueRow>> {
        self.with_conn(|conn| query_issue(conn, id))
    }

    /// Write only the fields present in `patch`. Returns `None` when the
    /// issue does not exist.
    pub fn update_issue(&self, id: &str, patch: &IssuePatch) -> Result<Option<IssueRow>> {
        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        let mut set = |column: &'static str, value: Value| {
            columns.push(column);
            values.push(value);
        };
        if let Some(v) = patch.latitude {
            set("latitude", v.into());
        }
        if let Some(v) = patch.longitude {
            set("longitude", v.into());
        }
        if let Some(v) = &patch.location {
            set("location", v.clone().into());
        }
        if let Some(v) = &patch.issue_title {
            set("issue_title", v.clone().into());
        }
        if let Some(v) = &patch.description {
            set("description", v.clone().into());
        }
        if let Some(v) = &patch.category {
            set("category", v.clone().into());
        }
        if let Some(v) = &patch.status {
            set("status", v.clone().into());
        }

        if columns.is_empty() {
            return self.get_issue(id);
        }

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE issues SET {} WHERE id = ?{}",
            assignments.join(", "),
            columns.len() + 1
        );
        values.push(Value::Text(id.to_string()));

        self.with_conn_mut(|conn| {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 0 {
                return Ok(None);
            }
            query_issue(conn, id)
        })
    }

    /// Batch-fetch image rows for a set of issue IDs.
    pub fn get_images_for_issues(&self, issue_ids: &[String]) -> Result<Vec<ImageRow>> {
        if issue_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            select_in_chunks(
                conn,
                issue_ids,
                |ids| {
                    format!(
                        "SELECT issue_id, image_url FROM issue_images WHERE issue_id IN ({ids}) ORDER BY rowid"
                    )
                },
                |row| {
                    Ok(ImageRow {
                        issue_id: row.get(0)?,
                        image_url: row.get(1)?,
                    })
                },
            )
        })
    }

    // -- Upvotes --

    /// Fails with `Conflict` when the user already upvoted this issue; the
    /// primary key decides, so concurrent duplicates cannot both land.
    pub fn insert_upvote(&self, issue_id: &str, user_id: &str) -> Result<()> {
        let created_at = now();
        self.with_conn_mut(|conn| {
            if !issue_exists(conn, issue_id)? {
                return Err(DbError::NotFound("issue"));
            }
            conn.execute(
                "INSERT INTO issue_upvotes (issue_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![issue_id, user_id, created_at],
            )
            .map_err(|e| DbError::from_constraint(e, "upvote", "user"))?;
            Ok(())
        })
    }

    /// Returns the number of rows removed (0 or 1).
    pub fn delete_upvote(&self, issue_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM issue_upvotes WHERE issue_id = ?1 AND user_id = ?2",
                params![issue_id, user_id],
            )?;
            Ok(removed)
        })
    }

    pub fn get_upvotes_for_issues(&self, issue_ids: &[String]) -> Result<Vec<UpvoteRow>> {
        if issue_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            select_in_chunks(
                conn,
                issue_ids,
                |ids| {
                    format!(
                        "SELECT issue_id, user_id FROM issue_upvotes WHERE issue_id IN ({ids})
                         ORDER BY created_at, rowid"
                    )
                },
                |row| {
                    Ok(UpvoteRow {
                        issue_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                },
            )
        })
    }

    // -- Comments --

    pub fn insert_comment(
        &self,
        id: &str,
        issue_id: &str,
        user_id: &str,
        comment: &str,
    ) -> Result<CommentRow> {
        let created_at = now();
        self.with_conn_mut(|conn| {
            if !issue_exists(conn, issue_id)? {
                return Err(DbError::NotFound("issue"));
            }
            conn.execute(
                "INSERT INTO issue_comments (id, issue_id, user_id, comment, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, issue_id, user_id, comment, created_at],
            )
            .map_err(|e| DbError::from_constraint(e, "comment", "user"))?;
            Ok(CommentRow {
                id: id.to_string(),
                issue_id: issue_id.to_string(),
                user_id: user_id.to_string(),
                comment: comment.to_string(),
                created_at,
            })
        })
    }

    /// Delete a comment on behalf of `user_id`. The row is only removed when
    /// that user wrote it.
    pub fn delete_comment(
        &self,
        issue_id: &str,
        comment_id: &str,
        user_id: &str,
    ) -> Result<CommentDeletion> {
        self.with_conn_mut(|conn| {
            let author: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM issue_comments WHERE id = ?1 AND issue_id = ?2",
                    params![comment_id, issue_id],
                    |row| row.get(0),
                )
                .optional()?;

            match author {
                None => Ok(CommentDeletion::NotFound),
                Some(author) if author != user_id => Ok(CommentDeletion::NotOwner),
                Some(_) => {
                    let removed = conn.execute(
                        "DELETE FROM issue_comments WHERE id = ?1 AND user_id = ?2",
                        params![comment_id, user_id],
                    )?;
                    Ok(if removed == 1 {
                        CommentDeletion::Deleted
                    } else {
                        CommentDeletion::NotFound
                    })
                }
            }
        })
    }

    /// Batch-fetch comments for a set of issue IDs, oldest first.
    pub fn get_comments_for_issues(&self, issue_ids: &[String]) -> Result<Vec<CommentRow>> {
        if issue_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            select_in_chunks(
                conn,
                issue_ids,
                |ids| {
                    format!(
                        "SELECT id, issue_id, user_id, comment, created_at FROM issue_comments
                         WHERE issue_id IN ({ids}) ORDER BY created_at ASC, rowid ASC"
                    )
                },
                |row| {
                    Ok(CommentRow {
                        id: row.get(0)?,
                        issue_id: row.get(1)?,
                        user_id: row.get(2)?,
                        comment: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
        })
    }
}

/// Upper bound on ids bound into one `IN (...)` list. SQLite rejects
/// statements with more than 32766 variables.
const MAX_BATCH_IDS: usize = 500;

/// Run an `IN (...)` query per chunk of `issue_ids` and concatenate the
/// rows. Each id lands in exactly one chunk, so per-issue ordering holds.
fn select_in_chunks<T, F>(
    conn: &Connection,
    issue_ids: &[String],
    sql: impl Fn(&str) -> String,
    map: F,
) -> Result<Vec<T>>
where
    F: Fn(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut rows = Vec::new();
    for chunk in issue_ids.chunks(MAX_BATCH_IDS) {
        let mut stmt = conn.prepare(&sql(&placeholders(chunk.len())))?;
        for row in stmt.query_map(params_from_iter(chunk.iter()), &map)? {
            rows.push(row?);
        }
    }
    Ok(rows)
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<IssueRow> {
    Ok(IssueRow {
        id: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        location: row.get(3)?,
        issue_title: row.get(4)?,
        description: row.get(5)?,
        category: row.get(6)?,
        status: row.get(7)?,
        assigned_official: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn query_issue(conn: &Connection, id: &str) -> Result<Option<IssueRow>> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
    conn.query_row(&sql, [id], issue_from_row).optional()
}

fn issue_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM issues WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
