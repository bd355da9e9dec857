use rusqlite::ErrorCode;
use rusqlite::ffi;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

/// Storage failures, with the constraint violations callers care about
/// pulled out into their own variants.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl DbError {
    /// Translate a constraint violation into `Conflict` (unique or primary
    /// key) or `NotFound` (foreign key). Anything else passes through.
    pub(crate) fn from_constraint(
        err: rusqlite::Error,
        duplicate: &'static str,
        missing: &'static str,
    ) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
            if failure.code == ErrorCode::ConstraintViolation {
                match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        return DbError::Conflict(duplicate);
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return DbError::NotFound(missing),
                    _ => {}
                }
            }
        }
        DbError::Sqlite(err)
    }
}
