use thiserror::Error;

/// Everything a catalog or loan operation can fail with.
///
/// None of these are fatal: the shell reports the message and the user
/// carries on with the next action.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Uniqueness(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Format(String),

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

impl LibraryError {
    pub(crate) fn required(field: &str) -> Self {
        LibraryError::Validation(format!("Please fill out the {} field.", field))
    }

    pub(crate) fn bad_date(field: &str, value: &str) -> Self {
        LibraryError::Format(format!("Invalid {} '{}'. Use YYYY-MM-DD.", field, value))
    }

    /// True when sqlite rejected a write because of a UNIQUE constraint.
    pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(inner, _)
                if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}
