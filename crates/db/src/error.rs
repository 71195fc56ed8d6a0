use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("resource not found")]
    NotFound,
    /// The input violates a schema constraint.
    #[error("unacceptable input")]
    BadInput,
    #[error("resource already exists")]
    AlreadyExists,
    /// A stored row could not be decoded into its record type.
    #[error("malformed `{0}` column")]
    Schema(&'static str),
    #[error("database connection is closed")]
    Unavailable,
    #[error(transparent)]
    Postgres(tokio_postgres::Error),
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        use tokio_postgres::error::SqlState;
        match err.code() {
            Some(&SqlState::UNIQUE_VIOLATION) => Self::AlreadyExists,
            Some(&SqlState::CHECK_VIOLATION | &SqlState::STRING_DATA_RIGHT_TRUNCATION) => Self::BadInput,
            _ if err.is_closed() => Self::Unavailable,
            _ => Self::Postgres(err),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
