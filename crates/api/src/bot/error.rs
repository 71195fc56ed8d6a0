use crate::session;
use core::fmt::{self, Display};

#[derive(Debug)]
pub enum Error {
    UnsupportedInteraction,
    UnknownUser,
    UnknownCommandName,
    InvalidParams,
    /// Component payload that does not decode into an action.
    Malformed,
    MissingChannel,
    UnknownQuiz,
    UnknownCorpus,
    EmptyCorpus,
    DuplicateTitle,
    NotOwner,
    NoActiveQuiz,
    Session(session::error::Error),
    Database,
    Fatal,
}

impl From<session::error::Error> for Error {
    fn from(err: session::error::Error) -> Self {
        Self::Session(err)
    }
}

impl From<db::error::Error> for Error {
    fn from(err: db::error::Error) -> Self {
        use db::error::Error as DbError;
        match err {
            DbError::NotFound => Self::UnknownQuiz,
            DbError::AlreadyExists => Self::DuplicateTitle,
            DbError::BadInput => Self::InvalidParams,
            err => {
                log::error!("database request failed: {err}");
                Self::Database
            }
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnsupportedInteraction => "Unsupported interaction.",
            Self::UnknownUser => "Unknown user.",
            Self::UnknownCommandName => "Unknown command name.",
            Self::InvalidParams => "Invalid parameter list.",
            Self::Malformed => "That button no longer makes sense to us.",
            Self::MissingChannel => "This command must be used inside a channel.",
            Self::UnknownQuiz => "That quiz does not exist.",
            Self::UnknownCorpus => "That corpus does not exist.",
            Self::EmptyCorpus => "That corpus has no usable entries.",
            Self::DuplicateTitle => "A quiz with that title already exists.",
            Self::NotOwner => "Only the owner of this quiz may do that.",
            Self::NoActiveQuiz => "There is no quiz running in this channel.",
            Self::Session(err) => return Display::fmt(err, f),
            Self::Database => "We encountered an unexpected database error on our end.",
            Self::Fatal => "Oops! We encountered a logic error on our end. This is a bug.",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
