use crate::chat;

/// Coarse classification used by callers to decide how loudly to report a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or stale interaction. Never changes session state.
    Validation,
    NotFound,
    Permission,
    Persistence,
    /// The chat platform rejected or dropped a request.
    Delivery,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("This quiz session no longer exists.")]
    UnknownSession,
    #[error("That quiz does not exist.")]
    UnknownQuiz,
    #[error("That quiz is currently disabled.")]
    InactiveQuiz,
    #[error("This quiz is no longer accepting participants.")]
    NotWaiting,
    #[error("You have already joined this quiz.")]
    AlreadyJoined,
    #[error("This quiz has already started.")]
    AlreadyStarted,
    #[error("This quiz is not running right now.")]
    NotRunning,
    #[error("That question is no longer open.")]
    StaleQuestion,
    #[error("You are not a participant of this quiz.")]
    NotParticipant,
    #[error("You have already answered this question.")]
    AlreadyAnswered,
    #[error("That option does not exist.")]
    InvalidOption,
    #[error("That hint does not exist.")]
    UnknownHint,
    #[error("A quiz is already running in this channel.")]
    ChannelBusy,
    #[error("Private quizzes need an owner that can be reached.")]
    MissingOwner,
    #[error("We could not reach the database. Please try again later.")]
    Persistence(#[from] db::error::Error),
    #[error("We could not deliver a message to the channel.")]
    Chat(#[from] chat::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownSession | Self::UnknownQuiz | Self::UnknownHint => ErrorKind::NotFound,
            Self::MissingOwner => ErrorKind::Permission,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Chat(_) => ErrorKind::Delivery,
            _ => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
