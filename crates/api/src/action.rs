//! Button payloads. Every interactive component carries one of these as its custom id.

use crate::session::SessionId;
use core::{
    fmt::{self, Display},
    str::FromStr,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Join(SessionId),
    Begin(SessionId),
    Answer { session: SessionId, question: usize, option: usize },
    Hint { session: SessionId, question: usize, hint: usize },
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join(session) => write!(f, "join:{}", session.simple()),
            Self::Begin(session) => write!(f, "begin:{}", session.simple()),
            Self::Answer { session, question, option } => write!(f, "answer:{}:{question}:{option}", session.simple()),
            Self::Hint { session, question, hint } => write!(f, "hint:{}:{question}:{hint}", session.simple()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MalformedAction;

impl FromStr for Action {
    type Err = MalformedAction;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let kind = parts.next().ok_or(MalformedAction)?;
        let session = parts.next().ok_or(MalformedAction)?.parse().map_err(|_| MalformedAction)?;
        let mut index = || -> Result<usize, MalformedAction> {
            parts.next().ok_or(MalformedAction)?.parse().map_err(|_| MalformedAction)
        };

        let action = match kind {
            "join" => Self::Join(session),
            "begin" => Self::Begin(session),
            "answer" => Self::Answer { session, question: index()?, option: index()? },
            "hint" => Self::Hint { session, question: index()?, hint: index()? },
            _ => return Err(MalformedAction),
        };

        if parts.next().is_some() {
            return Err(MalformedAction);
        }
        Ok(action)
    }
}
