#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod attempt;
pub mod corpus;
pub mod quiz;
pub mod score;

pub use attempt::{NewQuestionAttempt, NewQuizAttempt, QuestionAttempt, QuizAttempt};
pub use chrono::{DateTime, Utc};
pub use corpus::{Corpus, CorpusEntry};
pub use quiz::{Hint, NewHint, NewQuestion, NewQuiz, Question, Quiz, QuizFilter};
pub use score::{Period, Score, ScoreKey};

use alloc::string::String;
use core::num::NonZeroU64;
use serde::{Deserialize, Serialize};

/// A platform user as last seen by the bot.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: NonZeroU64,
    pub username: String,
}
