use alloc::{string::String, vec::Vec};
use core::num::NonZeroU64;
use serde::{Deserialize, Serialize};

/// Persisted quiz header. The ordered questions live in their own table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Inactive quizzes cannot be started.
    pub is_active: bool,
    /// Private quizzes are always run for their invoker over direct messages.
    pub private: bool,
    /// Total time limit for a whole run (in seconds).
    pub time_limit: Option<u32>,
    pub owner: Option<NonZeroU64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    /// Zero-based position within the quiz.
    pub position: u32,
    pub text: String,
    /// Decoded from the JSON array stored in the database.
    pub options: Vec<String>,
    /// Index into [`Question::options`].
    pub answer: usize,
    pub points: u32,
    /// Per-question time limit (in seconds). Falls back to the process-wide default.
    pub time_limit: Option<u32>,
    /// File name relative to the configured image directory.
    pub image: Option<String>,
    pub image_alt: Option<String>,
}

impl Question {
    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.answer).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Hint {
    pub id: i64,
    pub question_id: i64,
    pub title: String,
    pub text: String,
}

/// Listing filter with simple offset pagination. A zero `limit` lists nothing.
#[derive(Clone, Copy, Debug)]
pub struct QuizFilter {
    pub owner: Option<NonZeroU64>,
    pub active_only: bool,
    pub offset: u32,
    pub limit: u32,
}

impl QuizFilter {
    /// Page size of an unspecified listing.
    pub const PAGE: u32 = 25;
}

impl Default for QuizFilter {
    fn default() -> Self {
        Self { owner: None, active_only: false, offset: 0, limit: Self::PAGE }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewQuiz {
    pub title: String,
    pub description: Option<String>,
    pub private: bool,
    pub time_limit: Option<u32>,
    pub owner: Option<NonZeroU64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub answer: usize,
    pub points: u32,
    pub time_limit: Option<u32>,
    pub image: Option<String>,
    pub image_alt: Option<String>,
    pub hints: Vec<NewHint>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewHint {
    pub title: String,
    pub text: String,
}
