use chrono::{DateTime, Utc};
use core::num::NonZeroU64;
use serde::{Deserialize, Serialize};

/// One participant's run through one quiz.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user: NonZeroU64,
    pub quiz_id: i64,
    pub total_score: i64,
    /// Seconds from session start until completion.
    pub total_time: i32,
    pub started_at: DateTime<Utc>,
    /// Unfinished attempts never appear on the leaderboard.
    pub completed_at: Option<DateTime<Utc>>,
    /// Played in a private session. Kept out of every public ranking.
    pub private: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuestionAttempt {
    pub quiz_attempt_id: i64,
    pub question_id: i64,
    pub selected_answer: u32,
    pub is_correct: bool,
    pub time_spent: i32,
    pub points_earned: i32,
    pub answered_at: DateTime<Utc>,
    pub answer_rank: Option<i32>,
    pub was_fastest_correct: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewQuizAttempt {
    pub user: NonZeroU64,
    pub quiz_id: i64,
    pub total_score: i64,
    pub total_time: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub private: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewQuestionAttempt {
    pub question_id: i64,
    pub selected_answer: u32,
    pub is_correct: bool,
    pub time_spent: i32,
    pub points_earned: i32,
    pub answered_at: DateTime<Utc>,
    pub answer_rank: i32,
    pub was_fastest_correct: bool,
}
