use super::{
    error::{Error, Result},
    scoring, SessionId,
};
use crate::{
    chat::{ChannelId, Sent, UserId},
    settings::Settings,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use model::{Hint, Question, Quiz};
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

/// A recorded answer. Never overwritten once inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct Answer {
    pub option: usize,
    pub correct: bool,
    pub time_spent: u32,
    /// Total awarded for this answer, speed bonus included.
    pub points: u32,
    pub speed_bonus: u32,
    /// One-based arrival order within the question.
    pub rank: u32,
    /// Whether this was the first correct answer to the question.
    pub fastest: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Participant {
    pub user: UserId,
    /// Display name at the time of joining.
    pub username: String,
    pub score: u32,
    pub streak: u32,
    /// Keyed by question index.
    pub answers: BTreeMap<usize, Answer>,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(user: UserId, username: String, joined_at: DateTime<Utc>) -> Self {
        Self { user, username, score: 0, streak: 0, answers: BTreeMap::new(), joined_at }
    }

    /// Mean of the time spent on answered questions only.
    pub fn average_time(&self) -> Option<f64> {
        if self.answers.is_empty() {
            return None;
        }
        let total: f64 = self.answers.values().map(|answer| f64::from(answer.time_spent)).sum();
        Some(total / self.answers.len() as f64)
    }

    pub fn correct_count(&self) -> usize {
        self.answers.values().filter(|answer| answer.correct).count()
    }
}

/// Mutable state of one quiz run. Every mutation happens under the session's lock.
pub struct QuizSession {
    pub id: SessionId,
    pub quiz: Quiz,
    pub channel: ChannelId,
    pub owner: Option<UserId>,
    pub questions: Vec<Question>,
    /// Hints keyed by question id.
    pub hints: HashMap<i64, Vec<Hint>>,
    pub current: usize,
    /// In join order.
    pub participants: IndexMap<UserId, Participant>,
    pub active: bool,
    pub waiting: bool,
    pub question_complete: bool,
    pub private: bool,
    pub persist: bool,
    /// Length of the join phase (in seconds).
    pub wait: u32,
    /// Answers received for the current question.
    pub submissions: u32,
    /// First correct answerer of the current question.
    pub fastest: Option<UserId>,
    /// Server timestamp of the current question message.
    pub question_started_at: Option<DateTime<Utc>>,
    pub join_message: Option<Sent>,
    pub question_message: Option<Sent>,
    pub started_at: DateTime<Utc>,
    pub last_progress: Option<Instant>,
}

impl QuizSession {
    pub fn new(id: SessionId, quiz: Quiz, channel: ChannelId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            private: quiz.private,
            quiz,
            channel,
            owner: None,
            questions: Vec::new(),
            hints: HashMap::new(),
            current: 0,
            participants: IndexMap::new(),
            active: true,
            waiting: true,
            question_complete: false,
            persist: true,
            wait: 0,
            submissions: 0,
            fastest: None,
            question_started_at: None,
            join_message: None,
            question_message: None,
            started_at,
            last_progress: None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn time_limit(&self, question: &Question, settings: &Settings) -> u32 {
        question.time_limit.unwrap_or(settings.question_timeout)
    }

    pub fn join(&mut self, user: UserId, username: String, at: DateTime<Utc>) -> Result<()> {
        if !self.active || !self.waiting {
            return Err(Error::NotWaiting);
        }
        if self.participants.contains_key(&user) {
            return Err(Error::AlreadyJoined);
        }
        self.participants.insert(user, Participant::new(user, username, at));
        Ok(())
    }

    /// Leaves the join phase. Only the first caller succeeds.
    pub fn begin(&mut self) -> Result<()> {
        if !self.active {
            return Err(Error::UnknownSession);
        }
        if !self.waiting {
            return Err(Error::AlreadyStarted);
        }
        self.waiting = false;
        self.question_complete = false;
        Ok(())
    }

    /// Resets the per-question bookkeeping once the question message is confirmed.
    pub fn open_question(&mut self, message: Option<Sent>, started_at: DateTime<Utc>) {
        self.submissions = 0;
        self.fastest = None;
        self.question_complete = false;
        self.question_message = message;
        self.question_started_at = Some(started_at);
        self.last_progress = None;
    }

    /// Validates and scores an answer. The answer is stored before this returns, so concurrent
    /// duplicates are rejected regardless of any I/O that follows.
    pub fn record_answer(
        &mut self,
        user: UserId,
        question: usize,
        option: usize,
        at: DateTime<Utc>,
        settings: &Settings,
    ) -> Result<Answer> {
        if !self.active || self.waiting {
            return Err(Error::NotRunning);
        }
        if question != self.current || self.question_complete {
            return Err(Error::StaleQuestion);
        }

        let (Some(current), Some(started)) = (self.questions.get(question), self.question_started_at) else {
            return Err(Error::StaleQuestion);
        };
        let participant = self.participants.get_mut(&user).ok_or(Error::NotParticipant)?;
        if participant.answers.contains_key(&question) {
            return Err(Error::AlreadyAnswered);
        }
        if option >= current.options.len() {
            return Err(Error::InvalidOption);
        }

        let limit = current.time_limit.unwrap_or(settings.question_timeout);
        let correct = option == current.answer;
        let time_spent = scoring::time_spent(started, at);
        let speed_bonus =
            if correct { scoring::speed_bonus(current.points, settings.speed_bonus_multiplier, time_spent, limit) } else { 0 };
        let points = if correct { current.points.saturating_add(speed_bonus) } else { 0 };

        participant.score = participant.score.saturating_add(points);
        participant.streak = if correct { participant.streak + 1 } else { 0 };

        self.submissions += 1;
        let fastest = correct && self.fastest.is_none();
        if fastest {
            self.fastest = Some(user);
        }

        let answer = Answer {
            option,
            correct,
            time_spent,
            points,
            speed_bonus,
            rank: self.submissions,
            fastest,
            answered_at: at,
        };
        participant.answers.insert(question, answer.clone());
        Ok(answer)
    }

    /// Closes the current question. Returns `false` if it was already closed or `index` is stale.
    pub fn close_question(&mut self, index: usize) -> bool {
        if !self.active || self.waiting || self.question_complete || self.current != index {
            return false;
        }
        self.question_complete = true;
        true
    }

    /// Moves past the closed question. Returns whether another question remains.
    pub fn advance(&mut self) -> bool {
        self.current += 1;
        self.question_complete = false;
        self.question_message = None;
        self.question_started_at = None;
        self.current < self.questions.len()
    }

    /// Marks the session finished. Only the first caller gets `true`.
    pub fn finish(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.waiting = false;
        self.question_complete = false;
        true
    }

    pub fn answered_count(&self, question: usize) -> usize {
        self.participants.values().filter(|participant| participant.answers.contains_key(&question)).count()
    }

    pub fn correct_count(&self, question: usize) -> usize {
        self.participants
            .values()
            .filter(|participant| participant.answers.get(&question).is_some_and(|answer| answer.correct))
            .count()
    }

    pub fn hint(&self, question: usize, hint: usize) -> Result<&Hint> {
        if !self.active || self.waiting || question != self.current || self.question_complete {
            return Err(Error::StaleQuestion);
        }
        let current = self.questions.get(question).ok_or(Error::StaleQuestion)?;
        self.hints.get(&current.id).and_then(|hints| hints.get(hint)).ok_or(Error::UnknownHint)
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u32 {
        scoring::time_spent(self.started_at, now)
    }
}
