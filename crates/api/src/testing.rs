//! In-memory stand-ins for the database and the chat platform.

use crate::chat::{self, ChannelId, Chat, Edit, MessageId, Outgoing, Sent, Target, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use core::num::NonZeroU64;
use db::{
    error::{Error, Result},
    Corpus, CorpusEntry, Hint, NewQuestion, NewQuestionAttempt, NewQuiz, NewQuizAttempt, Question, QuestionAttempt,
    Quiz, QuizAttempt, QuizFilter, Repository, Score, ScoreKey, User,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
};
use tokio::time::Instant;

#[derive(Default)]
struct Tables {
    quizzes: Vec<Quiz>,
    questions: Vec<Question>,
    hints: Vec<Hint>,
    users: Vec<User>,
    attempts: Vec<QuizAttempt>,
    answers: Vec<QuestionAttempt>,
    scores: Vec<Score>,
    corpora: Vec<Corpus>,
    entries: Vec<CorpusEntry>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryRepo {
    tables: Mutex<Tables>,
    /// Users whose attempts fail to save.
    pub failing_users: Mutex<HashSet<NonZeroU64>>,
    pub failing_scores: AtomicBool,
}

impl MemoryRepo {
    pub fn add_corpus(&self, title: &str, entries: Vec<CorpusEntry>) -> i64 {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        tables.corpora.push(Corpus { id, title: String::from(title) });
        tables.entries.extend(entries.into_iter().map(|entry| CorpusEntry { corpus_id: id, ..entry }));
        id
    }

    pub fn attempts(&self) -> Vec<QuizAttempt> {
        self.tables.lock().unwrap().attempts.clone()
    }

    pub fn answers(&self) -> Vec<QuestionAttempt> {
        self.tables.lock().unwrap().answers.clone()
    }

    pub fn scores(&self) -> Vec<Score> {
        self.tables.lock().unwrap().scores.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.tables.lock().unwrap().users.clone()
    }
}

#[async_trait]
impl Repository for MemoryRepo {
    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>> {
        Ok(self.tables.lock().unwrap().quizzes.iter().find(|quiz| quiz.id == id).cloned())
    }

    async fn find_quiz_by_title(&self, title: &str) -> Result<Option<Quiz>> {
        Ok(self.tables.lock().unwrap().quizzes.iter().find(|quiz| quiz.title == title).cloned())
    }

    async fn list_quizzes(&self, filter: QuizFilter) -> Result<Vec<Quiz>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .quizzes
            .iter()
            .filter(|quiz| !filter.active_only || quiz.is_active)
            .filter(|quiz| filter.owner.is_none() || quiz.owner == filter.owner)
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn create_quiz(&self, quiz: &NewQuiz, questions: &[NewQuestion]) -> Result<Quiz> {
        let mut tables = self.tables.lock().unwrap();
        if tables.quizzes.iter().any(|other| other.title == quiz.title) {
            return Err(Error::AlreadyExists);
        }
        if questions.iter().any(|question| question.answer >= question.options.len()) {
            return Err(Error::BadInput);
        }

        let id = tables.next_id();
        let created = Quiz {
            id,
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            is_active: true,
            private: quiz.private,
            time_limit: quiz.time_limit,
            owner: quiz.owner,
        };
        tables.quizzes.push(created.clone());
        for (position, question) in (0..).zip(questions) {
            let question_id = tables.next_id();
            tables.questions.push(Question {
                id: question_id,
                quiz_id: id,
                position,
                text: question.text.clone(),
                options: question.options.clone(),
                answer: question.answer,
                points: question.points,
                time_limit: question.time_limit,
                image: question.image.clone(),
                image_alt: question.image_alt.clone(),
            });
            for hint in &question.hints {
                let hint_id = tables.next_id();
                tables.hints.push(Hint { id: hint_id, question_id, title: hint.title.clone(), text: hint.text.clone() });
            }
        }
        Ok(created)
    }

    async fn delete_quiz(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.quizzes.len();
        tables.quizzes.retain(|quiz| quiz.id != id);
        if tables.quizzes.len() == before {
            return Err(Error::NotFound);
        }
        let questions: HashSet<_> =
            tables.questions.iter().filter(|question| question.quiz_id == id).map(|question| question.id).collect();
        tables.questions.retain(|question| question.quiz_id != id);
        tables.hints.retain(|hint| !questions.contains(&hint.question_id));
        let attempts: HashSet<_> =
            tables.attempts.iter().filter(|attempt| attempt.quiz_id == id).map(|attempt| attempt.id).collect();
        tables.attempts.retain(|attempt| attempt.quiz_id != id);
        tables.answers.retain(|answer| !attempts.contains(&answer.quiz_attempt_id));
        Ok(())
    }

    async fn list_questions(&self, quiz: i64) -> Result<Vec<Question>> {
        let tables = self.tables.lock().unwrap();
        let mut questions: Vec<_> = tables.questions.iter().filter(|question| question.quiz_id == quiz).cloned().collect();
        questions.sort_by_key(|question| question.position);
        Ok(questions)
    }

    async fn list_hints(&self, quiz: i64) -> Result<Vec<Hint>> {
        let tables = self.tables.lock().unwrap();
        let questions: HashSet<_> =
            tables.questions.iter().filter(|question| question.quiz_id == quiz).map(|question| question.id).collect();
        Ok(tables.hints.iter().filter(|hint| questions.contains(&hint.question_id)).cloned().collect())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        match tables.users.iter_mut().find(|other| other.id == user.id) {
            Some(existing) => existing.username.clone_from(&user.username),
            None => tables.users.push(user.clone()),
        }
        Ok(())
    }

    async fn find_users(&self, ids: &[NonZeroU64]) -> Result<Vec<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().filter(|user| ids.contains(&user.id)).cloned().collect())
    }

    async fn save_attempt(&self, attempt: &NewQuizAttempt, answers: &[NewQuestionAttempt]) -> Result<i64> {
        if self.failing_users.lock().unwrap().contains(&attempt.user) {
            return Err(Error::Unavailable);
        }
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        tables.attempts.push(QuizAttempt {
            id,
            user: attempt.user,
            quiz_id: attempt.quiz_id,
            total_score: attempt.total_score,
            total_time: attempt.total_time,
            started_at: attempt.started_at,
            completed_at: Some(attempt.completed_at),
            private: attempt.private,
        });
        tables.answers.extend(answers.iter().map(|answer| QuestionAttempt {
            quiz_attempt_id: id,
            question_id: answer.question_id,
            selected_answer: answer.selected_answer,
            is_correct: answer.is_correct,
            time_spent: answer.time_spent,
            points_earned: answer.points_earned,
            answered_at: answer.answered_at,
            answer_rank: Some(answer.answer_rank),
            was_fastest_correct: Some(answer.was_fastest_correct),
        }));
        Ok(id)
    }

    async fn list_attempts(&self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Result<Vec<QuizAttempt>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .attempts
            .iter()
            .filter(|attempt| attempt.completed_at.is_some() && !attempt.private)
            .filter(|attempt| from.map_or(true, |from| attempt.started_at >= from))
            .filter(|attempt| until.map_or(true, |until| attempt.started_at < until))
            .cloned()
            .collect())
    }

    async fn list_question_attempts(&self, attempts: &[i64]) -> Result<Vec<QuestionAttempt>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.answers.iter().filter(|answer| attempts.contains(&answer.quiz_attempt_id)).cloned().collect())
    }

    async fn find_score(&self, key: &ScoreKey) -> Result<Option<Score>> {
        Ok(self.tables.lock().unwrap().scores.iter().find(|score| score.key == *key).cloned())
    }

    async fn save_score(&self, score: &Score) -> Result<()> {
        if self.failing_scores.load(Ordering::SeqCst) {
            return Err(Error::Unavailable);
        }
        let mut tables = self.tables.lock().unwrap();
        tables.scores.retain(|other| other.key != score.key);
        tables.scores.push(score.clone());
        Ok(())
    }

    async fn find_corpus_by_title(&self, title: &str) -> Result<Option<Corpus>> {
        Ok(self.tables.lock().unwrap().corpora.iter().find(|corpus| corpus.title == title).cloned())
    }

    async fn list_corpus_entries(&self, corpus: i64) -> Result<Vec<CorpusEntry>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.entries.iter().filter(|entry| entry.corpus_id == corpus).cloned().collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Send(Target, Outgoing, MessageId),
    Edit(MessageId, Edit),
    Clear(MessageId),
}

/// Records every request. Sent messages are stamped with a server clock that follows Tokio's
/// (possibly paused) clock from a fixed origin.
pub struct RecordingChat {
    events: Mutex<Vec<Event>>,
    next_id: AtomicU64,
    origin: Instant,
    /// Users that cannot be resolved.
    pub unknown_users: Mutex<HashSet<UserId>>,
    pub failing_sends: AtomicBool,
}

impl Default for RecordingChat {
    fn default() -> Self {
        Self {
            events: Mutex::default(),
            next_id: AtomicU64::new(1),
            origin: Instant::now(),
            unknown_users: Mutex::default(),
            failing_sends: AtomicBool::new(false),
        }
    }
}

impl RecordingChat {
    /// Current time on the fake server clock.
    pub fn now(&self) -> DateTime<Utc> {
        let base = Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap();
        let elapsed = Instant::now().duration_since(self.origin);
        base + Duration::from_std(elapsed).unwrap()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(Target, Outgoing)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Send(target, message, _) => Some((target, message)),
                _ => None,
            })
            .collect()
    }

    /// Titles of every embed sent so far, in order.
    pub fn titles(&self) -> Vec<String> {
        self.sent().into_iter().flat_map(|(_, message)| message.embeds).filter_map(|embed| embed.title).collect()
    }

    pub fn edits(&self) -> usize {
        self.events().iter().filter(|event| matches!(event, Event::Edit(..))).count()
    }

    pub fn cleared(&self) -> Vec<MessageId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Clear(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("simulated delivery failure")]
struct Unreachable;

#[async_trait]
impl Chat for RecordingChat {
    async fn send(&self, target: Target, message: Outgoing) -> chat::Result<Sent> {
        if self.failing_sends.load(Ordering::SeqCst) {
            return Err(chat::Error::new(Unreachable));
        }
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let channel = match target {
            Target::Channel(channel) => channel,
            Target::Direct(user) => ChannelId::new(user.get()),
        };
        self.events.lock().unwrap().push(Event::Send(target, message, id));
        Ok(Sent { channel, id, timestamp: self.now() })
    }

    async fn edit(&self, _: ChannelId, message: MessageId, edit: Edit) -> chat::Result<()> {
        self.events.lock().unwrap().push(Event::Edit(message, edit));
        Ok(())
    }

    async fn clear_components(&self, _: ChannelId, message: MessageId) -> chat::Result<()> {
        self.events.lock().unwrap().push(Event::Clear(message));
        Ok(())
    }

    async fn username(&self, user: UserId) -> chat::Result<Option<String>> {
        if self.unknown_users.lock().unwrap().contains(&user) {
            return Ok(None);
        }
        Ok(Some(format!("live{user}")))
    }
}
