pub mod error;
mod registry;
mod render;
pub mod scoring;
pub mod state;
pub mod timer;

pub use render::{embed, field, feedback};

use crate::{
    chat::{self, Attachment, ChannelId, Chat, Edit, Target, UserId},
    leaderboard::Leaderboard,
    settings::Settings,
};
use chrono::{DateTime, Utc};
use core::{future::Future, pin::Pin};
use db::{NewQuestionAttempt, NewQuizAttempt, Period, Repository, User};
use error::{Error, Result};
use registry::Registry;
use state::{Answer, QuizSession};
use std::{sync::Arc, time::Duration};
use timer::{TimerKey, TimerKind, Timers};
use uuid::Uuid;

pub type SessionId = Uuid;

type Callback = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone, Copy, Debug)]
pub struct StartRequest {
    pub channel: ChannelId,
    pub quiz: i64,
    /// Join phase length (in seconds). Falls back to the configured default.
    pub wait: Option<u32>,
    /// Whether results are recorded once the quiz ends.
    pub persist: bool,
    pub private: bool,
    pub owner: Option<UserId>,
}

/// The user behind an interaction.
#[derive(Clone, Debug)]
pub struct Caller {
    pub id: UserId,
    pub name: String,
}

pub struct AnswerEvent {
    pub session: SessionId,
    pub question: usize,
    pub option: usize,
    pub user: UserId,
    /// Platform-side time of the click.
    pub at: DateTime<Utc>,
}

struct Inner {
    registry: Registry,
    timers: Timers,
    repo: Arc<dyn Repository>,
    chat: Arc<dyn Chat>,
    leaderboard: Leaderboard,
    settings: Settings,
}

/// Drives every live quiz session from the join phase to the final standings.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<Inner>,
}

impl Runner {
    pub fn new(repo: Arc<dyn Repository>, chat: Arc<dyn Chat>, settings: Settings) -> Self {
        let leaderboard = Leaderboard::new(Arc::clone(&repo));
        Self {
            inner: Arc::new(Inner {
                registry: Registry::default(),
                timers: Timers::default(),
                repo,
                chat,
                leaderboard,
                settings,
            }),
        }
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.inner.leaderboard
    }

    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.inner.repo
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// The active session bound to the channel, if any.
    pub async fn by_channel(&self, channel: ChannelId) -> Option<SessionId> {
        self.inner.registry.get_by_channel(channel).await.map(|(id, _)| id)
    }

    pub async fn start(&self, request: StartRequest) -> Result<SessionId> {
        let quiz = self.inner.repo.find_quiz(request.quiz).await?.ok_or(Error::UnknownQuiz)?;
        if !quiz.is_active {
            return Err(Error::InactiveQuiz);
        }

        let private = request.private || quiz.private;
        let owner = if private {
            let owner = request.owner.ok_or(Error::MissingOwner)?;
            let name = self.inner.chat.username(owner).await?.ok_or(Error::MissingOwner)?;
            Some((owner, name))
        } else {
            None
        };

        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut session = QuizSession::new(id, quiz, request.channel, now);
        session.private = private;
        session.persist = request.persist;
        session.wait = request.wait.unwrap_or(self.inner.settings.join_wait);
        if let Some((owner, name)) = owner {
            session.owner = Some(owner);
            session.join(owner, name, now)?;
        }

        let slot = self.inner.registry.create(session).await.ok_or(Error::ChannelBusy)?;
        let mut session = slot.state.lock().await;
        log::info!("session {id} for quiz {} started in channel {}", session.quiz.id, slot.channel);

        if private {
            session.begin()?;
            self.start_questions(&mut session).await?;
            return Ok(id);
        }

        let sent = match self.inner.chat.send(Target::Channel(slot.channel), render::join_prompt(&session)).await {
            Ok(sent) => sent,
            Err(err) => {
                session.finish();
                self.inner.registry.remove(id);
                return Err(err.into());
            }
        };
        session.join_message = Some(sent);

        let wait = Duration::from_secs(session.wait.into());
        chat::schedule_clear(Arc::clone(&self.inner.chat), sent, wait + self.inner.settings.join_grace);
        self.inner.timers.schedule_join(id, wait, self.join_timer(id));
        Ok(id)
    }

    /// Adds the caller to a waiting session. Returns the new participant count.
    pub async fn join(&self, id: SessionId, caller: Caller) -> Result<usize> {
        let slot = self.inner.registry.get(id).ok_or(Error::UnknownSession)?;
        let mut session = slot.state.lock().await;
        session.join(caller.id, caller.name, Utc::now())?;

        let count = session.participants.len();
        if let Some(message) = session.join_message {
            let edit = Edit { embeds: Some(render::join_progress(&session)), ..Default::default() };
            if let Err(err) = self.inner.chat.edit(message.channel, message.id, edit).await {
                log::warn!("could not refresh join prompt of session {id}: {err}");
            }
        }
        Ok(count)
    }

    /// Ends the join phase early.
    pub async fn manual_start(&self, id: SessionId) -> Result<()> {
        let slot = self.inner.registry.get(id).ok_or(Error::UnknownSession)?;
        let mut session = slot.state.lock().await;
        session.begin()?;
        self.inner.timers.cancel(TimerKey { session: id, kind: TimerKind::Join });
        self.start_questions(&mut session).await
    }

    pub async fn answer(&self, event: AnswerEvent) -> Result<Answer> {
        let slot = self.inner.registry.get(event.session).ok_or(Error::UnknownSession)?;
        let mut session = slot.state.lock().await;
        let answer = session.record_answer(event.user, event.question, event.option, event.at, &self.inner.settings)?;
        self.refresh_progress(&mut session).await;
        Ok(answer)
    }

    pub async fn hint(&self, id: SessionId, question: usize, hint: usize) -> Result<db::Hint> {
        let slot = self.inner.registry.get(id).ok_or(Error::UnknownSession)?;
        let session = slot.state.lock().await;
        let hint = session.hint(question, hint)?.clone();
        Ok(hint)
    }

    /// Administrative stop. Nothing is recorded.
    pub async fn stop(&self, id: SessionId) -> Result<()> {
        let slot = self.inner.registry.get(id).ok_or(Error::UnknownSession)?;
        let mut session = slot.state.lock().await;
        if !session.finish() {
            return Err(Error::UnknownSession);
        }

        self.inner.timers.cancel_all(id);
        self.clear_buttons(&mut session).await;
        self.inner.registry.remove(id);
        if let Err(err) = self.inner.chat.send(self.target(&session), render::stopped(&session)).await {
            log::error!("could not announce stop of session {id}: {err}");
        }
        log::info!("session {id} stopped");
        Ok(())
    }

    fn target(&self, session: &QuizSession) -> Target {
        match session.owner {
            Some(owner) if session.private => Target::Direct(owner),
            _ => Target::Channel(session.channel),
        }
    }

    fn join_timer(&self, id: SessionId) -> Callback {
        let runner = self.clone();
        Box::pin(async move { runner.on_join_timeout(id).await })
    }

    fn question_timer(&self, id: SessionId, index: usize) -> Callback {
        let runner = self.clone();
        Box::pin(async move { runner.on_question_timeout(id, index).await })
    }

    fn total_timer(&self, id: SessionId) -> Callback {
        let runner = self.clone();
        Box::pin(async move { runner.on_total_timeout(id).await })
    }

    async fn on_join_timeout(&self, id: SessionId) {
        let Some(slot) = self.inner.registry.get(id) else {
            log::debug!("join timer of missing session {id} ignored");
            return;
        };
        let mut session = slot.state.lock().await;
        if let Err(err) = session.begin() {
            log::debug!("join timer of session {id} ignored: {err}");
            return;
        }
        if let Err(err) = self.start_questions(&mut session).await {
            log::error!("session {id} failed to start after the join phase: {err}");
        }
    }

    async fn on_question_timeout(&self, id: SessionId, index: usize) {
        let Some(slot) = self.inner.registry.get(id) else {
            log::debug!("question timer of missing session {id} ignored");
            return;
        };
        let mut session = slot.state.lock().await;
        if !session.close_question(index) {
            log::debug!("stale question timer {index} of session {id} ignored");
            return;
        }

        if !self.show_results(&mut session).await {
            self.end_quiz(&mut session).await;
            return;
        }

        drop(session);
        tokio::time::sleep(self.inner.settings.results_delay).await;

        let mut session = slot.state.lock().await;
        if !session.active || session.current != index + 1 || session.question_started_at.is_some() {
            log::debug!("session {id} moved on while showing results of question {index}");
            return;
        }
        if let Err(err) = self.display_question(&mut session).await {
            log::error!("could not display question {} of session {id}: {err}", index + 1);
            self.end_quiz(&mut session).await;
        }
    }

    async fn on_total_timeout(&self, id: SessionId) {
        let Some(slot) = self.inner.registry.get(id) else {
            log::debug!("total timer of missing session {id} ignored");
            return;
        };
        let mut session = slot.state.lock().await;
        if !session.active {
            return;
        }
        log::info!("session {id} reached its time limit");
        self.end_quiz(&mut session).await;
    }

    /// Runs once the join phase is over. A failure leaves nothing registered.
    async fn start_questions(&self, session: &mut QuizSession) -> Result<()> {
        let result = self.try_start_questions(session).await;
        if let Err(err) = &result {
            log::error!("session {} aborted before its first question: {err}", session.id);
            session.finish();
            self.inner.timers.cancel_all(session.id);
            self.clear_buttons(session).await;
            self.inner.registry.remove(session.id);
        }
        result
    }

    async fn try_start_questions(&self, session: &mut QuizSession) -> Result<()> {
        if let Some(message) = session.join_message.take() {
            if let Err(err) = self.inner.chat.clear_components(message.channel, message.id).await {
                log::debug!("could not close join prompt of session {}: {err}", session.id);
            }
        }

        if !session.participants.is_empty() {
            session.questions = self.inner.repo.list_questions(session.quiz.id).await?;
            for hint in self.inner.repo.list_hints(session.quiz.id).await? {
                session.hints.entry(hint.question_id).or_default().push(hint);
            }
        }

        if session.participants.is_empty() || session.questions.is_empty() {
            self.cancel(session).await;
            return Ok(());
        }

        if let Some(limit) = session.quiz.time_limit {
            let id = session.id;
            self.inner.timers.schedule_total(id, Duration::from_secs(limit.into()), self.total_timer(id));
        }

        log::info!("session {} begins with {} participants", session.id, session.participants.len());
        self.display_question(session).await
    }

    /// Dead end for a quiz that never ran. Nothing is recorded.
    async fn cancel(&self, session: &mut QuizSession) {
        session.finish();
        self.inner.timers.cancel_all(session.id);
        self.inner.registry.remove(session.id);
        if let Err(err) = self.inner.chat.send(self.target(session), render::cancelled(session)).await {
            log::error!("could not announce cancellation of session {}: {err}", session.id);
        }
        log::info!("session {} cancelled", session.id);
    }

    async fn load_image(&self, question: &db::Question) -> Option<Attachment> {
        let (filename, _) = render::image_caption(question)?;
        let path = self.inner.settings.image_dir.join(question.image.as_deref()?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(Attachment { filename, bytes }),
            Err(err) => {
                log::warn!("image {} is unavailable: {err}", path.display());
                None
            }
        }
    }

    async fn display_question(&self, session: &mut QuizSession) -> Result<()> {
        let index = session.current;
        let question = session.current_question().cloned().ok_or(Error::StaleQuestion)?;
        let limit = session.time_limit(&question, &self.inner.settings);

        let attachment = if session.private { None } else { self.load_image(&question).await };
        let hints = session.hints.get(&question.id).map(Vec::as_slice).unwrap_or_default();
        let attached = attachment.as_ref().map(|file| file.filename.as_str());
        let mut message = render::question(session, &question, hints, limit, attached);
        message.attachment = attachment;

        let sent = self.inner.chat.send(self.target(session), message).await?;
        session.open_question((!session.private).then_some(sent), sent.timestamp);

        let id = session.id;
        let limit = Duration::from_secs(limit.into());
        self.inner.timers.schedule_question(id, index, limit, self.question_timer(id, index));
        if !session.private {
            chat::schedule_clear(Arc::clone(&self.inner.chat), sent, limit + self.inner.settings.question_grace);
        }
        Ok(())
    }

    /// Throttled refresh of the answer counter. Skipped refreshes are dropped.
    async fn refresh_progress(&self, session: &mut QuizSession) {
        let Some(message) = session.question_message else {
            return;
        };
        let now = tokio::time::Instant::now();
        if session.last_progress.is_some_and(|last| now.duration_since(last) < self.inner.settings.progress_interval) {
            return;
        }
        session.last_progress = Some(now);

        let Some(question) = session.current_question() else {
            return;
        };
        let edit = Edit { content: Some(render::progress(session, question)), ..Default::default() };
        if let Err(err) = self.inner.chat.edit(message.channel, message.id, edit).await {
            log::debug!("could not refresh answer counter of session {}: {err}", session.id);
        }
    }

    /// Announces the closed question and advances. Returns whether another question follows.
    async fn show_results(&self, session: &mut QuizSession) -> bool {
        if let Some(message) = session.question_message.take() {
            if let Err(err) = self.inner.chat.clear_components(message.channel, message.id).await {
                log::debug!("could not close question message of session {}: {err}", session.id);
            }
        }

        if let Some(question) = session.current_question() {
            let results = render::results(session, question);
            if let Err(err) = self.inner.chat.send(self.target(session), results).await {
                log::error!("could not post results of session {}: {err}", session.id);
            }
        }
        session.advance()
    }

    async fn clear_buttons(&self, session: &mut QuizSession) {
        if session.private {
            return;
        }
        for message in [session.join_message.take(), session.question_message.take()].into_iter().flatten() {
            if let Err(err) = self.inner.chat.clear_components(message.channel, message.id).await {
                log::debug!("could not clear buttons of session {}: {err}", session.id);
            }
        }
    }

    /// Posts the final standings and records the results. Only the first call has any effect.
    async fn end_quiz(&self, session: &mut QuizSession) {
        if !session.finish() {
            return;
        }
        let id = session.id;
        self.inner.timers.cancel_all(id);
        self.clear_buttons(session).await;

        let now = Utc::now();
        let elapsed = session.elapsed_seconds(now);
        if let Err(err) = self.inner.chat.send(self.target(session), render::standings(session, elapsed)).await {
            log::error!("could not post standings of session {id}: {err}");
        }

        if session.persist {
            self.record(session, now, elapsed).await;
        }
        self.inner.registry.remove(id);
        log::info!(
            "session {id} completed with {} participants ({} sessions still live)",
            session.participants.len(),
            self.inner.registry.len()
        );
    }

    async fn record(&self, session: &QuizSession, completed_at: DateTime<Utc>, elapsed: u32) {
        let total_time = i32::try_from(elapsed).unwrap_or(i32::MAX);
        for participant in session.participants.values() {
            let user = participant.user.into_nonzero();
            let username = match self.inner.chat.username(participant.user).await {
                Ok(Some(name)) => name,
                Ok(None) => participant.username.clone(),
                Err(err) => {
                    log::warn!("could not refresh name of user {user}: {err}");
                    participant.username.clone()
                }
            };
            if let Err(err) = self.inner.repo.upsert_user(&User { id: user, username }).await {
                log::error!("could not record user {user} of session {}: {err}", session.id);
                continue;
            }

            let answers: Vec<_> = participant
                .answers
                .iter()
                .filter_map(|(&index, answer)| {
                    let Some(question) = session.questions.get(index) else {
                        log::warn!("dropping answer of user {user} to unknown question {index} of session {}", session.id);
                        return None;
                    };
                    Some(NewQuestionAttempt {
                        question_id: question.id,
                        selected_answer: u32::try_from(answer.option).ok()?,
                        is_correct: answer.correct,
                        time_spent: i32::try_from(answer.time_spent).unwrap_or(i32::MAX),
                        points_earned: i32::try_from(answer.points).unwrap_or(i32::MAX),
                        answered_at: answer.answered_at,
                        answer_rank: i32::try_from(answer.rank).unwrap_or(i32::MAX),
                        was_fastest_correct: answer.fastest,
                    })
                })
                .collect();

            let attempt = NewQuizAttempt {
                user,
                quiz_id: session.quiz.id,
                total_score: participant.score.into(),
                total_time,
                started_at: session.started_at,
                completed_at,
                private: session.private,
            };
            match self.inner.repo.save_attempt(&attempt, &answers).await {
                Ok(attempt) => log::debug!("recorded attempt {attempt} of user {user}"),
                Err(err) => log::error!("could not record attempt of user {user} in session {}: {err}", session.id),
            }
        }

        if session.private {
            return;
        }
        for participant in session.participants.values() {
            let user = participant.user.into_nonzero();
            for period in Period::ALL {
                let result =
                    self.inner.leaderboard.update_score(user, period, participant.score.into(), total_time).await;
                if let Err(err) = result {
                    log::error!("could not update {period} leaderboard for user {user}: {err}");
                }
            }
        }
    }
}
