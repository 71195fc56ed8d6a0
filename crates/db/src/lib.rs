#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;

use alloc::{boxed::Box, format, string::String, vec::Vec};
use async_trait::async_trait;
use core::num::NonZeroU64;
use model::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_postgres::Row;

pub use model::{
    Corpus, CorpusEntry, Hint, NewHint, NewQuestion, NewQuestionAttempt, NewQuiz, NewQuizAttempt, Period, Question,
    QuestionAttempt, Quiz, QuizAttempt, QuizFilter, Score, ScoreKey, User,
};
pub use tokio_postgres::{tls::NoTls, Client, Config};

/// Storage operations consumed by the bot. Implementations decode rows into the explicit record
/// types of the `model` crate so that nothing downstream deals with raw rows.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_quiz(&self, id: i64) -> error::Result<Option<Quiz>>;
    async fn find_quiz_by_title(&self, title: &str) -> error::Result<Option<Quiz>>;
    async fn list_quizzes(&self, filter: QuizFilter) -> error::Result<Vec<Quiz>>;
    /// Atomically creates a quiz along with its ordered questions and their hints.
    async fn create_quiz(&self, quiz: &NewQuiz, questions: &[NewQuestion]) -> error::Result<Quiz>;
    /// Atomically deletes a quiz and everything that references it.
    async fn delete_quiz(&self, id: i64) -> error::Result<()>;

    /// Questions of a quiz in display order.
    async fn list_questions(&self, quiz: i64) -> error::Result<Vec<Question>>;
    async fn list_hints(&self, quiz: i64) -> error::Result<Vec<Hint>>;

    async fn upsert_user(&self, user: &User) -> error::Result<()>;
    async fn find_users(&self, ids: &[NonZeroU64]) -> error::Result<Vec<User>>;

    /// Atomically persists one quiz attempt together with its question attempts.
    async fn save_attempt(&self, attempt: &NewQuizAttempt, answers: &[NewQuestionAttempt]) -> error::Result<i64>;
    /// Finished public attempts that started within `[from, until)`. Open bounds are unbounded.
    async fn list_attempts(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> error::Result<Vec<QuizAttempt>>;
    async fn list_question_attempts(&self, attempts: &[i64]) -> error::Result<Vec<QuestionAttempt>>;

    async fn find_score(&self, key: &ScoreKey) -> error::Result<Option<Score>>;
    /// Inserts or replaces the running total identified by `score.key`.
    async fn save_score(&self, score: &Score) -> error::Result<()>;

    async fn find_corpus_by_title(&self, title: &str) -> error::Result<Option<Corpus>>;
    async fn list_corpus_entries(&self, corpus: i64) -> error::Result<Vec<CorpusEntry>>;
}

/// PostgreSQL-backed [`Repository`]. Plain queries share the connection; transactions take it
/// exclusively.
pub struct Database(RwLock<Client>);

impl From<Client> for Database {
    fn from(client: Client) -> Self {
        Self(RwLock::new(client))
    }
}

fn user_to_sql(user: NonZeroU64) -> i64 {
    user.get() as i64
}

fn user_from_sql(raw: i64) -> error::Result<NonZeroU64> {
    NonZeroU64::new(raw as u64).ok_or(error::Error::Schema("user_id"))
}

fn unsigned(raw: i32, column: &'static str) -> error::Result<u32> {
    u32::try_from(raw).map_err(|_| error::Error::Schema(column))
}

fn signed(value: u32) -> error::Result<i32> {
    i32::try_from(value).map_err(|_| error::Error::BadInput)
}

fn deserialize_quiz_from_row(row: &Row) -> error::Result<Quiz> {
    let time_limit: Option<i32> = row.try_get("time_limit")?;
    let owner: Option<i64> = row.try_get("owner_id")?;
    Ok(Quiz {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
        private: row.try_get("private")?,
        time_limit: time_limit.map(|limit| unsigned(limit, "time_limit")).transpose()?,
        owner: owner.map(user_from_sql).transpose()?,
    })
}

fn deserialize_question_from_row(row: &Row) -> error::Result<Question> {
    let options: String = row.try_get("options")?;
    let options: Vec<String> = serde_json::from_str(&options).map_err(|_| error::Error::Schema("options"))?;
    let answer: i16 = row.try_get("correct_answer_index")?;
    let answer = usize::try_from(answer).map_err(|_| error::Error::Schema("correct_answer_index"))?;
    if answer >= options.len() {
        return Err(error::Error::Schema("correct_answer_index"));
    }

    let time_limit: Option<i32> = row.try_get("time_limit")?;
    Ok(Question {
        id: row.try_get("id")?,
        quiz_id: row.try_get("quiz_id")?,
        position: unsigned(row.try_get("position")?, "position")?,
        text: row.try_get("question_text")?,
        options,
        answer,
        points: unsigned(row.try_get("points")?, "points")?,
        time_limit: time_limit.map(|limit| unsigned(limit, "time_limit")).transpose()?,
        image: row.try_get("image_ref")?,
        image_alt: row.try_get("image_alt")?,
    })
}

fn deserialize_attempt_from_row(row: &Row) -> error::Result<QuizAttempt> {
    Ok(QuizAttempt {
        id: row.try_get("id")?,
        user: user_from_sql(row.try_get("user_id")?)?,
        quiz_id: row.try_get("quiz_id")?,
        total_score: row.try_get("total_score")?,
        total_time: row.try_get("total_time")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        private: row.try_get("private")?,
    })
}

fn deserialize_question_attempt_from_row(row: &Row) -> error::Result<QuestionAttempt> {
    Ok(QuestionAttempt {
        quiz_attempt_id: row.try_get("quiz_attempt_id")?,
        question_id: row.try_get("question_id")?,
        selected_answer: unsigned(row.try_get("selected_answer")?, "selected_answer")?,
        is_correct: row.try_get("is_correct")?,
        time_spent: row.try_get("time_spent")?,
        points_earned: row.try_get("points_earned")?,
        answered_at: row.try_get("answered_at")?,
        answer_rank: row.try_get("answer_rank")?,
        was_fastest_correct: row.try_get("was_fastest_correct")?,
    })
}

fn deserialize_score_from_row(row: &Row) -> error::Result<Score> {
    let period: String = row.try_get("period")?;
    let week: Option<i32> = row.try_get("week")?;
    let month: Option<i32> = row.try_get("month")?;
    Ok(Score {
        key: ScoreKey {
            user: user_from_sql(row.try_get("user_id")?)?,
            period: period.parse().map_err(|_| error::Error::Schema("period"))?,
            year: row.try_get("year")?,
            week: week.map(|week| unsigned(week, "week")).transpose()?,
            month: month.map(|month| unsigned(month, "month")).transpose()?,
        },
        total_score: row.try_get("total_score")?,
        total_quizzes: row.try_get("total_quizzes")?,
        average_score: row.try_get("average_score")?,
        best_time: row.try_get("best_time")?,
    })
}

fn deserialize_corpus_entry_from_row(row: &Row) -> error::Result<CorpusEntry> {
    Ok(CorpusEntry {
        corpus_id: row.try_get("corpus_id")?,
        tags: row.try_get("tags")?,
        question_variants: row.try_get("question_variants")?,
        answer_variants: row.try_get("answer_variants")?,
        hint_titles: row.try_get("hint_titles")?,
        hint_variants: row.try_get("hint_variants")?,
    })
}

const QUIZ_COLUMNS: &str = "id, title, description, is_active, private, time_limit, owner_id";

#[async_trait]
impl Repository for Database {
    async fn find_quiz(&self, id: i64) -> error::Result<Option<Quiz>> {
        let client = self.0.read().await;
        let sql = format!("SELECT {QUIZ_COLUMNS} FROM quiz WHERE id = $1");
        client.query_opt(sql.as_str(), &[&id]).await?.as_ref().map(deserialize_quiz_from_row).transpose()
    }

    async fn find_quiz_by_title(&self, title: &str) -> error::Result<Option<Quiz>> {
        let client = self.0.read().await;
        let sql = format!("SELECT {QUIZ_COLUMNS} FROM quiz WHERE title = $1");
        client.query_opt(sql.as_str(), &[&title]).await?.as_ref().map(deserialize_quiz_from_row).transpose()
    }

    async fn list_quizzes(&self, filter: QuizFilter) -> error::Result<Vec<Quiz>> {
        use futures_util::TryStreamExt;
        let owner = filter.owner.map(user_to_sql);
        let offset = i64::from(filter.offset);
        let limit = i64::from(filter.limit);
        let sql = format!(
            "SELECT {QUIZ_COLUMNS} FROM quiz \
             WHERE ($1::BIGINT IS NULL OR owner_id = $1) AND (NOT $2 OR is_active) \
             ORDER BY id OFFSET $3 LIMIT $4"
        );
        let client = self.0.read().await;
        let params: [&(dyn tokio_postgres::types::ToSql + Sync); 4] = [&owner, &filter.active_only, &offset, &limit];
        let rows: Vec<Row> = client.query_raw(sql.as_str(), params).await?.try_collect().await?;
        rows.iter().map(deserialize_quiz_from_row).collect()
    }

    async fn create_quiz(&self, quiz: &NewQuiz, questions: &[NewQuestion]) -> error::Result<Quiz> {
        let mut client = self.0.write().await;
        let tx = client.transaction().await?;

        let time_limit = quiz.time_limit.map(signed).transpose()?;
        let owner = quiz.owner.map(user_to_sql);
        let sql = format!(
            "INSERT INTO quiz (title, description, private, time_limit, owner_id) VALUES ($1, $2, $3, $4, $5) \
             RETURNING {QUIZ_COLUMNS}"
        );
        let row = tx.query_one(sql.as_str(), &[&quiz.title, &quiz.description, &quiz.private, &time_limit, &owner]).await?;
        let created = deserialize_quiz_from_row(&row)?;

        for (position, question) in questions.iter().enumerate() {
            if question.answer >= question.options.len() {
                return Err(error::Error::BadInput);
            }
            let position = i32::try_from(position).map_err(|_| error::Error::BadInput)?;
            let options = serde_json::to_string(&question.options).map_err(|_| error::Error::BadInput)?;
            let answer = i16::try_from(question.answer).map_err(|_| error::Error::BadInput)?;
            let points = signed(question.points)?;
            let time_limit = question.time_limit.map(signed).transpose()?;
            let row = tx
                .query_one(
                    "INSERT INTO question \
                     (quiz_id, position, question_text, options, correct_answer_index, points, time_limit, image_ref, image_alt) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
                    &[
                        &created.id,
                        &position,
                        &question.text,
                        &options,
                        &answer,
                        &points,
                        &time_limit,
                        &question.image,
                        &question.image_alt,
                    ],
                )
                .await?;
            let qid: i64 = row.try_get("id")?;
            for hint in &question.hints {
                tx.execute(
                    "INSERT INTO hint (question_id, title, text) VALUES ($1, $2, $3)",
                    &[&qid, &hint.title, &hint.text],
                )
                .await?;
            }
        }

        tx.commit().await?;
        log::debug!("created quiz {} with {} questions", created.id, questions.len());
        Ok(created)
    }

    async fn delete_quiz(&self, id: i64) -> error::Result<()> {
        let mut client = self.0.write().await;
        let tx = client.transaction().await?;
        tx.execute(
            "DELETE FROM question_attempt WHERE quiz_attempt_id IN (SELECT id FROM quiz_attempt WHERE quiz_id = $1)",
            &[&id],
        )
        .await?;
        tx.execute("DELETE FROM quiz_attempt WHERE quiz_id = $1", &[&id]).await?;
        tx.execute("DELETE FROM hint WHERE question_id IN (SELECT id FROM question WHERE quiz_id = $1)", &[&id])
            .await?;
        tx.execute("DELETE FROM question WHERE quiz_id = $1", &[&id]).await?;
        if tx.execute("DELETE FROM quiz WHERE id = $1", &[&id]).await? == 0 {
            return Err(error::Error::NotFound);
        }
        tx.commit().await?;
        log::debug!("deleted quiz {id}");
        Ok(())
    }

    async fn list_questions(&self, quiz: i64) -> error::Result<Vec<Question>> {
        let client = self.0.read().await;
        let rows = client
            .query(
                "SELECT id, quiz_id, position, question_text, options, correct_answer_index, points, time_limit, \
                 image_ref, image_alt FROM question WHERE quiz_id = $1 ORDER BY position",
                &[&quiz],
            )
            .await?;
        rows.iter().map(deserialize_question_from_row).collect()
    }

    async fn list_hints(&self, quiz: i64) -> error::Result<Vec<Hint>> {
        let client = self.0.read().await;
        let rows = client
            .query(
                "SELECT hint.id, hint.question_id, hint.title, hint.text FROM hint \
                 JOIN question ON question.id = hint.question_id \
                 WHERE question.quiz_id = $1 ORDER BY hint.id",
                &[&quiz],
            )
            .await?;
        rows.iter()
            .map(|row| -> error::Result<Hint> {
                Ok(Hint {
                    id: row.try_get("id")?,
                    question_id: row.try_get("question_id")?,
                    title: row.try_get("title")?,
                    text: row.try_get("text")?,
                })
            })
            .collect()
    }

    async fn upsert_user(&self, user: &User) -> error::Result<()> {
        let client = self.0.read().await;
        client
            .execute(
                "INSERT INTO \"user\" (id, username) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET username = EXCLUDED.username",
                &[&user_to_sql(user.id), &user.username],
            )
            .await?;
        Ok(())
    }

    async fn find_users(&self, ids: &[NonZeroU64]) -> error::Result<Vec<User>> {
        let ids: Vec<_> = ids.iter().copied().map(user_to_sql).collect();
        let client = self.0.read().await;
        let rows = client.query("SELECT id, username FROM \"user\" WHERE id = ANY($1)", &[&ids]).await?;
        rows.iter()
            .map(|row| -> error::Result<User> {
                Ok(User { id: user_from_sql(row.try_get("id")?)?, username: row.try_get("username")? })
            })
            .collect()
    }

    async fn save_attempt(&self, attempt: &NewQuizAttempt, answers: &[NewQuestionAttempt]) -> error::Result<i64> {
        let mut client = self.0.write().await;
        let tx = client.transaction().await?;
        let row = tx
            .query_one(
                "INSERT INTO quiz_attempt (user_id, quiz_id, total_score, total_time, started_at, completed_at, \
                 private) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                &[
                    &user_to_sql(attempt.user),
                    &attempt.quiz_id,
                    &attempt.total_score,
                    &attempt.total_time,
                    &attempt.started_at,
                    &attempt.completed_at,
                    &attempt.private,
                ],
            )
            .await?;
        let id: i64 = row.try_get("id")?;

        let insert = tx
            .prepare(
                "INSERT INTO question_attempt (quiz_attempt_id, question_id, selected_answer, is_correct, time_spent, \
                 points_earned, answered_at, answer_rank, was_fastest_correct) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .await?;
        for answer in answers {
            let selected = signed(answer.selected_answer)?;
            tx.execute(
                &insert,
                &[
                    &id,
                    &answer.question_id,
                    &selected,
                    &answer.is_correct,
                    &answer.time_spent,
                    &answer.points_earned,
                    &answer.answered_at,
                    &answer.answer_rank,
                    &answer.was_fastest_correct,
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn list_attempts(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> error::Result<Vec<QuizAttempt>> {
        let client = self.0.read().await;
        let rows = client
            .query(
                "SELECT id, user_id, quiz_id, total_score, total_time, started_at, completed_at, private \
                 FROM quiz_attempt WHERE completed_at IS NOT NULL AND NOT private \
                 AND ($1::TIMESTAMPTZ IS NULL OR started_at >= $1) \
                 AND ($2::TIMESTAMPTZ IS NULL OR started_at < $2)",
                &[&from, &until],
            )
            .await?;
        rows.iter().map(deserialize_attempt_from_row).collect()
    }

    async fn list_question_attempts(&self, attempts: &[i64]) -> error::Result<Vec<QuestionAttempt>> {
        let client = self.0.read().await;
        let rows = client
            .query(
                "SELECT quiz_attempt_id, question_id, selected_answer, is_correct, time_spent, points_earned, \
                 answered_at, answer_rank, was_fastest_correct FROM question_attempt WHERE quiz_attempt_id = ANY($1)",
                &[&attempts],
            )
            .await?;
        rows.iter().map(deserialize_question_attempt_from_row).collect()
    }

    async fn find_score(&self, key: &ScoreKey) -> error::Result<Option<Score>> {
        let week = key.week.map(signed).transpose()?;
        let month = key.month.map(signed).transpose()?;
        let client = self.0.read().await;
        client
            .query_opt(
                "SELECT user_id, period, year, week, month, total_score, total_quizzes, average_score, best_time \
                 FROM score WHERE user_id = $1 AND period = $2 AND year = $3 \
                 AND week IS NOT DISTINCT FROM $4 AND month IS NOT DISTINCT FROM $5",
                &[&user_to_sql(key.user), &key.period.as_str(), &key.year, &week, &month],
            )
            .await?
            .as_ref()
            .map(deserialize_score_from_row)
            .transpose()
    }

    async fn save_score(&self, score: &Score) -> error::Result<()> {
        let key = &score.key;
        let week = key.week.map(signed).transpose()?;
        let month = key.month.map(signed).transpose()?;
        let user = user_to_sql(key.user);
        let period = key.period.as_str();

        let mut client = self.0.write().await;
        let tx = client.transaction().await?;
        let updated = tx
            .execute(
                "UPDATE score SET total_score = $6, total_quizzes = $7, average_score = $8, best_time = $9 \
                 WHERE user_id = $1 AND period = $2 AND year = $3 \
                 AND week IS NOT DISTINCT FROM $4 AND month IS NOT DISTINCT FROM $5",
                &[
                    &user,
                    &period,
                    &key.year,
                    &week,
                    &month,
                    &score.total_score,
                    &score.total_quizzes,
                    &score.average_score,
                    &score.best_time,
                ],
            )
            .await?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO score (user_id, period, year, week, month, total_score, total_quizzes, average_score, best_time) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &user,
                    &period,
                    &key.year,
                    &week,
                    &month,
                    &score.total_score,
                    &score.total_quizzes,
                    &score.average_score,
                    &score.best_time,
                ],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_corpus_by_title(&self, title: &str) -> error::Result<Option<Corpus>> {
        let client = self.0.read().await;
        let row = client.query_opt("SELECT id, title FROM corpus WHERE title = $1", &[&title]).await?;
        row.map(|row| -> error::Result<Corpus> { Ok(Corpus { id: row.try_get("id")?, title: row.try_get("title")? }) })
            .transpose()
    }

    async fn list_corpus_entries(&self, corpus: i64) -> error::Result<Vec<CorpusEntry>> {
        let client = self.0.read().await;
        let rows = client
            .query(
                "SELECT corpus_id, tags, question_variants, answer_variants, hint_titles, hint_variants \
                 FROM corpus_entry WHERE corpus_id = $1",
                &[&corpus],
            )
            .await?;
        rows.iter().map(deserialize_corpus_entry_from_row).collect()
    }
}
