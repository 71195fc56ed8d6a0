//! Historical rankings, built from finished quiz attempts and running per-period totals.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use core::{cmp::Ordering, num::NonZeroU64};
use db::{error::Result, Period, QuizAttempt, Repository, Score, ScoreKey};
use std::{collections::HashMap, sync::Arc};

/// One ranked row of a leaderboard.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    /// One-based position in the full ordering.
    pub rank: usize,
    pub user: NonZeroU64,
    pub username: Option<String>,
    pub total_score: i64,
    pub quizzes: u32,
    pub average_score: f64,
    /// Mean seconds per recorded answer. `None` when no answer was timed.
    pub average_time: Option<f64>,
    pub best_time: Option<i32>,
}

#[derive(Default)]
struct Tally {
    total_score: i64,
    quizzes: u32,
    answer_time: i64,
    answers: u32,
    best_time: Option<i32>,
}

fn compare(a: &Entry, b: &Entry) -> Ordering {
    b.total_score.cmp(&a.total_score).then_with(|| match (a.average_time, b.average_time) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Start (inclusive) and end (exclusive) of the period that contains `now`.
pub fn window(period: Period, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let today = now.date_naive();
    let bounds = match period {
        Period::Overall => return (None, None),
        Period::Weekly => {
            let monday = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
            Some(monday).zip(monday.checked_add_days(Days::new(7)))
        }
        Period::Monthly => {
            let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1);
            first.zip(first.and_then(|first| first.checked_add_months(Months::new(1))))
        }
        Period::Yearly => {
            let first = NaiveDate::from_ymd_opt(today.year(), 1, 1);
            first.zip(NaiveDate::from_ymd_opt(today.year() + 1, 1, 1))
        }
    };
    let Some((start, end)) = bounds else {
        return (None, None);
    };
    let midnight = |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|time| time.and_utc());
    (midnight(start), midnight(end))
}

/// Running-total key of `user` for the period that contains `now`.
pub fn score_key(user: NonZeroU64, period: Period, now: DateTime<Utc>) -> ScoreKey {
    match period {
        Period::Weekly => {
            let week = now.iso_week();
            ScoreKey { user, period, year: week.year(), week: Some(week.week()), month: None }
        }
        Period::Monthly => ScoreKey { user, period, year: now.year(), week: None, month: Some(now.month()) },
        Period::Yearly => ScoreKey { user, period, year: now.year(), week: None, month: None },
        Period::Overall => ScoreKey { user, period, year: 0, week: None, month: None },
    }
}

pub struct Leaderboard {
    repo: Arc<dyn Repository>,
}

impl Leaderboard {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Adds one finished quiz to the user's running total for the current period.
    pub async fn update_score(&self, user: NonZeroU64, period: Period, delta: i64, elapsed: i32) -> Result<Score> {
        self.update_score_at(user, period, delta, elapsed, Utc::now()).await
    }

    pub(crate) async fn update_score_at(
        &self,
        user: NonZeroU64,
        period: Period,
        delta: i64,
        elapsed: i32,
        now: DateTime<Utc>,
    ) -> Result<Score> {
        let key = score_key(user, period, now);
        let score = match self.repo.find_score(&key).await? {
            Some(mut score) => {
                score.total_score += delta;
                score.total_quizzes += 1;
                score.average_score = score.total_score as f64 / f64::from(score.total_quizzes);
                score.best_time = Some(score.best_time.map_or(elapsed, |best| best.min(elapsed)));
                score
            }
            None => Score { key, total_score: delta, total_quizzes: 1, average_score: delta as f64, best_time: Some(elapsed) },
        };
        self.repo.save_score(&score).await?;
        Ok(score)
    }

    /// The top `limit` users of the period. Ranks are computed over everyone before truncation.
    pub async fn leaderboard(&self, period: Period, limit: usize) -> Result<Vec<Entry>> {
        self.leaderboard_at(period, limit, Utc::now()).await
    }

    pub(crate) async fn leaderboard_at(&self, period: Period, limit: usize, now: DateTime<Utc>) -> Result<Vec<Entry>> {
        let (from, until) = window(period, now);
        let mut entries = self.ranked(from, until).await?;
        entries.truncate(limit);

        let ids: Vec<_> = entries.iter().map(|entry| entry.user).collect();
        let names: HashMap<_, _> =
            self.repo.find_users(&ids).await?.into_iter().map(|user| (user.id, user.username)).collect();
        for entry in &mut entries {
            entry.username = names.get(&entry.user).cloned();
        }
        Ok(entries)
    }

    /// All-time totals of one user with their global rank. `None` if the user never finished a quiz.
    pub async fn user_stats(&self, user: NonZeroU64) -> Result<Option<Entry>> {
        let entries = self.ranked(None, None).await?;
        let Some(mut entry) = entries.into_iter().find(|entry| entry.user == user) else {
            return Ok(None);
        };
        entry.username = self.repo.find_users(&[user]).await?.into_iter().next().map(|user| user.username);
        Ok(Some(entry))
    }

    async fn ranked(&self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Result<Vec<Entry>> {
        let attempts = self.repo.list_attempts(from, until).await?;
        let ids: Vec<_> = attempts.iter().map(|attempt| attempt.id).collect();
        let answers = self.repo.list_question_attempts(&ids).await?;

        let owners: HashMap<_, _> = attempts.iter().map(|attempt| (attempt.id, attempt.user)).collect();
        let mut tallies = HashMap::<NonZeroU64, Tally>::new();
        for QuizAttempt { user, total_score, total_time, .. } in &attempts {
            let tally = tallies.entry(*user).or_default();
            tally.total_score += total_score;
            tally.quizzes += 1;
            tally.best_time = Some(tally.best_time.map_or(*total_time, |best| best.min(*total_time)));
        }
        for answer in &answers {
            let Some(tally) = owners.get(&answer.quiz_attempt_id).and_then(|user| tallies.get_mut(user)) else {
                continue;
            };
            tally.answer_time += i64::from(answer.time_spent);
            tally.answers += 1;
        }

        let mut entries: Vec<_> = tallies
            .into_iter()
            .map(|(user, tally)| Entry {
                rank: 0,
                user,
                username: None,
                total_score: tally.total_score,
                quizzes: tally.quizzes,
                average_score: tally.total_score as f64 / f64::from(tally.quizzes.max(1)),
                average_time: (tally.answers > 0).then(|| tally.answer_time as f64 / f64::from(tally.answers)),
                best_time: tally.best_time,
            })
            .collect();

        // Users are unordered coming out of the map, so the id settles exact ties deterministically.
        entries.sort_by(|a, b| compare(a, b).then_with(|| a.user.cmp(&b.user)));
        for (position, entry) in entries.iter_mut().enumerate() {
            entry.rank = position + 1;
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::{score_key, window, Leaderboard};
    use crate::testing::MemoryRepo;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use core::num::NonZeroU64;
    use db::{NewQuestionAttempt, NewQuizAttempt, Period, Repository, User};
    use std::sync::Arc;

    fn uid(id: u64) -> NonZeroU64 {
        NonZeroU64::new(id).unwrap()
    }

    /// Wednesday, 2024-05-15 12:00 UTC.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    async fn finish(repo: &MemoryRepo, user: u64, score: i64, started_at: DateTime<Utc>, times: &[i32]) {
        let attempt = NewQuizAttempt {
            user: uid(user),
            quiz_id: 1,
            total_score: score,
            total_time: 60,
            started_at,
            completed_at: started_at + Duration::seconds(60),
            private: false,
        };
        let answers: Vec<_> = times
            .iter()
            .zip(1..)
            .map(|(&time_spent, question_id)| NewQuestionAttempt {
                question_id,
                selected_answer: 0,
                is_correct: true,
                time_spent,
                points_earned: 0,
                answered_at: started_at,
                answer_rank: 1,
                was_fastest_correct: false,
            })
            .collect();
        repo.save_attempt(&attempt, &answers).await.unwrap();
    }

    #[test]
    fn weekly_window_starts_on_monday() {
        let (from, until) = window(Period::Weekly, now());
        assert_eq!(from, Some(Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap()));
        assert_eq!(until, Some(Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap()));

        let (from, until) = window(Period::Monthly, Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap());
        assert_eq!(from, Some(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()));
        assert_eq!(until, Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(window(Period::Overall, now()), (None, None));
    }

    #[test]
    fn score_keys_follow_the_calendar() {
        let key = score_key(uid(1), Period::Weekly, now());
        assert_eq!((key.year, key.week, key.month), (2024, Some(20), None));
        let key = score_key(uid(1), Period::Monthly, now());
        assert_eq!((key.year, key.week, key.month), (2024, None, Some(5)));
        assert_eq!(score_key(uid(1), Period::Overall, now()).year, 0);
    }

    #[tokio::test]
    async fn running_totals_keep_the_best_time() {
        let repo = Arc::new(MemoryRepo::default());
        let board = Leaderboard::new(repo.clone());
        board.update_score_at(uid(1), Period::Weekly, 30, 90, now()).await.unwrap();
        board.update_score_at(uid(1), Period::Weekly, 10, 120, now()).await.unwrap();
        let score = board.update_score_at(uid(1), Period::Weekly, 20, 75, now()).await.unwrap();

        assert_eq!((score.total_score, score.total_quizzes, score.best_time), (60, 3, Some(75)));
        assert!((score.average_score - 20.0).abs() < f64::EPSILON);
        let stored = repo.find_score(&score_key(uid(1), Period::Weekly, now())).await.unwrap();
        assert_eq!(stored, Some(score));

        let next_week = board.update_score_at(uid(1), Period::Weekly, 5, 200, now() + Duration::days(7)).await.unwrap();
        assert_eq!((next_week.total_score, next_week.best_time), (5, Some(200)));
    }

    #[tokio::test]
    async fn ranks_are_assigned_before_truncation() {
        let repo = Arc::new(MemoryRepo::default());
        for user in 1..=12 {
            finish(&repo, user, 100 - user as i64, now() - Duration::hours(1), &[5]).await;
        }
        let board = Leaderboard::new(repo.clone());

        let first = board.leaderboard_at(Period::Weekly, 10, now()).await.unwrap();
        let ranks: Vec<_> = first.iter().map(|entry| entry.rank).collect();
        assert_eq!(ranks, (1..=10).collect::<Vec<_>>());

        let full = board.leaderboard_at(Period::Weekly, 25, now()).await.unwrap();
        assert_eq!(full.len(), 12);
        assert_eq!(full[10].rank, 11);
        assert_eq!(full[10].user, uid(11));
        assert_eq!(full[..10], first[..]);
    }

    #[tokio::test]
    async fn ties_prefer_faster_answers_and_timed_entries() {
        let repo = Arc::new(MemoryRepo::default());
        let started = now() - Duration::hours(2);
        finish(&repo, 1, 50, started, &[]).await;
        finish(&repo, 2, 50, started, &[9, 11]).await;
        finish(&repo, 3, 50, started, &[4]).await;
        finish(&repo, 4, 80, started, &[20]).await;
        // Last week's attempt is outside the weekly window.
        finish(&repo, 5, 500, now() - Duration::days(8), &[1]).await;
        repo.upsert_user(&User { id: uid(3), username: String::from("speedy") }).await.unwrap();

        let board = Leaderboard::new(repo.clone());
        let entries = board.leaderboard_at(Period::Weekly, 10, now()).await.unwrap();
        let order: Vec<_> = entries.iter().map(|entry| entry.user.get()).collect();
        assert_eq!(order, [4, 3, 2, 1]);
        assert_eq!(entries[1].username.as_deref(), Some("speedy"));
        assert_eq!(entries[2].average_time, Some(10.0));
        assert_eq!(entries[3].average_time, None);

        let overall = board.leaderboard_at(Period::Overall, 10, now()).await.unwrap();
        assert_eq!(overall[0].user, uid(5));
    }

    #[tokio::test]
    async fn private_attempts_are_not_ranked() {
        let repo = Arc::new(MemoryRepo::default());
        let started = now() - Duration::hours(1);
        finish(&repo, 1, 30, started, &[2]).await;
        let attempt = NewQuizAttempt {
            user: uid(2),
            quiz_id: 1,
            total_score: 90,
            total_time: 20,
            started_at: started,
            completed_at: started + Duration::seconds(20),
            private: true,
        };
        repo.save_attempt(&attempt, &[]).await.unwrap();

        let board = Leaderboard::new(repo.clone());
        let entries = board.leaderboard_at(Period::Weekly, 10, now()).await.unwrap();
        let users: Vec<_> = entries.iter().map(|entry| entry.user).collect();
        assert_eq!(users, [uid(1)]);
        assert!(board.user_stats(uid(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_stats_sum_every_attempt() {
        let repo = Arc::new(MemoryRepo::default());
        finish(&repo, 1, 40, now() - Duration::days(400), &[3]).await;
        finish(&repo, 1, 25, now() - Duration::hours(1), &[6]).await;
        finish(&repo, 2, 90, now() - Duration::hours(1), &[2]).await;

        let board = Leaderboard::new(repo.clone());
        let stats = board.user_stats(uid(1)).await.unwrap().unwrap();
        assert_eq!((stats.total_score, stats.quizzes, stats.rank), (65, 2, 2));
        assert_eq!(stats.average_time, Some(4.5));
        assert!(board.user_stats(uid(3)).await.unwrap().is_none());
    }
}
