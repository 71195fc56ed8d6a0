use std::{path::PathBuf, time::Duration};

/// Tunables of the session engine. Constructed once at startup and shared by every session.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Time limit (in seconds) for questions that do not carry their own.
    pub question_timeout: u32,
    /// Join phase length (in seconds) when the command does not specify one.
    pub join_wait: u32,
    pub speed_bonus_multiplier: f64,
    /// Pause between a question's results and the next question.
    pub results_delay: Duration,
    /// Extra time after the join phase before the join buttons are forcibly removed.
    pub join_grace: Duration,
    /// Extra time after a question's limit before its buttons are forcibly removed.
    pub question_grace: Duration,
    /// Minimum spacing between two edits of the live "answered" counter.
    pub progress_interval: Duration,
    pub image_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            question_timeout: 30,
            join_wait: 30,
            speed_bonus_multiplier: 0.5,
            results_delay: Duration::from_secs(5),
            join_grace: Duration::from_secs(60),
            question_grace: Duration::from_secs(2),
            progress_interval: Duration::from_secs(1),
            image_dir: PathBuf::from("images"),
        }
    }
}
