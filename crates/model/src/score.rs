use core::{
    fmt::{self, Display},
    num::NonZeroU64,
    str::FromStr,
};
use serde::{Deserialize, Serialize};

/// Leaderboard aggregation window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    Monthly,
    Yearly,
    Overall,
}

impl Period {
    /// Every period a finished public session is forwarded to.
    pub const ALL: [Self; 4] = [Self::Weekly, Self::Monthly, Self::Yearly, Self::Overall];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Overall => "overall",
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownPeriod;

impl FromStr for Period {
    type Err = UnknownPeriod;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "yearly" => Self::Yearly,
            "overall" => Self::Overall,
            _ => return Err(UnknownPeriod),
        })
    }
}

/// Identifies one running total. `week` is only set for [`Period::Weekly`] and `month` only for
/// [`Period::Monthly`]. The overall period is stored under year zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ScoreKey {
    pub user: NonZeroU64,
    pub period: Period,
    pub year: i32,
    pub week: Option<u32>,
    pub month: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Score {
    pub key: ScoreKey,
    pub total_score: i64,
    pub total_quizzes: i32,
    pub average_score: f64,
    /// Fastest completion time seen so far (in seconds).
    pub best_time: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::Period;

    #[test]
    fn period_names_round_trip() {
        for period in Period::ALL {
            assert_eq!(period.as_str().parse::<Period>(), Ok(period));
        }
        assert!("daily".parse::<Period>().is_err());
    }
}
