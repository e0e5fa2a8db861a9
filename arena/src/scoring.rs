//! Scoring policies.
//!
//! A tournament picks exactly one policy at construction and keeps it for
//! the whole run; the two are not compatible and are never mixed.
//!
//! | creator | opponent | asymmetric | symmetric |
//! |---------|----------|------------|-----------|
//! | pass    | fail     | (+3, 0)    | (+2, 0)   |
//! | pass    | pass     | (+1, +2)   | (+1, +1)  |
//! | fail    | pass     | (-1, +3)   | (0, +1)   |
//! | fail    | fail     | (0, 0)     | (0, 0)    |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::oracle::Verdict;

/// Score change for one round, in creator/opponent orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDelta {
    pub creator: i64,
    pub opponent: i64,
}

impl ScoreDelta {
    pub const ZERO: Self = Self {
        creator: 0,
        opponent: 0,
    };

    pub fn new(creator: i64, opponent: i64) -> Self {
        Self { creator, opponent }
    }
}

/// Which scoring table a tournament uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// Rewards stumping the opponent and penalises unsolvable challenges.
    #[default]
    Asymmetric,
    /// +1 per solve; the creator also earns +1 for each opponent failure on a
    /// challenge the creator itself solved.
    Symmetric,
}

impl ScoringPolicy {
    pub fn score(self, creator: Verdict, opponent: Verdict) -> ScoreDelta {
        use Verdict::{Fail, Pass};
        match self {
            Self::Asymmetric => match (creator, opponent) {
                (Pass, Fail) => ScoreDelta::new(3, 0),
                (Pass, Pass) => ScoreDelta::new(1, 2),
                (Fail, Pass) => ScoreDelta::new(-1, 3),
                (Fail, Fail) => ScoreDelta::ZERO,
            },
            Self::Symmetric => {
                let creator_points = match (creator, opponent) {
                    (Pass, Fail) => 2,
                    (Pass, Pass) => 1,
                    (Fail, _) => 0,
                };
                ScoreDelta::new(creator_points, i64::from(opponent.passed()))
            }
        }
    }
}

impl FromStr for ScoringPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asymmetric" | "reference" => Ok(Self::Asymmetric),
            "symmetric" | "additive" => Ok(Self::Symmetric),
            other => Err(format!(
                "unknown scoring policy `{other}` (expected `asymmetric` or `symmetric`)"
            )),
        }
    }
}

impl std::fmt::Display for ScoringPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asymmetric => write!(f, "asymmetric"),
            Self::Symmetric => write!(f, "symmetric"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Verdict::{Fail, Pass};

    #[test]
    fn asymmetric_table() {
        let p = ScoringPolicy::Asymmetric;
        assert_eq!(p.score(Pass, Fail), ScoreDelta::new(3, 0));
        assert_eq!(p.score(Pass, Pass), ScoreDelta::new(1, 2));
        assert_eq!(p.score(Fail, Pass), ScoreDelta::new(-1, 3));
        assert_eq!(p.score(Fail, Fail), ScoreDelta::new(0, 0));
    }

    #[test]
    fn symmetric_table() {
        let p = ScoringPolicy::Symmetric;
        assert_eq!(p.score(Pass, Fail), ScoreDelta::new(2, 0));
        assert_eq!(p.score(Pass, Pass), ScoreDelta::new(1, 1));
        assert_eq!(p.score(Fail, Pass), ScoreDelta::new(0, 1));
        assert_eq!(p.score(Fail, Fail), ScoreDelta::new(0, 0));
    }

    #[test]
    fn parse_policy_names() {
        assert_eq!("Asymmetric".parse::<ScoringPolicy>(), Ok(ScoringPolicy::Asymmetric));
        assert_eq!("additive".parse::<ScoringPolicy>(), Ok(ScoringPolicy::Symmetric));
        assert!("elo".parse::<ScoringPolicy>().is_err());
        assert_eq!(ScoringPolicy::default().to_string(), "asymmetric");
    }
}
