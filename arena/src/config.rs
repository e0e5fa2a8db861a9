//! Tournament configuration.

use serde::{Deserialize, Serialize};

use crate::error::{TournamentError, TournamentResult};
use crate::reporter::{ReportView, SortKey};
use crate::scoring::ScoringPolicy;

/// Default number of rounds played by every pairing.
pub const DEFAULT_ROUNDS_PER_PAIR: u32 = 50;

/// Default cap on concurrently running pairings.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// Knobs fixed for the lifetime of one tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    /// Rounds each pairing plays, self-pairs included.
    pub rounds_per_pair: u32,
    /// Maximum pairings running at once. `None` runs every pairing
    /// concurrently; `Some(1)` runs them one after another.
    pub max_in_flight: Option<usize>,
    pub scoring: ScoringPolicy,
    pub view: ReportView,
    pub sort: SortKey,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            rounds_per_pair: DEFAULT_ROUNDS_PER_PAIR,
            max_in_flight: Some(DEFAULT_MAX_IN_FLIGHT),
            scoring: ScoringPolicy::default(),
            view: ReportView::default(),
            sort: SortKey::default(),
        }
    }
}

impl TournamentConfig {
    pub fn validate(&self) -> TournamentResult<()> {
        if self.rounds_per_pair == 0 {
            return Err(TournamentError::InvalidConfig(
                "rounds_per_pair must be at least 1".into(),
            ));
        }
        if self.max_in_flight == Some(0) {
            return Err(TournamentError::InvalidConfig(
                "max_in_flight must be at least 1 (omit it for no limit)".into(),
            ));
        }
        Ok(())
    }

    /// Total rounds for `competitors` templates: `n*(n+1)/2 * rounds_per_pair`.
    pub fn total_rounds(&self, competitors: usize) -> u64 {
        crate::state::Pairing::count(competitors) as u64 * u64::from(self.rounds_per_pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TournamentConfig::default();
        assert_eq!(config.rounds_per_pair, 50);
        assert_eq!(config.max_in_flight, Some(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_values() {
        let zero_rounds = TournamentConfig {
            rounds_per_pair: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_rounds.validate(),
            Err(TournamentError::InvalidConfig(_))
        ));

        let zero_permits = TournamentConfig {
            max_in_flight: Some(0),
            ..Default::default()
        };
        assert!(zero_permits.validate().is_err());

        let unbounded = TournamentConfig {
            max_in_flight: None,
            ..Default::default()
        };
        assert!(unbounded.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: TournamentConfig =
            serde_json::from_str(r#"{"rounds_per_pair": 3, "scoring": "symmetric"}"#).unwrap();
        assert_eq!(config.rounds_per_pair, 3);
        assert_eq!(config.scoring, ScoringPolicy::Symmetric);
        assert_eq!(config.max_in_flight, Some(10));
        assert_eq!(config.view, ReportView::Pairings);
    }

    #[test]
    fn total_rounds_counts_self_pairs() {
        let config = TournamentConfig {
            rounds_per_pair: 2,
            ..Default::default()
        };
        // 11 models: 66 pairings.
        assert_eq!(config.total_rounds(11), 132);
        assert_eq!(config.total_rounds(1), 2);
    }
}
