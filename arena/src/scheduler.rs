//! Tournament Scheduler — JoinSet fan-out over pairings.
//!
//! ```text
//! Tournament::run()
//!   for each pairing (i ≤ j):
//!     JoinSet::spawn(play_pairing)           one task per pairing
//!       permit ← Semaphore(max_in_flight)     backpressure only
//!       for round in 0..rounds_per_pair:
//!         creator = first if round even else second
//!         outcome ← engine.run_round(..)
//!         state.commit_outcome(..)            single critical section
//!   join_next() until empty                   panics/errors logged, never fatal
//! ```
//!
//! Pairings are independent; none waits on another's progress. Cancellation
//! stops new rounds from starting and abandons rounds still talking to a
//! provider, but a commit is synchronous and always completes once begun.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::competitor::Competitor;
use crate::config::TournamentConfig;
use crate::engine::{MatchEngine, RoundContext};
use crate::error::{TournamentError, TournamentResult};
use crate::reporter::Reporter;
use crate::state::{Pairing, ScoreboardSnapshot, TournamentState};

/// A pairing task that ended with an error or a panic.
#[derive(Debug, Clone)]
pub struct PairingFailure {
    /// `None` only if the failed task could not be matched to a pairing.
    pub pairing: Option<Pairing>,
    pub error: String,
}

/// What `run` returns once every pairing task has finished.
#[derive(Debug, Clone)]
pub struct TournamentSummary {
    pub snapshot: ScoreboardSnapshot,
    pub failed_pairings: Vec<PairingFailure>,
    /// True if the run was cut short by the cancellation token.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl TournamentSummary {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed_pairings.is_empty() && self.snapshot.is_complete()
    }
}

struct Entry {
    pairing: Pairing,
    first: Competitor,
    second: Competitor,
}

/// A configured round-robin tournament, ready to run once.
pub struct Tournament {
    competitors: Vec<Competitor>,
    config: TournamentConfig,
    engine: Arc<MatchEngine>,
    state: Arc<TournamentState>,
    entries: Vec<Entry>,
    cancel: CancellationToken,
}

impl Tournament {
    /// Validate `config`, enumerate pairings and register each on a fresh scoreboard.
    ///
    /// Every pairing gets new instances of both templates, so the two sides
    /// of a self-pair are scored separately.
    pub fn new(
        competitors: Vec<Competitor>,
        config: TournamentConfig,
        engine: MatchEngine,
        reporter: Arc<dyn Reporter>,
    ) -> TournamentResult<Self> {
        config.validate()?;
        if engine.policy() != config.scoring {
            return Err(TournamentError::InvalidConfig(format!(
                "engine scores with the {} policy but the tournament is configured for {}",
                engine.policy(),
                config.scoring
            )));
        }
        if competitors.is_empty() {
            return Err(TournamentError::NoCompetitors);
        }

        let state = Arc::new(TournamentState::new(
            competitors.len(),
            config.rounds_per_pair,
            reporter,
        ));
        let mut entries = Vec::with_capacity(Pairing::count(competitors.len()));
        for pairing in Pairing::enumerate(competitors.len()) {
            let first = competitors[pairing.a()].new_instance();
            let second = competitors[pairing.b()].new_instance();
            state.register(pairing, first.clone(), second.clone())?;
            entries.push(Entry {
                pairing,
                first,
                second,
            });
        }

        Ok(Self {
            competitors,
            config,
            engine: Arc::new(engine),
            state,
            entries,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops the run when cancelled. Clone freely.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> Arc<TournamentState> {
        self.state.clone()
    }

    pub fn competitors(&self) -> &[Competitor] {
        &self.competitors
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    pub fn pairings(&self) -> Vec<Pairing> {
        self.entries.iter().map(|e| e.pairing).collect()
    }

    /// Play every pairing to completion (or cancellation) and summarise.
    pub async fn run(self) -> TournamentResult<TournamentSummary> {
        let start = Instant::now();
        let limiter = self.config.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        let rounds = self.config.rounds_per_pair;

        info!(
            competitors = self.competitors.len(),
            pairings = self.entries.len(),
            rounds_per_pair = rounds,
            total_rounds = self.config.total_rounds(self.competitors.len()),
            max_in_flight = ?self.config.max_in_flight,
            policy = %self.engine.policy(),
            "Starting tournament"
        );

        let mut join_set: JoinSet<(Pairing, TournamentResult<u32>)> = JoinSet::new();
        let mut task_pairings: HashMap<Id, Pairing> = HashMap::with_capacity(self.entries.len());
        for entry in self.entries {
            let engine = self.engine.clone();
            let state = self.state.clone();
            let limiter = limiter.clone();
            let cancel = self.cancel.clone();

            let pairing = entry.pairing;
            let handle = join_set.spawn(async move {
                let result =
                    play_pairing(&engine, &state, &entry, rounds, limiter, &cancel).await;
                (entry.pairing, result)
            });
            task_pairings.insert(handle.id(), pairing);
        }

        let mut failed_pairings = Vec::new();
        while let Some(res) = join_set.join_next_with_id().await {
            match res {
                Ok((_, (pairing, Ok(played)))) => {
                    debug!(%pairing, played, "Pairing finished");
                }
                Ok((_, (pairing, Err(e)))) => {
                    error!(%pairing, error = %e, "Pairing task failed");
                    failed_pairings.push(PairingFailure {
                        pairing: Some(pairing),
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    // Panic in a pairing task; the others carry on.
                    let pairing = task_pairings.get(&e.id()).copied();
                    match pairing {
                        Some(pairing) => error!(%pairing, error = %e, "Pairing task panicked"),
                        None => error!(error = %e, "Pairing task panicked"),
                    }
                    failed_pairings.push(PairingFailure {
                        pairing,
                        error: e.to_string(),
                    });
                }
            }
        }

        let snapshot = self.state.snapshot()?;
        let summary = TournamentSummary {
            cancelled: self.cancel.is_cancelled(),
            failed_pairings,
            elapsed: start.elapsed(),
            snapshot,
        };
        info!(
            rounds_completed = summary.snapshot.rounds_completed,
            rounds_total = summary.snapshot.rounds_total,
            failed_pairings = summary.failed_pairings.len(),
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Tournament finished"
        );
        Ok(summary)
    }
}

/// Play all rounds of one pairing. Returns the number of rounds committed.
async fn play_pairing(
    engine: &MatchEngine,
    state: &TournamentState,
    entry: &Entry,
    rounds: u32,
    limiter: Option<Arc<Semaphore>>,
    cancel: &CancellationToken,
) -> TournamentResult<u32> {
    let _permit = match limiter {
        Some(sem) => tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(0),
            permit = sem.acquire_owned() => Some(permit.map_err(|_| {
                TournamentError::InvalidConfig("concurrency limiter closed".into())
            })?),
        },
        None => None,
    };

    let mut played = 0;
    for round in 0..rounds {
        if cancel.is_cancelled() {
            break;
        }
        let (creator, opponent) = if round % 2 == 0 {
            (&entry.first, &entry.second)
        } else {
            (&entry.second, &entry.first)
        };
        let ctx = RoundContext {
            pairing: entry.pairing.key(),
            round,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(pairing = %entry.pairing, round, "Round abandoned on cancellation");
                break;
            }
            outcome = engine.run_round(ctx, creator, opponent) => outcome,
        };

        let completed = state.commit_outcome(entry.pairing, &outcome)?;
        played += 1;
        debug!(
            pairing = %entry.pairing,
            round,
            completed,
            "Round committed"
        );
    }
    Ok(played)
}
