//! Tournament State — the shared scoreboard.
//!
//! The scoreboard is the only mutable state shared between pairing tasks.
//! Every write goes through [`TournamentState::commit`], which applies the
//! score change and the round increment for one pairing under a single
//! lock, then hands a point-in-time snapshot to the reporter after the lock
//! is released. Readers therefore only ever see fully committed rounds.
//!
//! Pairings are stored once, keyed by `(a, b)` with `a <= b`, so the round
//! count for `(i, j)` and `(j, i)` is the same entry and cannot diverge.
//! Commits never suspend; the lock is a plain `std::sync::Mutex`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::competitor::Competitor;
use crate::engine::RoundOutcome;
use crate::error::{TournamentError, TournamentResult};
use crate::reporter::Reporter;

// ── Pairing ──────────────────────────────────────────────────────────

/// Unordered pair of competitor indices, stored as `a <= b`. `a == b` is a self-pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pairing {
    a: usize,
    b: usize,
}

impl Pairing {
    pub fn new(i: usize, j: usize) -> Self {
        Self {
            a: i.min(j),
            b: i.max(j),
        }
    }

    /// Every pairing among `n` competitors, self-pairs included: `n*(n+1)/2` of them.
    pub fn enumerate(n: usize) -> Vec<Self> {
        (0..n)
            .flat_map(|i| (i..n).map(move |j| Self { a: i, b: j }))
            .collect()
    }

    pub fn count(n: usize) -> usize {
        n * (n + 1) / 2
    }

    pub fn a(&self) -> usize {
        self.a
    }

    pub fn b(&self) -> usize {
        self.b
    }

    pub fn key(&self) -> (usize, usize) {
        (self.a, self.b)
    }

    pub fn is_self_pair(&self) -> bool {
        self.a == self.b
    }
}

impl std::fmt::Display for Pairing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.a, self.b)
    }
}

// ── Snapshot types ───────────────────────────────────────────────────

/// One pairing's entry. `first` is the instance of competitor `a`, `second` of `b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRow {
    pub pairing: Pairing,
    pub first: Competitor,
    pub second: Competitor,
    pub first_score: i64,
    pub second_score: i64,
    pub rounds: u32,
    /// Rounds counted without a score change (unparseable or provider failure).
    pub no_contest: u32,
}

/// Point-in-time copy of the whole scoreboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreboardSnapshot {
    /// Rows ordered by pairing key.
    pub rows: Vec<PairingRow>,
    /// Sum of per-pairing round counters.
    pub rounds_completed: u64,
    /// `pairings * rounds_per_pair`.
    pub rounds_total: u64,
    /// Number of commits applied so far.
    pub commits: u64,
}

impl ScoreboardSnapshot {
    /// Entry for `(i, j)` in either order.
    pub fn row(&self, i: usize, j: usize) -> Option<&PairingRow> {
        let key = Pairing::new(i, j);
        self.rows.iter().find(|r| r.pairing == key)
    }

    /// Rounds completed between `i` and `j`; symmetric by construction.
    pub fn rounds_between(&self, i: usize, j: usize) -> u32 {
        self.row(i, j).map(|r| r.rounds).unwrap_or(0)
    }

    pub fn is_complete(&self) -> bool {
        self.rounds_completed >= self.rounds_total
    }
}

// ── State ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Scoreboard {
    entries: BTreeMap<(usize, usize), PairingRow>,
    commits: u64,
}

impl Scoreboard {
    fn snapshot(&self, rounds_total: u64) -> ScoreboardSnapshot {
        let rows: Vec<PairingRow> = self.entries.values().cloned().collect();
        let rounds_completed = rows.iter().map(|r| u64::from(r.rounds)).sum();
        ScoreboardSnapshot {
            rows,
            rounds_completed,
            rounds_total,
            commits: self.commits,
        }
    }
}

/// Shared scoreboard plus the reporting hook.
pub struct TournamentState {
    board: Mutex<Scoreboard>,
    competitors: usize,
    rounds_per_pair: u32,
    reporter: Arc<dyn Reporter>,
}

impl TournamentState {
    pub fn new(competitors: usize, rounds_per_pair: u32, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            board: Mutex::new(Scoreboard::default()),
            competitors,
            rounds_per_pair,
            reporter,
        }
    }

    fn lock(&self) -> TournamentResult<MutexGuard<'_, Scoreboard>> {
        self.board.lock().map_err(|_| TournamentError::StatePoisoned)
    }

    fn check_range(&self, pairing: Pairing) -> TournamentResult<()> {
        if pairing.b >= self.competitors {
            return Err(TournamentError::InvalidPairing {
                a: pairing.a,
                b: pairing.b,
                competitors: self.competitors,
            });
        }
        Ok(())
    }

    pub fn rounds_per_pair(&self) -> u32 {
        self.rounds_per_pair
    }

    fn rounds_total(&self, registered: usize) -> u64 {
        registered as u64 * u64::from(self.rounds_per_pair)
    }

    /// Add an empty entry for `pairing` with the instances that will play it.
    pub fn register(
        &self,
        pairing: Pairing,
        first: Competitor,
        second: Competitor,
    ) -> TournamentResult<()> {
        self.check_range(pairing)?;
        let mut board = self.lock()?;
        board.entries.insert(
            pairing.key(),
            PairingRow {
                pairing,
                first,
                second,
                first_score: 0,
                second_score: 0,
                rounds: 0,
                no_contest: 0,
            },
        );
        Ok(())
    }

    /// Atomically add one round and the given deltas (in pairing order) to `pairing`.
    ///
    /// Returns the tournament-wide completed round count after this commit.
    pub fn commit(
        &self,
        pairing: Pairing,
        delta_first: i64,
        delta_second: i64,
    ) -> TournamentResult<u64> {
        self.apply(pairing, false, |_| (delta_first, delta_second))
    }

    /// Commit a match-engine outcome, orienting its deltas to the pairing's instances.
    pub fn commit_outcome(&self, pairing: Pairing, outcome: &RoundOutcome) -> TournamentResult<u64> {
        self.apply(pairing, outcome.kind.is_no_contest(), |row| {
            outcome.oriented(&row.first.unique_id)
        })
    }

    fn apply(
        &self,
        pairing: Pairing,
        no_contest: bool,
        deltas: impl FnOnce(&PairingRow) -> (i64, i64),
    ) -> TournamentResult<u64> {
        self.check_range(pairing)?;
        let snapshot = {
            let mut board = self.lock()?;
            let row = board
                .entries
                .get_mut(&pairing.key())
                .ok_or(TournamentError::UnknownPairing(pairing.a, pairing.b))?;
            let (delta_first, delta_second) = deltas(row);
            row.first_score += delta_first;
            row.second_score += delta_second;
            row.rounds += 1;
            if no_contest {
                row.no_contest += 1;
            }
            board.commits += 1;
            let registered = board.entries.len();
            board.snapshot(self.rounds_total(registered))
        };

        self.reporter.report(&snapshot);
        Ok(snapshot.rounds_completed)
    }

    /// Consistent copy of the scoreboard.
    pub fn snapshot(&self) -> TournamentResult<ScoreboardSnapshot> {
        let board = self.lock()?;
        Ok(board.snapshot(self.rounds_total(board.entries.len())))
    }

    /// Completed rounds summed over all pairings.
    pub fn rounds_completed(&self) -> TournamentResult<u64> {
        Ok(self.snapshot()?.rounds_completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RoundKind;
    use crate::fakes::RecordingReporter;
    use crate::reporter::NullReporter;
    use crate::scoring::ScoreDelta;

    fn state_with(n: usize, rounds: u32, reporter: Arc<dyn Reporter>) -> TournamentState {
        let state = TournamentState::new(n, rounds, reporter);
        let templates: Vec<Competitor> = (0..n)
            .map(|i| Competitor::new(format!("vendor/model-{i}")))
            .collect();
        for p in Pairing::enumerate(n) {
            state
                .register(p, templates[p.a()].new_instance(), templates[p.b()].new_instance())
                .unwrap();
        }
        state
    }

    #[test]
    fn enumerate_includes_self_pairs() {
        let pairs = Pairing::enumerate(3);
        assert_eq!(pairs.len(), Pairing::count(3));
        assert_eq!(pairs.len(), 6);
        assert!(pairs.contains(&Pairing::new(1, 1)));
        assert!(pairs.iter().all(|p| p.a() <= p.b()));
        assert_eq!(Pairing::new(2, 0), Pairing::new(0, 2));
        assert!(Pairing::enumerate(0).is_empty());
    }

    #[test]
    fn commit_updates_score_and_round_together() {
        let state = state_with(2, 5, Arc::new(NullReporter));
        let total = state.commit(Pairing::new(0, 1), 3, 0).unwrap();
        assert_eq!(total, 1);
        state.commit(Pairing::new(1, 0), -1, 3).unwrap();

        let snap = state.snapshot().unwrap();
        let row = snap.row(1, 0).unwrap();
        assert_eq!((row.first_score, row.second_score), (2, 3));
        assert_eq!(snap.rounds_between(0, 1), 2);
        assert_eq!(snap.rounds_between(1, 0), 2);
        assert_eq!(snap.rounds_total, 3 * 5);
        assert_eq!(snap.commits, 2);
    }

    #[test]
    fn self_pair_scores_like_any_other() {
        let state = state_with(2, 1, Arc::new(NullReporter));
        state.commit(Pairing::new(1, 1), 1, 2).unwrap();
        let snap = state.snapshot().unwrap();
        let row = snap.row(1, 1).unwrap();
        assert_eq!((row.first_score, row.second_score, row.rounds), (1, 2, 1));
        assert_ne!(row.first.unique_id, row.second.unique_id);
    }

    #[test]
    fn bad_pairings_are_rejected_without_side_effects() {
        let state = state_with(2, 1, Arc::new(NullReporter));
        assert!(matches!(
            state.commit(Pairing::new(0, 5), 1, 1),
            Err(TournamentError::InvalidPairing { competitors: 2, .. })
        ));

        let unregistered = TournamentState::new(2, 1, Arc::new(NullReporter));
        assert!(matches!(
            unregistered.commit(Pairing::new(0, 1), 1, 1),
            Err(TournamentError::UnknownPairing(0, 1))
        ));

        assert_eq!(state.snapshot().unwrap().commits, 0);
    }

    #[test]
    fn outcome_deltas_follow_creator_identity() {
        let state = state_with(2, 2, Arc::new(NullReporter));
        let row = state.snapshot().unwrap().row(0, 1).cloned().unwrap();

        // Second instance authored and stumped the first.
        let outcome = RoundOutcome {
            creator_id: row.second.unique_id.clone(),
            opponent_id: row.first.unique_id.clone(),
            kind: RoundKind::Decided {
                opponent: crate::oracle::Verdict::Fail,
            },
            delta: ScoreDelta::new(3, 0),
        };
        state.commit_outcome(Pairing::new(0, 1), &outcome).unwrap();

        let unparseable = RoundOutcome {
            creator_id: row.first.unique_id.clone(),
            opponent_id: row.second.unique_id.clone(),
            kind: RoundKind::Unparseable,
            delta: ScoreDelta::ZERO,
        };
        state.commit_outcome(Pairing::new(0, 1), &unparseable).unwrap();

        let snap = state.snapshot().unwrap();
        let row = snap.row(0, 1).unwrap();
        assert_eq!((row.first_score, row.second_score), (0, 3));
        assert_eq!((row.rounds, row.no_contest), (2, 1));
    }

    #[test]
    fn reporter_sees_every_commit() {
        let reporter = RecordingReporter::new();
        let state = state_with(2, 3, Arc::new(reporter.clone()));
        state.commit(Pairing::new(0, 0), 1, 0).unwrap();
        state.commit(Pairing::new(0, 1), 0, 1).unwrap();

        let snaps = reporter.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].rounds_completed, 1);
        assert_eq!(snaps[1].rounds_completed, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_to_one_pairing_lose_nothing() {
        const K: i64 = 500;
        let state = Arc::new(state_with(2, K as u32, Arc::new(NullReporter)));

        let mut handles = Vec::new();
        for k in 0..K {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                state.commit(Pairing::new(0, 1), k % 7 - 3, k % 5).unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let expected_first: i64 = (0..K).map(|k| k % 7 - 3).sum();
        let expected_second: i64 = (0..K).map(|k| k % 5).sum();
        let snap = state.snapshot().unwrap();
        let row = snap.row(0, 1).unwrap();
        assert_eq!(row.first_score, expected_first);
        assert_eq!(row.second_score, expected_second);
        assert_eq!(row.rounds as i64, K);
        assert_eq!(snap.commits as i64, K);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_pairings_aggregate_exactly() {
        const N: usize = 5;
        const M: i64 = 40;
        let reporter = RecordingReporter::new();
        let state = Arc::new(state_with(N, M as u32, Arc::new(reporter.clone())));

        let mut handles = Vec::new();
        for p in Pairing::enumerate(N) {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                for m in 0..M {
                    state.commit(p, m, 2 * m + p.a() as i64).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snap = state.snapshot().unwrap();
        let first: i64 = (0..M).sum();
        for row in &snap.rows {
            assert_eq!(row.rounds as i64, M);
            assert_eq!(row.first_score, first);
            assert_eq!(row.second_score, 2 * first + M * row.pairing.a() as i64);
        }
        assert_eq!(snap.rounds_completed, snap.commits);
        assert!(snap.is_complete());

        // Every snapshot handed to the reporter was internally consistent.
        let snaps = reporter.snapshots();
        assert_eq!(snaps.len() as u64, snap.commits);
        for s in snaps {
            let summed: u64 = s.rows.iter().map(|r| u64::from(r.rounds)).sum();
            assert_eq!(summed, s.rounds_completed);
            assert_eq!(s.rounds_completed, s.commits);
            for r in &s.rows {
                let n = r.rounds as i64;
                assert_eq!(r.first_score, n * (n - 1) / 2);
            }
        }
    }
}
