//! Arena: a concurrent round-robin tournament between language models.
//!
//! Every competitor meets every other competitor, and itself, for a fixed
//! number of rounds. In each round one side writes a Python coding challenge
//! as a block of `assert` predicates against a function `X`, split into
//! visible and hidden tests. Both sides then implement `X` from the visible
//! tests alone, and a verifier checks each implementation against the full
//! set. A scoring policy turns the two verdicts into points.
//!
//! # Components
//!
//! - [`scheduler::Tournament`]: one task per pairing, bounded by a semaphore
//! - [`engine::MatchEngine`]: one round, with provider and verifier injected
//! - [`state::TournamentState`]: the scoreboard, updated under one lock per commit
//! - [`provider::ProviderRegistry`]: prefix-routed model access with rate limits
//! - [`oracle::Verifier`]: executes candidates against challenges
//! - [`reporter::Reporter`]: renders progress after every commit
//! - [`audit::AuditLog`]: optional JSONL record of every request and round
//!
//! The crate performs no I/O of its own beyond the audit log. HTTP providers
//! and the Python sandbox live in the `modelclash` binary crate, and
//! [`fakes`] provides deterministic stand-ins for tests and dry runs.

pub mod audit;
pub mod challenge;
pub mod competitor;
pub mod config;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod oracle;
pub mod prompts;
pub mod provider;
pub mod reporter;
pub mod scheduler;
pub mod scoring;
pub mod state;

pub use audit::{AuditEvent, AuditLog, RequestPurpose};
pub use challenge::{parse_attempt, parse_challenge, Candidate, Challenge};
pub use competitor::Competitor;
pub use config::TournamentConfig;
pub use engine::{MatchEngine, RoundContext, RoundKind, RoundOutcome};
pub use error::{ProviderError, TournamentError, TournamentResult};
pub use oracle::{Verdict, Verifier};
pub use provider::{Provider, ProviderHealth, ProviderRegistry, RateLimiter};
pub use reporter::{NullReporter, ReportView, Reporter, SortKey, TableReporter};
pub use scheduler::{PairingFailure, Tournament, TournamentSummary};
pub use scoring::{ScoreDelta, ScoringPolicy};
pub use state::{Pairing, PairingRow, ScoreboardSnapshot, TournamentState};
