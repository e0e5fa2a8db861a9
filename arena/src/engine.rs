//! Match Engine — one round between a creator and an opponent.
//!
//! ```text
//! request_challenge(creator) ──parse──┬─ empty ─────────────────→ Unparseable (0, 0)
//!                                     └─ valid
//!   request_attempt(creator)  ┐ concurrently
//!   request_attempt(opponent) ┘   ├─ any provider error ────────→ ProviderFailed (0, 0)
//!   verify(creator), verify(opponent)
//!   policy.score(creator, opponent) → Decided | CreatorFailedOwnChallenge
//! ```
//!
//! Every expected failure becomes data in the returned [`RoundOutcome`];
//! `run_round` itself cannot fail. There is no retry at this layer.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditLog, RequestPurpose};
use crate::challenge::{parse_attempt, parse_challenge, Candidate, Challenge};
use crate::competitor::Competitor;
use crate::error::ProviderError;
use crate::oracle::{Verdict, Verifier};
use crate::prompts::{challenge_prompt, implementation_prompt};
use crate::provider::ProviderRegistry;
use crate::scoring::{ScoreDelta, ScoringPolicy};

/// How a round ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundKind {
    /// The creator solved its own challenge; scored by the policy.
    Decided { opponent: Verdict },
    /// The creator failed its own challenge; scored by the policy.
    CreatorFailedOwnChallenge { opponent: Verdict },
    /// The challenge had no predicates. No score change.
    Unparseable,
    /// A collaborator call failed. No score change.
    ProviderFailed {
        stage: RequestPurpose,
        error: String,
    },
}

impl RoundKind {
    /// Round counted for progress but left scores untouched by construction.
    pub fn is_no_contest(&self) -> bool {
        matches!(self, Self::Unparseable | Self::ProviderFailed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Decided { .. } => "decided",
            Self::CreatorFailedOwnChallenge { .. } => "creator_failed_own_challenge",
            Self::Unparseable => "unparseable",
            Self::ProviderFailed { .. } => "provider_failed",
        }
    }
}

/// Result of one round, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub creator_id: String,
    pub opponent_id: String,
    pub kind: RoundKind,
    pub delta: ScoreDelta,
}

impl RoundOutcome {
    fn no_contest(creator: &Competitor, opponent: &Competitor, kind: RoundKind) -> Self {
        Self {
            creator_id: creator.unique_id.clone(),
            opponent_id: opponent.unique_id.clone(),
            kind,
            delta: ScoreDelta::ZERO,
        }
    }

    /// Deltas reordered so that the competitor with `first_id` comes first.
    pub fn oriented(&self, first_id: &str) -> (i64, i64) {
        if self.creator_id == first_id {
            (self.delta.creator, self.delta.opponent)
        } else {
            (self.delta.opponent, self.delta.creator)
        }
    }
}

/// Where a round sits in the tournament; used for logs and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundContext {
    pub pairing: (usize, usize),
    pub round: u32,
}

/// Runs rounds against injected collaborators.
pub struct MatchEngine {
    registry: Arc<ProviderRegistry>,
    verifier: Arc<dyn Verifier>,
    policy: ScoringPolicy,
    audit: Arc<AuditLog>,
    challenge_prompt: String,
}

impl MatchEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        verifier: Arc<dyn Verifier>,
        policy: ScoringPolicy,
    ) -> Self {
        Self {
            registry,
            verifier,
            policy,
            audit: Arc::new(AuditLog::disabled()),
            challenge_prompt: challenge_prompt(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Ask `creator` for a new challenge; returns the raw response text.
    pub async fn request_challenge(
        &self,
        ctx: RoundContext,
        creator: &Competitor,
    ) -> Result<String, ProviderError> {
        self.send(ctx, RequestPurpose::Challenge, creator, &self.challenge_prompt)
            .await
    }

    /// Ask `competitor` to implement `challenge`, showing visible tests only.
    pub async fn request_attempt(
        &self,
        ctx: RoundContext,
        purpose: RequestPurpose,
        competitor: &Competitor,
        challenge: &Challenge,
    ) -> Result<String, ProviderError> {
        let prompt = implementation_prompt(&challenge.visible_listing());
        self.send(ctx, purpose, competitor, &prompt).await
    }

    async fn send(
        &self,
        ctx: RoundContext,
        purpose: RequestPurpose,
        competitor: &Competitor,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let start = Instant::now();
        let result = self.registry.complete(competitor, prompt).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => debug!(
                competitor = %competitor.unique_id,
                %purpose,
                latency_ms,
                preview = %preview(text, 120),
                "Provider response"
            ),
            Err(e) => warn!(
                competitor = %competitor.unique_id,
                %purpose,
                transient = e.is_transient(),
                "Provider request failed: {e}"
            ),
        }

        self.audit.record(&AuditEvent::Request {
            timestamp: Utc::now(),
            pairing: ctx.pairing,
            round: ctx.round,
            purpose,
            competitor: competitor.unique_id.clone(),
            model: competitor.name.clone(),
            prompt: prompt.to_string(),
            response: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(|e| e.to_string()),
            latency_ms,
        });

        result
    }

    async fn judge(&self, candidate: &Candidate, challenge: &Challenge) -> Verdict {
        match candidate.code() {
            Some(code) => {
                self.verifier
                    .verify(code, &challenge.visible, &challenge.hidden)
                    .await
            }
            None => Verdict::Fail,
        }
    }

    /// Play one round: `creator` authors, both sides attempt, the policy scores.
    pub async fn run_round(
        &self,
        ctx: RoundContext,
        creator: &Competitor,
        opponent: &Competitor,
    ) -> RoundOutcome {
        let outcome = self.play(ctx, creator, opponent).await;

        info!(
            pairing = ?ctx.pairing,
            round = ctx.round,
            creator = %creator.display_name,
            opponent = %opponent.display_name,
            outcome = outcome.kind.label(),
            delta_creator = outcome.delta.creator,
            delta_opponent = outcome.delta.opponent,
            "Round finished"
        );
        self.audit.record(&AuditEvent::Round {
            timestamp: Utc::now(),
            pairing: ctx.pairing,
            round: ctx.round,
            outcome: outcome.clone(),
        });

        outcome
    }

    async fn play(
        &self,
        ctx: RoundContext,
        creator: &Competitor,
        opponent: &Competitor,
    ) -> RoundOutcome {
        let raw_challenge = match self.request_challenge(ctx, creator).await {
            Ok(raw) => raw,
            Err(e) => {
                return RoundOutcome::no_contest(
                    creator,
                    opponent,
                    RoundKind::ProviderFailed {
                        stage: RequestPurpose::Challenge,
                        error: e.to_string(),
                    },
                )
            }
        };

        let challenge = parse_challenge(&raw_challenge);
        if !challenge.is_valid() {
            warn!(
                pairing = ?ctx.pairing,
                round = ctx.round,
                creator = %creator.unique_id,
                "Failed to extract test cases from challenge"
            );
            return RoundOutcome::no_contest(creator, opponent, RoundKind::Unparseable);
        }
        debug!(
            visible = challenge.visible.len(),
            hidden = challenge.hidden.len(),
            "Challenge parsed"
        );

        let (creator_raw, opponent_raw) = tokio::join!(
            self.request_attempt(ctx, RequestPurpose::CreatorAttempt, creator, &challenge),
            self.request_attempt(ctx, RequestPurpose::OpponentAttempt, opponent, &challenge),
        );
        let (creator_raw, opponent_raw) = match (creator_raw, opponent_raw) {
            (Ok(c), Ok(o)) => (c, o),
            (Err(e), _) => {
                return RoundOutcome::no_contest(
                    creator,
                    opponent,
                    RoundKind::ProviderFailed {
                        stage: RequestPurpose::CreatorAttempt,
                        error: e.to_string(),
                    },
                )
            }
            (_, Err(e)) => {
                return RoundOutcome::no_contest(
                    creator,
                    opponent,
                    RoundKind::ProviderFailed {
                        stage: RequestPurpose::OpponentAttempt,
                        error: e.to_string(),
                    },
                )
            }
        };

        let creator_candidate = parse_attempt(&creator_raw);
        let opponent_candidate = parse_attempt(&opponent_raw);
        let (creator_verdict, opponent_verdict) = tokio::join!(
            self.judge(&creator_candidate, &challenge),
            self.judge(&opponent_candidate, &challenge),
        );

        let kind = if creator_verdict.passed() {
            RoundKind::Decided {
                opponent: opponent_verdict,
            }
        } else {
            RoundKind::CreatorFailedOwnChallenge {
                opponent: opponent_verdict,
            }
        };

        RoundOutcome {
            creator_id: creator.unique_id.clone(),
            opponent_id: opponent.unique_id.clone(),
            kind,
            delta: self.policy.score(creator_verdict, opponent_verdict),
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ModelScript, ScriptedProvider, ScriptedVerifier};

    const SQUARE_CHALLENGE: &str = "[Start of code]\ndef test_X():\n    # Visible test cases\n    assert X(2) == 4\n    # Hidden test cases\n    assert X(3) == 9\n[End of code]";

    fn ctx() -> RoundContext {
        RoundContext {
            pairing: (0, 1),
            round: 0,
        }
    }

    fn engine(provider: ScriptedProvider, verifier: ScriptedVerifier) -> MatchEngine {
        let registry = ProviderRegistry::new().with_default(Arc::new(provider), None);
        MatchEngine::new(
            Arc::new(registry),
            Arc::new(verifier),
            ScoringPolicy::Asymmetric,
        )
    }

    fn attempt(code: &str) -> String {
        format!("[Start of code]\n{code}\n[End of code]")
    }

    fn scripted(creator_code: &str, opponent_code: &str) -> ScriptedProvider {
        ScriptedProvider::new()
            .with_model(
                "creator/model",
                ModelScript::new(SQUARE_CHALLENGE, attempt(creator_code)),
            )
            .with_model(
                "opponent/model",
                ModelScript::new(SQUARE_CHALLENGE, attempt(opponent_code)),
            )
    }

    async fn play(creator_code: &str, opponent_code: &str) -> RoundOutcome {
        let verifier = ScriptedVerifier::by_candidate([
            ("good", Verdict::Pass),
            ("bad", Verdict::Fail),
        ]);
        let engine = engine(scripted(creator_code, opponent_code), verifier);
        engine
            .run_round(
                ctx(),
                &Competitor::new("creator/model"),
                &Competitor::new("opponent/model"),
            )
            .await
    }

    #[tokio::test]
    async fn all_verdict_combinations_follow_policy() {
        let cases = [
            ("good", "bad", 3, 0),
            ("good", "good", 1, 2),
            ("bad", "good", -1, 3),
            ("bad", "bad", 0, 0),
        ];
        for (creator, opponent, dc, dop) in cases {
            let outcome = play(creator, opponent).await;
            assert_eq!(
                outcome.delta,
                ScoreDelta::new(dc, dop),
                "{creator} vs {opponent}"
            );
        }
    }

    #[tokio::test]
    async fn creator_failure_is_labelled() {
        let outcome = play("bad", "good").await;
        assert_eq!(
            outcome.kind,
            RoundKind::CreatorFailedOwnChallenge {
                opponent: Verdict::Pass
            }
        );
        let outcome = play("good", "bad").await;
        assert_eq!(
            outcome.kind,
            RoundKind::Decided {
                opponent: Verdict::Fail
            }
        );
    }

    #[tokio::test]
    async fn empty_challenge_is_unparseable_no_op() {
        let provider = ScriptedProvider::new().with_default(ModelScript::new(
            "[Start of code]\ndef test_X():\n    pass\n[End of code]",
            attempt("good"),
        ));
        let engine = engine(provider.clone(), ScriptedVerifier::always(Verdict::Pass));
        let outcome = engine
            .run_round(ctx(), &Competitor::new("a/a"), &Competitor::new("b/b"))
            .await;
        assert_eq!(outcome.kind, RoundKind::Unparseable);
        assert_eq!(outcome.delta, ScoreDelta::ZERO);
        // Nobody is asked to solve an unplayable challenge.
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_no_op() {
        let provider = ScriptedProvider::new()
            .with_model("creator/model", ModelScript::new(SQUARE_CHALLENGE, attempt("good")))
            .with_model("opponent/model", ModelScript::failing("upstream 502"));
        let engine = engine(provider, ScriptedVerifier::always(Verdict::Pass));
        let outcome = engine
            .run_round(
                ctx(),
                &Competitor::new("creator/model"),
                &Competitor::new("opponent/model"),
            )
            .await;
        assert!(outcome.kind.is_no_contest());
        assert!(matches!(
            outcome.kind,
            RoundKind::ProviderFailed {
                stage: RequestPurpose::OpponentAttempt,
                ..
            }
        ));
        assert_eq!(outcome.delta, ScoreDelta::ZERO);
    }

    #[tokio::test]
    async fn missing_code_block_fails_without_verifier() {
        let provider = ScriptedProvider::new()
            .with_model("creator/model", ModelScript::new(SQUARE_CHALLENGE, attempt("good")))
            .with_model(
                "opponent/model",
                ModelScript::new(SQUARE_CHALLENGE, "I don't know, sorry."),
            );
        let verifier = ScriptedVerifier::always(Verdict::Pass);
        let engine = engine(provider, verifier.clone());
        let outcome = engine
            .run_round(
                ctx(),
                &Competitor::new("creator/model"),
                &Competitor::new("opponent/model"),
            )
            .await;
        assert_eq!(outcome.delta, ScoreDelta::new(3, 0));
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn audit_captures_requests_and_round() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let audit = Arc::new(AuditLog::open(&path).unwrap());
        let verifier = ScriptedVerifier::always(Verdict::Pass);
        let engine = engine(scripted("good", "good"), verifier).with_audit(audit);

        engine
            .run_round(
                ctx(),
                &Competitor::new("creator/model"),
                &Competitor::new("opponent/model"),
            )
            .await;

        let events = AuditLog::read_events(&path).unwrap();
        assert_eq!(events.len(), 4);
        let purposes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AuditEvent::Request { purpose, .. } => Some(*purpose),
                _ => None,
            })
            .collect();
        assert_eq!(purposes[0], RequestPurpose::Challenge);
        assert!(purposes.contains(&RequestPurpose::CreatorAttempt));
        assert!(purposes.contains(&RequestPurpose::OpponentAttempt));
        assert!(matches!(events[3], AuditEvent::Round { .. }));
    }

    #[test]
    fn outcome_orientation() {
        let outcome = RoundOutcome {
            creator_id: "b".into(),
            opponent_id: "a".into(),
            kind: RoundKind::Decided {
                opponent: Verdict::Fail,
            },
            delta: ScoreDelta::new(3, 0),
        };
        assert_eq!(outcome.oriented("a"), (0, 3));
        assert_eq!(outcome.oriented("b"), (3, 0));
    }
}
