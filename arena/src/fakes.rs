//! Deterministic collaborators for tests and offline dry runs.
//!
//! [`ScriptedProvider`] answers from per-model scripts instead of calling a
//! model, and [`ScriptedVerifier`] returns scripted verdicts instead of
//! executing code. Both count calls, and the provider also tracks peak
//! concurrency, so scheduling behaviour can be asserted on.
//! [`RecordingReporter`] keeps every scoreboard snapshot it is handed.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::oracle::{Verdict, Verifier};
use crate::prompts::is_challenge_prompt;
use crate::provider::Provider;
use crate::reporter::Reporter;
use crate::state::ScoreboardSnapshot;

// ── Provider ─────────────────────────────────────────────────────────

/// Canned responses for one model.
#[derive(Debug, Clone, Default)]
pub struct ModelScript {
    challenge: String,
    attempt: String,
    failure: Option<String>,
    latency: Duration,
}

impl ModelScript {
    /// Answer challenge prompts with `challenge` and attempt prompts with `attempt`.
    pub fn new(challenge: impl Into<String>, attempt: impl Into<String>) -> Self {
        Self {
            challenge: challenge.into(),
            attempt: attempt.into(),
            ..Default::default()
        }
    }

    /// Fail every request with a transient request error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Sleep this long before answering (honours paused tokio time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Provider that replays [`ModelScript`]s keyed by model name.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    scripts: HashMap<String, ModelScript>,
    default: Option<ModelScript>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>, script: ModelScript) -> Self {
        self.scripts.insert(model.into(), script);
        self
    }

    /// Script used for any model without its own entry.
    pub fn with_default(mut self, script: ModelScript) -> Self {
        self.default = Some(script);
        self
    }

    /// Total `complete` calls across all clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously pending `complete` calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let script = self.scripts.get(model).or(self.default.as_ref()).cloned();
        if let Some(latency) = script.as_ref().map(|s| s.latency).filter(|l| !l.is_zero()) {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = script
            .ok_or_else(|| ProviderError::Request(format!("no script for model `{model}`")))?;
        if let Some(message) = script.failure {
            return Err(ProviderError::Request(message));
        }
        if is_challenge_prompt(prompt) {
            Ok(script.challenge)
        } else {
            Ok(script.attempt)
        }
    }
}

// ── Verifier ─────────────────────────────────────────────────────────

#[derive(Debug)]
enum VerdictScript {
    Always(Verdict),
    /// Pops verdicts in call order; `Fail` once exhausted.
    Sequence(Mutex<VecDeque<Verdict>>),
    /// First entry whose key occurs in the candidate wins; `Fail` otherwise.
    ByCandidate(Vec<(String, Verdict)>),
}

/// Verifier that never executes anything.
#[derive(Debug, Clone)]
pub struct ScriptedVerifier {
    script: Arc<VerdictScript>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedVerifier {
    fn from_script(script: VerdictScript) -> Self {
        Self {
            script: Arc::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(verdict: Verdict) -> Self {
        Self::from_script(VerdictScript::Always(verdict))
    }

    pub fn sequence(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        Self::from_script(VerdictScript::Sequence(Mutex::new(
            verdicts.into_iter().collect(),
        )))
    }

    pub fn by_candidate<K: Into<String>>(rules: impl IntoIterator<Item = (K, Verdict)>) -> Self {
        Self::from_script(VerdictScript::ByCandidate(
            rules.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, candidate: &str, _visible: &[String], _hidden: &[String]) -> Verdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.as_ref() {
            VerdictScript::Always(verdict) => *verdict,
            VerdictScript::Sequence(queue) => queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pop_front()
                .unwrap_or(Verdict::Fail),
            VerdictScript::ByCandidate(rules) => rules
                .iter()
                .find(|(key, _)| candidate.contains(key.as_str()))
                .map(|(_, verdict)| *verdict)
                .unwrap_or(Verdict::Fail),
        }
    }
}

// ── Reporter ─────────────────────────────────────────────────────────

/// Reporter that stores every snapshot for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    snapshots: Arc<Mutex<Vec<ScoreboardSnapshot>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<ScoreboardSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<ScoreboardSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, snapshot: &ScoreboardSnapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{challenge_prompt, implementation_prompt};

    #[tokio::test]
    async fn provider_picks_response_by_prompt() {
        let provider = ScriptedProvider::new()
            .with_model("m/one", ModelScript::new("challenge-1", "attempt-1"))
            .with_default(ModelScript::new("challenge-d", "attempt-d"));

        assert_eq!(
            provider.complete("m/one", &challenge_prompt()).await.unwrap(),
            "challenge-1"
        );
        assert_eq!(
            provider
                .complete("m/one", &implementation_prompt("assert X(1) == 1"))
                .await
                .unwrap(),
            "attempt-1"
        );
        assert_eq!(
            provider.complete("m/other", &challenge_prompt()).await.unwrap(),
            "challenge-d"
        );
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn provider_without_script_errors() {
        let provider = ScriptedProvider::new().with_model("m/fail", ModelScript::failing("boom"));
        assert!(provider.complete("m/none", "x").await.is_err());
        let err = provider.complete("m/fail", "x").await.unwrap_err();
        assert_eq!(err.to_string(), "request failed: boom");
    }

    #[tokio::test]
    async fn verifier_sequence_then_fail() {
        let v = ScriptedVerifier::sequence([Verdict::Pass, Verdict::Pass]);
        assert_eq!(v.verify("x", &[], &[]).await, Verdict::Pass);
        assert_eq!(v.verify("x", &[], &[]).await, Verdict::Pass);
        assert_eq!(v.verify("x", &[], &[]).await, Verdict::Fail);
        assert_eq!(v.calls(), 3);
    }

    #[tokio::test]
    async fn verifier_by_candidate() {
        let v = ScriptedVerifier::by_candidate([("n * n", Verdict::Pass)]);
        assert_eq!(
            v.verify("def X(n): return n * n", &[], &[]).await,
            Verdict::Pass
        );
        assert_eq!(v.verify("def X(n): return n", &[], &[]).await, Verdict::Fail);
    }
}
