//! Offline collaborators for `--dry-run`.
//!
//! Every model authors the same squaring challenge. Models at even positions
//! answer it correctly and models at odd positions do not, so a dry run
//! produces a non-trivial scoreboard without network access or Python.

use std::time::Duration;

use arena::fakes::{ModelScript, ScriptedProvider, ScriptedVerifier};
use arena::Verdict;

const CHALLENGE: &str = "[Start of code]
def test_square():
    # Visible test cases
    assert square(2) == 4
    assert square(0) == 0
    # Hidden test cases
    assert square(-3) == 9
    assert square(12) == 144
[End of code]";

const CORRECT: &str = "[Start of code]\ndef X(n):\n    return n * n\n[End of code]";
const WRONG: &str = "[Start of code]\ndef X(n):\n    return n + n\n[End of code]";

/// Simulated per-request latency.
const LATENCY: Duration = Duration::from_millis(20);

/// Scripted provider and verifier for `models`.
pub fn collaborators(models: &[String]) -> (ScriptedProvider, ScriptedVerifier) {
    let provider = models
        .iter()
        .enumerate()
        .fold(ScriptedProvider::new(), |provider, (idx, model)| {
            let attempt = if idx % 2 == 0 { CORRECT } else { WRONG };
            provider.with_model(
                model.clone(),
                ModelScript::new(CHALLENGE, attempt).with_latency(LATENCY),
            )
        });
    let verifier = ScriptedVerifier::by_candidate([("n * n", Verdict::Pass)]);
    (provider, verifier)
}
