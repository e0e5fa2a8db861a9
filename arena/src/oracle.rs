//! Verification oracle interface.
//!
//! The engine only needs a boolean judgement: does this candidate satisfy
//! every visible and hidden predicate? How that is decided (a sandboxed
//! interpreter, a scripted fake) is the implementor's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of verifying one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn passed(self) -> bool {
        self == Self::Pass
    }
}

impl From<bool> for Verdict {
    fn from(passed: bool) -> Self {
        if passed {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Judges a candidate against a challenge's predicates.
///
/// Implementations must be infallible from the caller's point of view: load
/// errors, exceptions, assertion failures and timeouts are all `Fail`.
/// Successive calls must not observe each other's definitions.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, candidate: &str, visible: &[String], hidden: &[String]) -> Verdict;
}
