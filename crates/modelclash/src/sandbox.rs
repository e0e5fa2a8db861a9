//! Python sandbox verifier.
//!
//! Each verification runs in a fresh `python -I` process: the candidate is
//! executed into a private namespace, then every visible and hidden
//! predicate is executed against it in order. Exit status 0 means every
//! predicate held. Any exception, a non-zero exit, a spawn failure or the
//! timeout is a fail. Nothing survives between verifications, so a candidate
//! cannot leak `X` into the next one.
//!
//! This is isolation by process, not a security boundary: candidates run
//! with the user's privileges.

use std::process::Stdio;
use std::time::{Duration, Instant};

use arena::{Verdict, Verifier};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::SandboxConfig;

/// Reads `{"code": str, "tests": [str]}` from stdin.
const DRIVER: &str = r#"
import json, sys
payload = json.load(sys.stdin)
namespace = {"__name__": "__candidate__"}
try:
    exec(payload["code"], namespace)
except BaseException:
    sys.exit(3)
for test in payload["tests"]:
    try:
        exec(test, namespace)
    except BaseException:
        sys.exit(4)
sys.exit(0)
"#;

#[derive(Serialize)]
struct Payload<'a> {
    code: &'a str,
    tests: Vec<&'a str>,
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to spawn `{python}`: {source}")]
    Spawn {
        python: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to talk to sandbox process: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("verification timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of one sandbox run, before it is collapsed into a [`Verdict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRun {
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub elapsed: Duration,
}

impl SandboxRun {
    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Production [`Verifier`]: executes candidates with a local Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    python: String,
    timeout: Duration,
}

impl PythonSandbox {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.python.clone(), Duration::from_secs(config.timeout_secs))
    }

    /// Whether the interpreter can be started at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.python)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run `code` then each of `tests` in one fresh interpreter.
    pub async fn run(&self, code: &str, tests: &[&str]) -> Result<SandboxRun, SandboxError> {
        let payload = serde_json::to_vec(&Payload {
            code,
            tests: tests.to_vec(),
        })?;

        let mut cmd = Command::new(&self.python);
        cmd.args(["-I", "-c", DRIVER])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so anything the candidate spawns dies with it.
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            python: self.python.clone(),
            source,
        })?;

        // The child moves into the future; dropping it on timeout kills the process.
        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(output)) => Ok(SandboxRun {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                elapsed: start.elapsed(),
            }),
            Ok(Err(e)) => Err(SandboxError::Io(e)),
            Err(_) => Err(SandboxError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl Verifier for PythonSandbox {
    async fn verify(&self, candidate: &str, visible: &[String], hidden: &[String]) -> Verdict {
        let tests: Vec<&str> = visible
            .iter()
            .chain(hidden.iter())
            .map(String::as_str)
            .collect();
        match self.run(candidate, &tests).await {
            Ok(run) => {
                debug!(
                    exit_code = ?run.exit_code,
                    elapsed_ms = run.elapsed.as_millis() as u64,
                    tests = tests.len(),
                    "Sandbox run finished"
                );
                Verdict::from(run.passed())
            }
            Err(e) => {
                warn!(error = %e, "Sandbox run failed; scoring as fail");
                Verdict::Fail
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sandbox() -> Option<PythonSandbox> {
        let sandbox = PythonSandbox::new("python3", Duration::from_secs(10));
        if sandbox.is_available().await {
            Some(sandbox)
        } else {
            eprintln!("python3 not found; skipping sandbox test");
            None
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn square_passes_and_identity_fails() {
        let Some(sandbox) = sandbox().await else {
            return;
        };
        let visible = strings(&["assert X(2) == 4"]);
        let hidden = strings(&["assert X(3) == 9", "assert X(-1) == 1"]);

        let square = "def X(n):\n    return n * n";
        assert_eq!(sandbox.verify(square, &visible, &hidden).await, Verdict::Pass);

        let identity = "def X(n):\n    return n";
        assert_eq!(sandbox.verify(identity, &visible, &hidden).await, Verdict::Fail);
    }

    #[tokio::test]
    async fn broken_code_and_exits_fail() {
        let Some(sandbox) = sandbox().await else {
            return;
        };
        let tests = strings(&["assert X(1) == 1"]);
        for code in [
            "def X(n) return n",
            "raise SystemExit(0)",
            "def Y(n):\n    return n",
        ] {
            assert_eq!(sandbox.verify(code, &tests, &[]).await, Verdict::Fail, "{code}");
        }
    }

    #[tokio::test]
    async fn no_state_leaks_between_runs() {
        let Some(sandbox) = sandbox().await else {
            return;
        };
        let tests = strings(&["assert X(2) == 4"]);
        assert_eq!(
            sandbox.verify("def X(n):\n    return n * n", &tests, &[]).await,
            Verdict::Pass
        );
        // No definition this time: the previous X must be gone.
        assert_eq!(sandbox.verify("pass", &tests, &[]).await, Verdict::Fail);
    }

    #[tokio::test]
    async fn timeout_is_a_fail() {
        let Some(sandbox) = sandbox().await else {
            return;
        };
        let sandbox = PythonSandbox::new(sandbox.python, Duration::from_millis(300));
        let looping = "def X(n):\n    while True:\n        pass";
        let err = sandbox.run(looping, &["assert X(1) == 1"]).await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));
        assert_eq!(
            sandbox
                .verify(looping, &strings(&["assert X(1) == 1"]), &[])
                .await,
            Verdict::Fail
        );
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_fail() {
        let sandbox = PythonSandbox::new("definitely-not-a-python-binary", Duration::from_secs(1));
        assert!(!sandbox.is_available().await);
        assert!(matches!(
            sandbox.run("pass", &[]).await,
            Err(SandboxError::Spawn { .. })
        ));
        assert_eq!(sandbox.verify("pass", &[], &[]).await, Verdict::Fail);
    }
}
