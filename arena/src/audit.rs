//! Append-only audit log.
//!
//! Every request/response pair and every round outcome is appended to a
//! JSONL file (one complete JSON object per line) for post-hoc review. The
//! log is never read back by the tournament, and a failed write is logged
//! and dropped; it must not affect scoring.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::RoundOutcome;

/// Why a prompt was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPurpose {
    Challenge,
    CreatorAttempt,
    OpponentAttempt,
}

impl std::fmt::Display for RequestPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Challenge => write!(f, "challenge"),
            Self::CreatorAttempt => write!(f, "creator_attempt"),
            Self::OpponentAttempt => write!(f, "opponent_attempt"),
        }
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Request {
        timestamp: DateTime<Utc>,
        pairing: (usize, usize),
        round: u32,
        purpose: RequestPurpose,
        competitor: String,
        model: String,
        prompt: String,
        response: Option<String>,
        error: Option<String>,
        latency_ms: u64,
    },
    Round {
        timestamp: DateTime<Utc>,
        pairing: (usize, usize),
        round: u32,
        outcome: RoundOutcome,
    },
}

/// JSONL sink shared by all pairing tasks.
#[derive(Debug, Default)]
pub struct AuditLog {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl AuditLog {
    /// A log that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path: Some(path),
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Append one event. Failures are logged, never returned.
    pub fn record(&self, event: &AuditEvent) {
        if !self.is_enabled() {
            return;
        }
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize audit event: {e}");
                return;
            }
        };
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(file) = guard.as_mut() {
            if let Err(e) = writeln!(file, "{json}") {
                warn!("Failed to append audit event: {e}");
            }
        }
    }

    /// Parse every line of an audit file; malformed lines are skipped with a warning.
    pub fn read_events(path: impl AsRef<Path>) -> std::io::Result<Vec<AuditEvent>> {
        let contents = std::fs::read_to_string(path)?;
        let mut events = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(line = idx + 1, "Skipping malformed audit line: {e}"),
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RoundKind;
    use crate::scoring::ScoreDelta;

    fn request(round: u32) -> AuditEvent {
        AuditEvent::Request {
            timestamp: Utc::now(),
            pairing: (0, 1),
            round,
            purpose: RequestPurpose::Challenge,
            competitor: "openai/gpt-4o_deadbeef".into(),
            model: "openai/gpt-4o".into(),
            prompt: "design X".into(),
            response: Some("[Start of code]...[End of code]".into()),
            error: None,
            latency_ms: 12,
        }
    }

    #[test]
    fn appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");

        let log = AuditLog::open(&path).unwrap();
        log.record(&request(0));
        log.record(&AuditEvent::Round {
            timestamp: Utc::now(),
            pairing: (0, 1),
            round: 0,
            outcome: RoundOutcome {
                creator_id: "a".into(),
                opponent_id: "b".into(),
                kind: RoundKind::Unparseable,
                delta: ScoreDelta::ZERO,
            },
        });
        drop(log);

        // Reopening appends rather than truncating.
        let log = AuditLog::open(&path).unwrap();
        log.record(&request(1));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.lines().next().unwrap().contains("\"event\":\"request\""));

        let events = AuditLog::read_events(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[1],
            AuditEvent::Round {
                outcome: RoundOutcome {
                    kind: RoundKind::Unparseable,
                    ..
                },
                ..
            }
        ));
        assert!(matches!(events[2], AuditEvent::Request { round: 1, .. }));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        log.record(&request(0));
        drop(log);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        assert_eq!(AuditLog::read_events(&path).unwrap().len(), 1);
    }

    #[test]
    fn disabled_log_is_a_no_op() {
        let log = AuditLog::disabled();
        assert!(!log.is_enabled());
        assert!(log.path().is_none());
        log.record(&request(0));
    }
}
