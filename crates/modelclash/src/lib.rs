//! modelclash: runs the arena tournament against hosted models.
//!
//! The `arena` crate owns the tournament itself. This crate supplies the
//! collaborators that touch the outside world and the process entry point:
//!
//! - [`config`]: TOML file, environment and command-line configuration
//! - [`providers`]: HTTP providers for OpenRouter, OpenAI-compatible servers and Anthropic
//! - [`sandbox`]: [`sandbox::PythonSandbox`], the verifier that executes candidates
//! - [`dry_run`]: offline stand-ins so the scheduler can run without network or Python

pub mod config;
pub mod dry_run;
pub mod providers;
pub mod sandbox;

pub use config::{ClashConfig, ConfigError, Overrides};
pub use providers::{build_registry, AnthropicProvider, OpenAiCompatibleProvider};
pub use sandbox::PythonSandbox;
