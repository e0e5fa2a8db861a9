//! Provider Registry — routing competitors to model backends
//!
//! The registry is built once by the process entry point and handed to the
//! match engine; nothing in the core reaches for a global client. Each route
//! owns its provider, an optional rate limiter, and live health counters.
//!
//! ```text
//! competitor "anthropic/claude-3-opus"
//!   ├─ prefix route "anthropic" registered → that route
//!   └─ otherwise                           → default route (if any)
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::competitor::Competitor;
use crate::error::ProviderError;

/// A backend that turns a prompt into free text for a named model.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider label for logs and health reports (e.g. `"openrouter"`).
    fn name(&self) -> &str;

    /// Send `prompt` to `model` and return the raw completion text.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError>;
}

// ── Rate limiting ────────────────────────────────────────────────────

/// Sliding-window limiter: at most `max_requests` acquisitions per `period`.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    period: Duration,
    window: tokio::sync::Mutex<VecDeque<tokio::time::Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, period: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            period,
            window: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a request slot is free, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = tokio::time::Instant::now();
                while let Some(&oldest) = window.front() {
                    if now.duration_since(oldest) >= self.period {
                        window.pop_front();
                    } else {
                        break;
                    }
                }
                if window.len() < self.max_requests {
                    window.push_back(now);
                    return;
                }
                match window.front() {
                    Some(&oldest) => self.period.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };
            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

// ── Health ───────────────────────────────────────────────────────────

/// Live health metadata for a route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Average response latency of successful requests in milliseconds
    pub avg_latency_ms: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Last error seen, if any
    pub last_error: Option<String>,
}

impl ProviderHealth {
    /// Compute success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f32 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f32 / total as f32
        }
    }

    /// Record a successful request with latency
    pub fn record_success(&mut self, latency_ms: u64) {
        self.avg_latency_ms =
            (self.avg_latency_ms * self.success_count + latency_ms) / (self.success_count + 1);
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, error: &ProviderError) {
        self.error_count += 1;
        self.last_error = Some(error.to_string());
    }
}

// ── Routes & registry ────────────────────────────────────────────────

/// One provider plus its throttle and health counters.
pub struct ProviderRoute {
    label: String,
    provider: Arc<dyn Provider>,
    limiter: Option<RateLimiter>,
    health: Mutex<ProviderHealth>,
}

impl ProviderRoute {
    fn new(label: String, provider: Arc<dyn Provider>, limiter: Option<RateLimiter>) -> Self {
        Self {
            label,
            provider,
            limiter,
            health: Mutex::new(ProviderHealth::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn health(&self) -> ProviderHealth {
        self.health
            .lock()
            .map(|h| h.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        let start = std::time::Instant::now();
        let result = self.provider.complete(model, prompt).await;
        let mut health = self
            .health
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match &result {
            Ok(_) => health.record_success(start.elapsed().as_millis() as u64),
            Err(e) => health.record_failure(e),
        }
        result
    }
}

/// Routes competitors to providers by vendor prefix, with an optional default.
#[derive(Default)]
pub struct ProviderRegistry {
    routes: HashMap<String, Arc<ProviderRoute>>,
    default: Option<Arc<ProviderRoute>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve every competitor whose name starts with `<prefix>/`.
    pub fn with_route(
        mut self,
        prefix: impl Into<String>,
        provider: Arc<dyn Provider>,
        limiter: Option<RateLimiter>,
    ) -> Self {
        let prefix = prefix.into();
        let route = ProviderRoute::new(prefix.clone(), provider, limiter);
        self.routes.insert(prefix, Arc::new(route));
        self
    }

    /// Serve every competitor no prefix route claims.
    pub fn with_default(mut self, provider: Arc<dyn Provider>, limiter: Option<RateLimiter>) -> Self {
        let route = ProviderRoute::new("default".to_string(), provider, limiter);
        self.default = Some(Arc::new(route));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.default.is_none()
    }

    /// Route that will serve `competitor`.
    pub fn resolve(&self, competitor: &Competitor) -> Result<Arc<ProviderRoute>, ProviderError> {
        competitor
            .vendor()
            .and_then(|vendor| self.routes.get(vendor))
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(competitor.name.clone()))
    }

    /// Throttled completion for `competitor`, recording route health.
    pub async fn complete(
        &self,
        competitor: &Competitor,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let route = self.resolve(competitor)?;
        route.complete(&competitor.name, prompt).await
    }

    /// Health of every route, sorted by label.
    pub fn health_report(&self) -> Vec<(String, String, ProviderHealth)> {
        let mut report: Vec<_> = self
            .routes
            .values()
            .chain(self.default.iter())
            .map(|r| {
                (
                    r.label().to_string(),
                    r.provider_name().to_string(),
                    r.health(),
                )
            })
            .collect();
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, bool);

    #[async_trait]
    impl Provider for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn complete(&self, model: &str, _prompt: &str) -> Result<String, ProviderError> {
            if self.1 {
                Ok(format!("{}:{}", self.0, model))
            } else {
                Err(ProviderError::Request("connection reset".into()))
            }
        }
    }

    #[tokio::test]
    async fn prefix_route_beats_default() {
        let registry = ProviderRegistry::new()
            .with_route("anthropic", Arc::new(Named("anthropic-direct", true)), None)
            .with_default(Arc::new(Named("openrouter", true)), None);

        let claude = Competitor::new("anthropic/claude-3-opus");
        let gpt = Competitor::new("openai/gpt-4o");
        assert_eq!(
            registry.complete(&claude, "hi").await.unwrap(),
            "anthropic-direct:anthropic/claude-3-opus"
        );
        assert_eq!(
            registry.complete(&gpt, "hi").await.unwrap(),
            "openrouter:openai/gpt-4o"
        );
    }

    #[tokio::test]
    async fn unknown_without_default() {
        let registry =
            ProviderRegistry::new().with_route("openai", Arc::new(Named("openai", true)), None);
        let err = registry
            .complete(&Competitor::new("google/gemini-pro-1.5"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn health_tracks_outcomes() {
        let registry = ProviderRegistry::new()
            .with_route("bad", Arc::new(Named("flaky", false)), None)
            .with_default(Arc::new(Named("ok", true)), None);

        let _ = registry.complete(&Competitor::new("bad/model"), "p").await;
        let _ = registry.complete(&Competitor::new("good/model"), "p").await;
        let _ = registry.complete(&Competitor::new("good/model"), "p").await;

        let report = registry.health_report();
        assert_eq!(report.len(), 2);
        let (label, name, bad) = &report[0];
        assert_eq!((label.as_str(), name.as_str()), ("bad", "flaky"));
        assert_eq!(bad.error_count, 1);
        assert_eq!(bad.success_rate(), 0.0);
        assert!(bad.last_error.as_deref().unwrap().contains("connection reset"));
        let (_, _, good) = &report[1];
        assert_eq!(good.success_count, 2);
    }

    #[test]
    fn health_latency_is_running_average() {
        let mut health = ProviderHealth::default();
        health.record_success(100);
        health.record_success(300);
        assert_eq!(health.avg_latency_ms, 200);
        assert_eq!(health.success_rate(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_requests_by_period() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = tokio::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
