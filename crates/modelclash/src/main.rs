use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arena::reporter::render;
use arena::{
    AuditLog, Competitor, MatchEngine, ProviderRegistry, ReportView, ScoringPolicy, SortKey,
    TableReporter, Tournament, Verifier,
};
use clap::Parser;
use modelclash::config::{ClashConfig, Overrides};
use modelclash::providers::build_registry;
use modelclash::{dry_run, PythonSandbox};
use tracing::{error, info, warn};

/// Round-robin coding tournament between language models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rounds played by every pairing
    #[arg(short, long)]
    rounds: Option<u32>,

    /// Comma-separated model names (e.g. openai/gpt-4o,anthropic/claude-3.5-sonnet)
    #[arg(short, long, value_delimiter = ',')]
    models: Vec<String>,

    /// Maximum pairings running at once
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Run every pairing at once
    #[arg(long, conflicts_with = "max_in_flight")]
    unbounded: bool,

    /// Scoring policy: asymmetric or symmetric
    #[arg(long)]
    policy: Option<ScoringPolicy>,

    /// Progress table: pairings or standings
    #[arg(long)]
    view: Option<ReportView>,

    /// Table order: name or score
    #[arg(long)]
    sort: Option<SortKey>,

    /// Append every request and round to this JSONL file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Python interpreter used to verify candidates
    #[arg(long)]
    python: Option<String>,

    /// Use scripted providers and verdicts instead of real models and Python
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            models: (!self.models.is_empty()).then(|| self.models.clone()),
            rounds: self.rounds,
            max_in_flight: self.max_in_flight,
            unbounded: self.unbounded,
            scoring: self.policy,
            view: self.view,
            sort: self.sort,
            audit_log: self.audit_log.clone(),
            python: self.python.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = ClashConfig::load(args.config.as_deref()).context("loading configuration")?;
    config
        .apply_env()
        .context("reading environment overrides")?;
    config.apply_overrides(args.overrides());
    config.validate()?;

    let (registry, verifier): (ProviderRegistry, Arc<dyn Verifier>) = if args.dry_run {
        warn!("Dry run: providers and sandbox are scripted");
        let (provider, verifier) = dry_run::collaborators(&config.models);
        (
            ProviderRegistry::new().with_default(Arc::new(provider), None),
            Arc::new(verifier),
        )
    } else {
        let registry = build_registry(&config).context("building provider registry")?;
        let sandbox = PythonSandbox::from_config(&config.sandbox);
        if !sandbox.is_available().await {
            bail!(
                "python interpreter `{}` is not runnable (set {} or --python)",
                config.sandbox.python,
                modelclash::config::ENV_PYTHON
            );
        }
        (registry, Arc::new(sandbox))
    };
    let registry = Arc::new(registry);

    let audit = match &config.audit_log {
        Some(path) => {
            let log = AuditLog::open(path)
                .with_context(|| format!("opening audit log {}", path.display()))?;
            info!(path = %path.display(), "Audit log enabled");
            Arc::new(log)
        }
        None => Arc::new(AuditLog::disabled()),
    };

    let engine = MatchEngine::new(registry.clone(), verifier, config.tournament.scoring)
        .with_audit(audit);
    let competitors: Vec<Competitor> = config.models.iter().map(Competitor::new).collect();
    let reporter = Arc::new(TableReporter::new(
        config.tournament.view,
        config.tournament.sort,
    ));
    let tournament = Tournament::new(competitors, config.tournament.clone(), engine, reporter)?;

    let cancel = tournament.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; letting in-flight commits finish");
            cancel.cancel();
        }
    });

    let summary = tournament.run().await?;

    println!(
        "{}",
        render(&summary.snapshot, ReportView::Standings, SortKey::Score)
    );

    for (label, provider, health) in registry.health_report() {
        info!(
            route = %label,
            provider = %provider,
            success = health.success_count,
            errors = health.error_count,
            success_rate = health.success_rate(),
            avg_latency_ms = health.avg_latency_ms,
            last_error = health.last_error.as_deref().unwrap_or("-"),
            "Provider health"
        );
    }
    for failure in &summary.failed_pairings {
        match failure.pairing {
            Some(pairing) => error!(%pairing, error = %failure.error, "Pairing failed"),
            None => error!(error = %failure.error, "Pairing task failed"),
        }
    }

    if summary.cancelled {
        bail!(
            "tournament cancelled after {}/{} rounds",
            summary.snapshot.rounds_completed,
            summary.snapshot.rounds_total
        );
    }
    info!(
        elapsed_secs = summary.elapsed.as_secs(),
        "Tournament complete"
    );
    Ok(())
}
