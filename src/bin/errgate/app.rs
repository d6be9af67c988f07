use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::bounded;
use errgate::{FailedRequest, Result};
use errgate::config::Config;
use errgate::error::{ConfigError, Error as GateError};
use errgate::interceptor::{ChannelSink, ErrorInterceptor, HideErrorsFlag, Outcome};
use errgate::probe::ProbeClient;
use errgate::telemetry::init_tracing;
use serde::Deserialize;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::cli::Cli;
use super::notifier::run_notifier;

const DEFAULT_CONFIG: &str = "errgate.toml";

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.log_filter.as_deref(), cli.json_logs)?;

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = Config::from_env_and_file(&config_path)?;

    if let Some(interval) = cli.interval {
        config.poll_interval = interval;
    }

    let (hide_tx, hide_flag) =
        HideErrorsFlag::channel(cli.hide_all_errors || config.silence.hide_all_errors);
    spawn_hide_toggle(hide_tx);

    let (tx, rx) = bounded(config.queue_capacity);
    let notifier = tokio::spawn(run_notifier(rx, config.notify.clone(), cli.dry_run));

    let interceptor = ErrorInterceptor::new(
        config.throttling_resolver(),
        config.silence_filters(),
        config.remapper(),
        hide_flag,
        Arc::new(ChannelSink::new(tx.clone())),
    )
    .with_max_entries(config.max_entries);

    let result = match cli.replay.as_deref() {
        Some(path) => replay_file(path, &interceptor).await,
        None => poll_loop(&config, &interceptor, cli.once, cli.insecure).await,
    };

    interceptor.clear();
    tx.close();
    if let Err(err) = notifier.await {
        warn!(error = %err, "notifier task terminated unexpectedly");
    }

    result
}

async fn poll_loop(
    config: &Config,
    interceptor: &ErrorInterceptor,
    once: bool,
    insecure: bool,
) -> Result<()> {
    let base_url = config
        .probe
        .base_url
        .clone()
        .ok_or(ConfigError::MissingField {
            field: "probe.base_url",
        })?;
    if config.probe.endpoints.is_empty() {
        return Err(GateError::from(ConfigError::MissingField {
            field: "probe.endpoints",
        }));
    }

    let client = ProbeClient::new(
        base_url,
        config.probe.token.clone(),
        config.probe.request_timeout,
        config.probe.connect_timeout,
        insecure,
    )?;

    let cleanup_interval = interceptor.throttling_config().cleanup_interval;
    let mut last_sweep = Instant::now();

    loop {
        let iteration_start = Instant::now();
        tokio::select! {
            biased;
            _ = signal::ctrl_c() => {
                info!("shutdown signal received, stopping loop");
                break;
            }
            stats = poll_once(&client, config, interceptor) => {
                debug!(
                    failures = stats.failures,
                    skipped = stats.skipped,
                    notified = stats.notified,
                    throttled = stats.throttled,
                    silenced = stats.silenced,
                    "poll iteration finished"
                );
            }
        }

        if once {
            break;
        }

        if config.periodic_sweep
            && !cleanup_interval.is_zero()
            && last_sweep.elapsed() >= cleanup_interval
        {
            let removed = interceptor.sweep_expired();
            debug!(removed, "periodic sweep of expired entries");
            last_sweep = Instant::now();
        }

        let sleep_dur = config
            .poll_interval
            .checked_sub(iteration_start.elapsed())
            .unwrap_or_default();

        if sleep_dur.is_zero() {
            continue;
        }

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received, stopping loop");
                break;
            }
            _ = sleep(sleep_dur) => {}
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct PollStats {
    pub failures: usize,
    pub notified: usize,
    pub throttled: usize,
    pub silenced: usize,
    /// Endpoints that could not be probed at all.
    pub skipped: usize,
}

impl PollStats {
    fn record(&mut self, outcome: &Outcome) {
        self.failures += 1;
        match outcome {
            Outcome::Notified(_) => self.notified += 1,
            Outcome::Throttled => self.throttled += 1,
            Outcome::Silenced => self.silenced += 1,
        }
    }
}

pub(super) async fn poll_once(
    client: &ProbeClient,
    config: &Config,
    interceptor: &ErrorInterceptor,
) -> PollStats {
    let results = client
        .probe_all(&config.probe.endpoints, config.probe.concurrency)
        .await;

    let mut stats = PollStats::default();
    for (endpoint, result) in config.probe.endpoints.iter().zip(results) {
        let failure = match result {
            Ok(Some(failure)) => failure,
            Ok(None) => continue,
            Err(err) => {
                warn!(endpoint = endpoint.as_str(), error = %err, "skipping endpoint");
                stats.skipped += 1;
                continue;
            }
        };
        let outcome = interceptor.handle(Some(&failure));
        info!(
            endpoint = endpoint.as_str(),
            status = failure.status,
            outcome = outcome_label(&outcome),
            "endpoint failed"
        );
        stats.record(&outcome);
    }
    stats
}

/// One line of a replay file: a recorded failure and its offset from the
/// start of the replay.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    #[serde(default)]
    at_ms: Option<u64>,
    #[serde(flatten)]
    failure: FailedRequest,
}

async fn replay_file(path: &Path, interceptor: &ErrorInterceptor) -> Result<()> {
    let contents = std::fs::read_to_string(path).map_err(|source| GateError::Replay {
        path: path.to_path_buf(),
        source,
    })?;
    let stats = replay_lines(&contents, interceptor, Instant::now()).await;
    info!(
        path = %path.display(),
        failures = stats.failures,
        notified = stats.notified,
        throttled = stats.throttled,
        silenced = stats.silenced,
        "replay finished"
    );
    Ok(())
}

pub(super) async fn replay_lines(
    contents: &str,
    interceptor: &ErrorInterceptor,
    start: Instant,
) -> PollStats {
    let mut stats = PollStats::default();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record: ReplayRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                warn!(line = idx + 1, error = %err, "skipping malformed replay line");
                continue;
            }
        };
        let now = record
            .at_ms
            .map_or_else(Instant::now, |ms| start + Duration::from_millis(ms));
        let outcome = interceptor.handle_at(Some(&record.failure), now);
        debug!(line = idx + 1, outcome = outcome_label(&outcome), "replayed failure");
        stats.record(&outcome);
        tokio::task::yield_now().await;
    }
    stats
}

const fn outcome_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Notified(_) => "notified",
        Outcome::Throttled => "throttled",
        Outcome::Silenced => "silenced",
    }
}

#[cfg(unix)]
fn spawn_hide_toggle(tx: watch::Sender<bool>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "cannot listen for SIGUSR1; hide-all-errors stays fixed");
            return;
        }
    };
    tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            tx.send_modify(|hide| *hide = !*hide);
            info!(hide_all_errors = *tx.borrow(), "toggled hide-all-errors");
        }
    });
}

#[cfg(not(unix))]
fn spawn_hide_toggle(tx: watch::Sender<bool>) {
    let _ = tx;
}
