//! Load test orchestration.
//!
//! Turns a [`TestConfig`] into a population of HTTP-backed virtual users,
//! runs it through the [`Scheduler`] and folds the outcome stream into
//! [`TestResults`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::TestConfig;
use crate::error::SetupResult;
use crate::metrics::{MetricsCollector, TestResults};
use crate::outcome::{outcome_channel, OutcomeReceiver, OutcomeSender, RequestOutcome};
use crate::scheduler::{RunPlan, Scheduler, UserFactory};
use crate::session::{Credentials, HttpSession};
use crate::user::{user_rng, ProfileMix, UserId, UserProfile, VirtualUser};

/// Builds users that talk HTTP to the configured host.
pub struct HttpUserFactory {
    base_url: String,
    request_timeout: Duration,
    credentials: Credentials,
    profiles: Vec<UserProfile>,
    mix: ProfileMix,
    seed: Option<u64>,
}

impl HttpUserFactory {
    pub fn new(config: &TestConfig, profiles: Vec<UserProfile>) -> Self {
        let weights: Vec<u32> = profiles.iter().map(|p| p.weight).collect();
        Self {
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout(),
            credentials: config.credentials.clone(),
            mix: ProfileMix::new(&weights),
            profiles,
            seed: config.seed,
        }
    }

    /// Build one client up front so TLS or resolver problems surface as a
    /// setup error instead of a run full of spawn failures.
    pub fn probe(&self) -> SetupResult<()> {
        HttpSession::new(0, &self.base_url, self.request_timeout).map(|_| ())
    }

    pub fn profile_for(&self, id: UserId) -> &UserProfile {
        &self.profiles[self.mix.profile_for(id)]
    }
}

impl UserFactory for HttpUserFactory {
    fn create_user(&self, id: UserId, outcomes: OutcomeSender) -> SetupResult<VirtualUser> {
        let session = HttpSession::new(id, &self.base_url, self.request_timeout)?;
        Ok(VirtualUser::new(
            id,
            self.profile_for(id),
            Box::new(session),
            self.credentials.clone(),
            user_rng(self.seed, id),
            outcomes,
        ))
    }
}

/// JSONL sink with one line per request outcome.
pub struct RequestLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RequestLog {
    /// Create `<dir>/<scenario>_<timestamp>.jsonl`.
    pub fn create(dir: &Path, scenario: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let scenario_name = scenario.replace(' ', "_").to_lowercase();
        let path = dir.join(format!(
            "{}_{}.jsonl",
            scenario_name,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, outcome: &RequestOutcome) {
        if let Ok(json) = serde_json::to_string(outcome) {
            let _ = writeln!(self.writer, "{}", json);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush request log");
        }
    }
}

/// Live counters shown on the progress bar.
#[derive(Default)]
struct LiveCounters {
    requests: AtomicU64,
    failures: AtomicU64,
}

/// Drain the outcome stream until every sender is gone.
async fn aggregate(
    mut rx: OutcomeReceiver,
    mut log: Option<RequestLog>,
    live: Arc<LiveCounters>,
) -> MetricsCollector {
    let mut metrics = MetricsCollector::new();
    while let Some(outcome) = rx.recv().await {
        metrics.record(&outcome);
        live.requests.fetch_add(1, Ordering::Relaxed);
        if !outcome.is_success() {
            live.failures.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(log) = log.as_mut() {
            log.write(&outcome);
        }
    }
    if let Some(log) = log.as_mut() {
        log.flush();
    }
    metrics
}

/// Default location for request logs, relative to the working directory.
fn default_results_dir() -> PathBuf {
    if Path::new("validation/load-test").exists() {
        PathBuf::from("validation/load-test/results")
    } else {
        PathBuf::from("results")
    }
}

/// Executes one configured load test.
pub struct LoadRunner {
    config: TestConfig,
    results_dir: PathBuf,
    show_progress: bool,
}

impl LoadRunner {
    pub fn new(config: TestConfig) -> Self {
        Self {
            config,
            results_dir: default_results_dir(),
            show_progress: true,
        }
    }

    /// Directory that receives the JSONL request log.
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run the load test.
    ///
    /// Only setup problems are returned as errors; failed requests end up in
    /// the results.
    pub async fn run(&self) -> anyhow::Result<TestResults> {
        let config = &self.config;
        config.validate()?;
        let profiles = config.user_profiles()?;
        let factory = HttpUserFactory::new(config, profiles);
        factory.probe()?;

        println!("Starting load test: {}", config.name);
        println!("  Target: {}", config.base_url);
        println!("  Users: {} (ramp {}s)", config.concurrency, config.ramp_secs);
        println!("  Test duration: {}s", config.duration_secs);
        for profile in &config.profiles {
            println!(
                "  Profile {}: weight {}, pacing {}-{}ms, {} tasks{}",
                profile.name,
                profile.weight,
                profile.pacing.min_ms,
                profile.pacing.max_ms,
                profile.tasks.len(),
                if profile.login { ", login" } else { "" }
            );
        }

        let log = if config.log_requests {
            let log = RequestLog::create(&self.results_dir, &config.name)?;
            println!("  Logging requests to: {}", log.path().display());
            Some(log)
        } else {
            None
        };
        println!();

        let live = Arc::new(LiveCounters::default());
        let (tx, rx) = outcome_channel();
        let aggregator = tokio::spawn(aggregate(rx, log, Arc::clone(&live)));

        let scheduler = Scheduler::new(factory, config.drain_timeout());
        let shutdown = scheduler.shutdown_handle();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping users");
                shutdown.shutdown();
            }
        });

        let pb = if self.show_progress {
            ProgressBar::new(config.duration_secs)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s {msg}")
                .context("invalid progress bar template")?
                .progress_chars("##-"),
        );
        let ticker = {
            let pb = pb.clone();
            let live = Arc::clone(&live);
            let duration_secs = config.duration_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                let mut elapsed = 0u64;
                loop {
                    interval.tick().await;
                    pb.set_position(elapsed.min(duration_secs));
                    pb.set_message(format!(
                        "{} requests, {} failed",
                        live.requests.load(Ordering::Relaxed),
                        live.failures.load(Ordering::Relaxed)
                    ));
                    elapsed += 1;
                }
            })
        };

        let plan = RunPlan::new(config.concurrency, config.ramp(), config.duration());
        let summary = scheduler.run(plan, tx).await;
        ctrl_c.abort();
        ticker.abort();
        let summary = summary?;

        pb.set_position(config.duration_secs);
        pb.finish_with_message("Complete!");
        println!();

        let metrics = aggregator.await.context("outcome aggregator failed")?;
        info!(
            run_id = %summary.run_id,
            requests = metrics.total_requests(),
            failed = metrics.failed_requests(),
            abandoned = summary.abandoned,
            "Load test complete"
        );
        Ok(metrics.results(&config.name, &config.base_url, &summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;
    use crate::outcome::OutcomeKind;
    use chrono::Utc;

    #[test]
    fn test_factory_assigns_profiles_by_weight() {
        let mut config = TestConfig::parking_default("http://localhost:5173");
        let mut stress = ProfileConfig::stress();
        stress.weight = 1;
        config.profiles[0].weight = 3;
        config.profiles.push(stress);

        let factory = HttpUserFactory::new(&config, config.user_profiles().unwrap());
        let stress_users = (0..8)
            .filter(|&id| factory.profile_for(id).name == "stress")
            .count();
        assert_eq!(stress_users, 2);
        assert!(!factory.profile_for(1).login);
        assert!(factory.profile_for(2).login);
    }

    #[test]
    fn test_factory_accepts_max_profile_weight() {
        let mut config = TestConfig::parking_default("http://localhost:5173");
        config.profiles[0].weight = u32::MAX;
        config.profiles.push(ProfileConfig::stress());
        config.validate().unwrap();

        let factory = HttpUserFactory::new(&config, config.user_profiles().unwrap());
        let normal = (0..100)
            .filter(|&id| factory.profile_for(id).name == "normal")
            .count();
        assert!(normal >= 99);
    }

    #[tokio::test]
    async fn test_create_user_builds_http_session() {
        let config = TestConfig::parking_default("http://127.0.0.1:9");
        let factory = HttpUserFactory::new(&config, config.user_profiles().unwrap());
        factory.probe().unwrap();
        let (tx, _rx) = outcome_channel();
        let user = factory.create_user(3, tx).unwrap();
        assert_eq!(user.id(), 3);
    }

    #[tokio::test]
    async fn test_aggregate_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let log = RequestLog::create(dir.path(), "Parking Smoke").unwrap();
        let path = log.path().to_path_buf();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("parking_smoke_"));

        let (tx, rx) = outcome_channel();
        for status in [200, 500] {
            tx.send(RequestOutcome {
                user_id: 1,
                task: "view_history".into(),
                method: "GET".into(),
                path: "/api/history".into(),
                kind: OutcomeKind::Status(status),
                elapsed: Duration::from_millis(12),
                timestamp: Utc::now(),
            })
            .unwrap();
        }
        drop(tx);

        let live = Arc::new(LiveCounters::default());
        let metrics = aggregate(rx, Some(log), Arc::clone(&live)).await;
        assert_eq!(metrics.total_requests(), 2);
        assert_eq!(live.failures.load(Ordering::Relaxed), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["task"], "view_history");
        assert_eq!(lines[1]["kind"]["detail"], 500);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_running() {
        let mut config = TestConfig::parking_default("http://localhost:5173");
        config.profiles[0].tasks.clear();
        let err = LoadRunner::new(config)
            .with_progress(false)
            .run()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("task registry is empty"), "{err}");
    }
}
