//! User population scheduler.
//!
//! Spawns virtual users on a linear ramp, lets them run for the test
//! duration, then stops them all and drains against one shared deadline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{SetupError, SetupResult};
use crate::outcome::OutcomeSender;
use crate::session::AuthStatus;
use crate::user::{stop_pair, StopSignal, UserHandle, UserId, UserSummary, VirtualUser};

/// Creates the `index`-th user of a run.
pub trait UserFactory: Send + Sync {
    fn create_user(&self, id: UserId, outcomes: OutcomeSender) -> SetupResult<VirtualUser>;
}

impl<F> UserFactory for F
where
    F: Fn(UserId, OutcomeSender) -> SetupResult<VirtualUser> + Send + Sync,
{
    fn create_user(&self, id: UserId, outcomes: OutcomeSender) -> SetupResult<VirtualUser> {
        self(id, outcomes)
    }
}

/// Population shape for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunPlan {
    pub target: u32,
    pub ramp: Duration,
    pub duration: Duration,
}

impl RunPlan {
    pub fn new(target: u32, ramp: Duration, duration: Duration) -> Self {
        Self {
            target,
            ramp,
            duration,
        }
    }

    fn validate(&self) -> SetupResult<()> {
        if self.target == 0 {
            return Err(SetupError::InvalidConcurrency);
        }
        if self.duration.is_zero() {
            return Err(SetupError::InvalidDuration(
                "test duration must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Offset of the `index`-th spawn from the start of the run.
    pub fn spawn_offset(&self, index: u32) -> Duration {
        let nanos = self.ramp.as_nanos() * u128::from(index) / u128::from(self.target.max(1));
        Duration::from_nanos(nanos as u64)
    }
}

/// External stop for a running [`Scheduler`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Stop the current run early. Users drain as if the duration had elapsed.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Result of one scheduler run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub target: u32,
    /// Offset from run start at which each user was spawned.
    #[serde(skip)]
    pub spawn_offsets: Vec<Duration>,
    pub spawn_failures: usize,
    pub peak_active: usize,
    pub users: Vec<UserSummary>,
    /// Users still running at the drain deadline.
    pub abandoned: usize,
    /// Users whose task panicked.
    pub crashed: usize,
    pub stopped_early: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn spawned(&self) -> usize {
        self.spawn_offsets.len()
    }

    pub fn total_iterations(&self) -> u64 {
        self.users.iter().map(|u| u.iterations).sum()
    }

    pub fn total_requests(&self) -> u64 {
        self.users.iter().map(|u| u.requests).sum()
    }

    pub fn count_auth(&self, status: AuthStatus) -> usize {
        self.users.iter().filter(|u| u.auth == status).count()
    }
}

/// Tracks how many users are alive right now and the highest value seen.
#[derive(Debug, Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }
}

/// Decrements on drop, including when the task is aborted.
struct GaugeGuard(Arc<Gauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs user populations built by a [`UserFactory`].
pub struct Scheduler<F> {
    factory: F,
    drain_timeout: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<F: UserFactory> Scheduler<F> {
    pub fn new(factory: F, drain_timeout: Duration) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            factory,
            drain_timeout,
            shutdown: Arc::new(tx),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// Run one population to completion.
    ///
    /// Every call is independent: a fresh run id, fresh users, fresh
    /// counters. A shutdown requested before the call is discarded.
    pub async fn run(&self, plan: RunPlan, outcomes: OutcomeSender) -> SetupResult<RunSummary> {
        plan.validate()?;
        self.shutdown.send_replace(false);
        let mut shutdown = StopSignal::new(self.shutdown.subscribe());

        let run_id = Uuid::new_v4();
        let start = Instant::now();
        let deadline = start + plan.duration;
        let gauge = Arc::new(Gauge::default());

        info!(
            %run_id,
            target = plan.target,
            ramp_secs = plan.ramp.as_secs_f64(),
            duration_secs = plan.duration.as_secs_f64(),
            "Starting population"
        );

        let mut handles: Vec<UserHandle> = Vec::with_capacity(plan.target as usize);
        let mut spawn_offsets = Vec::with_capacity(plan.target as usize);
        let mut spawn_failures = 0;
        let mut stopped_early = false;

        for index in 0..plan.target {
            let at = start + plan.spawn_offset(index);
            if at >= deadline {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(at) => {}
                _ = shutdown.stopped() => {
                    stopped_early = true;
                    break;
                }
            }

            let id = UserId::from(index);
            match self.factory.create_user(id, outcomes.clone()) {
                Ok(user) => {
                    let (stop, signal) = stop_pair();
                    let guard = gauge.enter();
                    let join = tokio::spawn(async move {
                        let _guard = guard;
                        user.run(signal).await
                    });
                    handles.push(UserHandle::new(id, stop, join));
                    spawn_offsets.push(start.elapsed());
                }
                Err(e) => {
                    warn!(user_id = id, error = %e, "Failed to create user");
                    spawn_failures += 1;
                }
            }
        }
        // Users hold the remaining senders; the stream closes when they finish.
        drop(outcomes);
        info!(%run_id, spawned = handles.len(), "Ramp complete");

        if !stopped_early {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = shutdown.stopped() => stopped_early = true,
            }
        }
        if stopped_early {
            info!(%run_id, "Stop requested, draining users");
        }

        for handle in &handles {
            handle.stop();
        }

        let drain_deadline = Instant::now() + self.drain_timeout;
        let mut users = Vec::with_capacity(handles.len());
        let mut abandoned = 0;
        let mut crashed = 0;
        for mut handle in handles {
            match tokio::time::timeout_at(drain_deadline, &mut handle.join).await {
                Ok(Ok(summary)) => users.push(summary),
                Ok(Err(e)) => {
                    warn!(user_id = handle.id, error = %e, "User task failed");
                    crashed += 1;
                }
                Err(_) => {
                    handle.join.abort();
                    abandoned += 1;
                }
            }
        }
        if abandoned > 0 {
            info!(%run_id, abandoned, "Drain deadline exceeded, users abandoned");
        }

        let summary = RunSummary {
            run_id,
            target: plan.target,
            spawn_offsets,
            spawn_failures,
            peak_active: gauge.peak.load(Ordering::SeqCst),
            users,
            abandoned,
            crashed,
            stopped_early,
            elapsed: start.elapsed(),
        };
        info!(
            %run_id,
            users = summary.users.len(),
            iterations = summary.total_iterations(),
            requests = summary.total_requests(),
            "Population finished"
        );
        Ok(summary)
    }
}
