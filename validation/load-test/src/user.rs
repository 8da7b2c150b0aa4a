//! Virtual users.
//!
//! A [`VirtualUser`] authenticates once, then loops: draw a task, send its
//! requests through the session, report every outcome, wait. Stopping is
//! cooperative and only observed between tasks and during the pacing wait,
//! so an in-flight request always completes.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::outcome::OutcomeSender;
use crate::pacing::Pacing;
use crate::session::{AuthStatus, Credentials, SessionClient};
use crate::tasks::TaskRegistry;

/// Identifier unique within one run.
pub type UserId = u64;

/// Lifecycle of a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    Created,
    Authenticating,
    Authenticated,
    Unauthenticated,
    Looping,
    Stopped,
}

/// Runtime form of a configured profile.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub name: String,
    pub weight: u32,
    pub pacing: Pacing,
    pub registry: Arc<TaskRegistry>,
    pub login: bool,
}

/// Deterministic assignment of profiles to spawn indices.
///
/// Weights are reduced by their gcd into a cycle of `total` slots. Spawn
/// index `i` lands on slot `(i * stride) % total`, with `stride` coprime to
/// `total` and close to `total / φ`, and the slot maps to a profile through
/// the cumulative weights. Every full cycle matches the weights exactly and
/// weights 3:1 interleave as `a b a a | a b a a | ...`. Nothing is
/// materialized, so any `u32` weights are fine.
#[derive(Debug, Clone)]
pub struct ProfileMix {
    cumulative: Vec<u64>,
    total: u64,
    stride: u64,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl ProfileMix {
    pub fn new(weights: &[u32]) -> Self {
        let divisor = weights
            .iter()
            .fold(0, |acc, &w| gcd(acc, u64::from(w)))
            .max(1);

        let mut total = 0u64;
        let cumulative = weights
            .iter()
            .map(|&w| {
                total += u64::from(w) / divisor;
                total
            })
            .collect();

        let ideal = ((total as f64 * 0.618_033_988_75).round() as u64).clamp(1, total.max(1));
        // nearest coprime; 1 always qualifies
        let stride = (0..=ideal)
            .flat_map(|offset| [ideal + offset, ideal - offset])
            .find(|&s| s >= 1 && s <= total.max(1) && gcd(s, total) == 1)
            .unwrap_or(1);

        Self {
            cumulative,
            total,
            stride,
        }
    }

    /// Profile index for the `index`-th spawned user.
    pub fn profile_for(&self, index: u64) -> usize {
        if self.total == 0 {
            return 0;
        }
        let position = u128::from(index % self.total);
        let slot = (position * u128::from(self.stride) % u128::from(self.total)) as u64;
        self.cumulative.partition_point(|&c| c <= slot)
    }
}

/// Per-user random source. Seeded runs derive one stream per user id.
pub fn user_rng(seed: Option<u64>, id: UserId) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ id.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_entropy(),
    }
}

/// Sending side of a stop signal.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving side of a stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop was requested.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            // sender dropped without stopping: never resolves
            std::future::pending::<()>().await;
        }
    }
}

pub fn stop_pair() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal::new(rx))
}

/// What a user did before it stopped.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub profile: String,
    pub iterations: u64,
    pub requests: u64,
    pub auth: AuthStatus,
    pub final_state: UserState,
}

/// Handle on a spawned user.
pub struct UserHandle {
    pub id: UserId,
    pub(crate) stop: StopHandle,
    pub(crate) join: JoinHandle<UserSummary>,
}

impl UserHandle {
    pub fn new(id: UserId, stop: StopHandle, join: JoinHandle<UserSummary>) -> Self {
        Self { id, stop, join }
    }

    /// Request a cooperative stop; the user finishes its current task first.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> Result<UserSummary, tokio::task::JoinError> {
        self.join.await
    }
}

/// One simulated user.
pub struct VirtualUser {
    id: UserId,
    profile: String,
    session: Box<dyn SessionClient>,
    registry: Arc<TaskRegistry>,
    pacing: Pacing,
    credentials: Option<Credentials>,
    rng: StdRng,
    outcomes: OutcomeSender,
    state: UserState,
}

impl VirtualUser {
    /// `credentials` is ignored for profiles that skip login.
    pub fn new(
        id: UserId,
        profile: &UserProfile,
        session: Box<dyn SessionClient>,
        credentials: Credentials,
        rng: StdRng,
        outcomes: OutcomeSender,
    ) -> Self {
        Self {
            id,
            profile: profile.name.clone(),
            session,
            registry: Arc::clone(&profile.registry),
            pacing: profile.pacing,
            credentials: profile.login.then_some(credentials),
            rng,
            outcomes,
            state: UserState::Created,
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn state(&self) -> UserState {
        self.state
    }

    /// Spawn onto the runtime with a fresh stop signal.
    pub fn start(self) -> UserHandle {
        let (stop, signal) = stop_pair();
        let id = self.id;
        let join = tokio::spawn(self.run(signal));
        UserHandle::new(id, stop, join)
    }

    /// Run until `stop` fires.
    pub async fn run(mut self, mut stop: StopSignal) -> UserSummary {
        if let Some(credentials) = self.credentials.take() {
            self.state = UserState::Authenticating;
            let result = self.session.authenticate(&credentials).await;
            self.state = if result.is_authenticated() {
                UserState::Authenticated
            } else {
                UserState::Unauthenticated
            };
        } else {
            self.state = UserState::Unauthenticated;
        }
        debug!(user_id = self.id, profile = %self.profile, state = ?self.state, "User ready");

        self.state = UserState::Looping;
        let registry = Arc::clone(&self.registry);
        let mut iterations = 0u64;
        let mut requests = 0u64;

        while !stop.is_stopped() {
            let task = registry.draw(&mut self.rng);
            for request in task.requests(&mut self.rng) {
                let outcome = self.session.execute(&task.name, &request).await;
                requests += 1;
                // Receiver gone means nobody aggregates any more; keep looping.
                let _ = self.outcomes.send(outcome);
            }
            iterations += 1;

            let wait = self.pacing.next_wait(&mut self.rng);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop.stopped() => break,
            }
        }

        self.state = UserState::Stopped;
        info!(
            user_id = self.id,
            profile = %self.profile,
            iterations,
            requests,
            "User stopped"
        );

        UserSummary {
            id: self.id,
            profile: self.profile,
            iterations,
            requests,
            auth: self.session.auth_status(),
            final_state: self.state,
        }
    }
}
