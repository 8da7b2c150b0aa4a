//! Load testing framework for the parking management web app.
//!
//! This crate provides tools to:
//! - Simulate a population of virtual users, each with its own session
//! - Pick parking operations by weight and pace them with think time
//! - Ramp users up linearly and drain them against a deadline
//! - Collect detailed performance metrics
//! - Output results in multiple formats (console, JSON, CSV)

pub mod config;
pub mod error;
pub mod metrics;
pub mod outcome;
pub mod pacing;
pub mod parking;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod tasks;
pub mod user;

pub use config::{ProfileConfig, TaskWeight, TestConfig};
pub use error::{SetupError, SetupResult};
pub use metrics::{MetricsCollector, TestResults};
pub use outcome::{outcome_channel, OutcomeKind, RequestOutcome};
pub use pacing::Pacing;
pub use report::ResultsReport;
pub use runner::{HttpUserFactory, LoadRunner};
pub use scheduler::{RunPlan, RunSummary, Scheduler, ShutdownHandle, UserFactory};
pub use session::{ApiRequest, AuthResult, AuthStatus, Credentials, HttpSession, SessionClient};
pub use tasks::{TaskDefinition, TaskRegistry};
pub use user::{UserId, UserProfile, UserState, UserSummary, VirtualUser};
