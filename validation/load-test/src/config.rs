//! Configuration loading and management.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{SetupError, SetupResult};
use crate::pacing::{Pacing, PacingBounds};
use crate::parking;
use crate::session::Credentials;
use crate::user::UserProfile;

/// Main test configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    /// Target number of simultaneously active virtual users
    pub concurrency: u32,
    /// Users are spawned evenly over this many seconds
    #[serde(default)]
    pub ramp_secs: u64,
    pub duration_secs: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long to wait for users to finish their iteration at shutdown
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default)]
    pub seed: Option<u64>, // Optional RNG seed for reproducible tests
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default = "default_profiles")]
    pub profiles: Vec<ProfileConfig>,
    #[serde(default)]
    pub log_requests: bool, // Log all outcomes to a JSONL file
}

/// One kind of virtual user and its share of the population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub pacing: PacingBounds,
    pub tasks: Vec<TaskWeight>,
    /// Log in once before the task loop
    #[serde(default = "default_login")]
    pub login: bool,
}

/// Entry of a task weight table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWeight {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl TaskWeight {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_login() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_profiles() -> Vec<ProfileConfig> {
    vec![ProfileConfig::normal()]
}

impl ProfileConfig {
    /// Browsing user: logs in, 1-3s think time, the full task mix.
    pub fn normal() -> Self {
        Self {
            name: "normal".to_string(),
            weight: 1,
            pacing: Pacing::normal().into(),
            tasks: parking::default_normal_tasks(),
            login: true,
        }
    }

    /// Stress user: no login, 0.5-1s pacing, batches of park requests.
    pub fn stress() -> Self {
        Self {
            name: "stress".to_string(),
            weight: 1,
            pacing: Pacing::stress().into(),
            tasks: parking::default_stress_tasks(),
            login: false,
        }
    }

    fn to_profile(&self) -> SetupResult<UserProfile> {
        let pacing = self.pacing.to_pacing(&self.name)?;
        let registry = parking::build_registry(&self.tasks)?;
        Ok(UserProfile {
            name: self.name.clone(),
            weight: self.weight,
            pacing,
            registry: Arc::new(registry),
            login: self.login,
        })
    }
}

impl TestConfig {
    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Built-in browsing scenario against `base_url`.
    pub fn parking_default(base_url: impl Into<String>) -> Self {
        Self {
            name: "parking-default".to_string(),
            description: "Browsing users with the default task mix".to_string(),
            base_url: base_url.into(),
            concurrency: 10,
            ramp_secs: 5,
            duration_secs: 30,
            request_timeout_ms: default_request_timeout_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
            seed: None,
            credentials: Credentials::default(),
            profiles: default_profiles(),
            log_requests: false,
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> SetupResult<()> {
        if self.concurrency == 0 {
            return Err(SetupError::InvalidConcurrency);
        }
        if self.duration_secs == 0 {
            return Err(SetupError::InvalidDuration(
                "duration_secs must be > 0".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(SetupError::InvalidDuration(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }
        reqwest::Url::parse(&self.base_url).map_err(|e| SetupError::InvalidBaseUrl {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;
        self.user_profiles().map(|_| ())
    }

    /// Resolve the active profiles into runtime form.
    ///
    /// Profiles with weight 0 are skipped; if none remain this is a setup
    /// error.
    pub fn user_profiles(&self) -> SetupResult<Vec<UserProfile>> {
        let profiles = self
            .profiles
            .iter()
            .filter(|p| p.weight > 0)
            .map(ProfileConfig::to_profile)
            .collect::<SetupResult<Vec<_>>>()?;
        if profiles.is_empty() {
            return Err(SetupError::NoProfiles);
        }
        Ok(profiles)
    }

    pub fn ramp(&self) -> Duration {
        Duration::from_secs(self.ramp_secs)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
