//! Per-user HTTP session against the parking API.
//!
//! A [`SessionClient`] owns one simulated user's network identity. The
//! production implementation, [`HttpSession`], gives every user its own
//! `reqwest::Client` so cookie jars never leak between users.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SetupError, SetupResult};
use crate::outcome::{OutcomeKind, RequestOutcome};
use crate::user::UserId;

pub const LOGIN_PATH: &str = "/api/login";

/// One HTTP call a task wants to make.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    /// POST without a body.
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: None,
        }
    }

    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: serde_json::to_value(body).ok(),
        }
    }
}

/// Login credentials sent to `POST /api/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("admin@parking.com", "admin123")
    }
}

/// Authentication status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Unauthenticated,
    Authenticated,
    Failed,
}

/// Result of a single login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated,
    /// The server answered with a non-2xx status.
    Rejected { status: u16 },
    /// The login request never got an answer.
    Failed { reason: String },
}

impl AuthResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthResult::Authenticated)
    }

    /// Session status after this result.
    pub fn status(&self) -> AuthStatus {
        match self {
            AuthResult::Authenticated => AuthStatus::Authenticated,
            AuthResult::Rejected { .. } | AuthResult::Failed { .. } => AuthStatus::Failed,
        }
    }
}

/// Identity and authentication state held by one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub identity: Option<String>,
    pub status: AuthStatus,
    pub token: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            status: AuthStatus::Unauthenticated,
            token: None,
        }
    }
}

/// Network identity of one virtual user.
///
/// Neither method returns an error: rejected logins and failed requests are
/// data, reported through [`AuthResult`] and [`RequestOutcome`].
#[async_trait]
pub trait SessionClient: Send {
    async fn authenticate(&mut self, credentials: &Credentials) -> AuthResult;

    async fn execute(&mut self, task: &str, request: &ApiRequest) -> RequestOutcome;

    fn auth_status(&self) -> AuthStatus;
}

/// [`SessionClient`] speaking HTTP through a cookie-enabled reqwest client.
pub struct HttpSession {
    user_id: UserId,
    client: Client,
    base_url: String,
    state: SessionState,
}

impl HttpSession {
    /// Create a session with its own cookie jar and a per-request timeout.
    pub fn new(user_id: UserId, base_url: &str, request_timeout: Duration) -> SetupResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| SetupError::ClientBuild(e.to_string()))?;

        Ok(Self {
            user_id,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            state: SessionState::default(),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SessionClient for HttpSession {
    async fn authenticate(&mut self, credentials: &Credentials) -> AuthResult {
        self.state.identity = Some(credentials.email.clone());

        let result = match self
            .client
            .post(self.url(LOGIN_PATH))
            .json(credentials)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                // Cookies are already in the jar; a token is optional.
                let body: Option<serde_json::Value> = response.json().await.ok();
                self.state.token = body
                    .as_ref()
                    .and_then(|v| v.get("token"))
                    .and_then(|t| t.as_str())
                    .map(str::to_string);
                AuthResult::Authenticated
            }
            Ok(response) => AuthResult::Rejected {
                status: response.status().as_u16(),
            },
            Err(e) => AuthResult::Failed {
                reason: e.to_string(),
            },
        };

        self.state.status = result.status();
        match &result {
            AuthResult::Authenticated => {
                info!(user_id = self.user_id, email = %credentials.email, "Login successful")
            }
            AuthResult::Rejected { status } => {
                warn!(user_id = self.user_id, email = %credentials.email, status, "Login rejected")
            }
            AuthResult::Failed { reason } => {
                warn!(user_id = self.user_id, email = %credentials.email, %reason, "Login failed")
            }
        }
        result
    }

    async fn execute(&mut self, task: &str, request: &ApiRequest) -> RequestOutcome {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path));
        if let Some(token) = &self.state.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let timestamp = Utc::now();
        let start = Instant::now();
        let kind = match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // a truncated body is not an answer
                match response.bytes().await {
                    Ok(_) => OutcomeKind::Status(status),
                    Err(e) => classify_error(&e),
                }
            }
            Err(e) => classify_error(&e),
        };
        let elapsed = start.elapsed();

        if !kind.is_success() {
            debug!(user_id = self.user_id, task, path = %request.path, outcome = %kind, "Request failed");
        }

        RequestOutcome {
            user_id: self.user_id,
            task: task.to_string(),
            method: request.method.to_string(),
            path: request.path.clone(),
            kind,
            elapsed,
            timestamp,
        }
    }

    fn auth_status(&self) -> AuthStatus {
        self.state.status
    }
}

fn classify_error(err: &reqwest::Error) -> OutcomeKind {
    if err.is_timeout() {
        OutcomeKind::Timeout
    } else {
        OutcomeKind::Transport(err.to_string())
    }
}
