//! In-process stub of the parking API.
//!
//! Accepts the admin credentials on `POST /api/login` and hands out a session
//! cookie. Every other endpoint answers 401 without that cookie. Hits are
//! counted per path (query string excluded) so tests can assert on traffic.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Extension, Json, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::fixtures::{ADMIN_EMAIL, ADMIN_PASSWORD};

const SESSION_COOKIE: &str = "parking_session";

struct StubState {
    latency: Duration,
    hits: Mutex<HashMap<String, u64>>,
    sessions: Mutex<HashSet<String>>,
    next_session: AtomicU64,
}

impl StubState {
    async fn enter(&self, path: &str) {
        if let Ok(mut hits) = self.hits.lock() {
            *hits.entry(path.to_string()).or_insert(0) += 1;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Ok(sessions) = self.sessions.lock() else {
            return false;
        };
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == SESSION_COOKIE && sessions.contains(value))
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Not authenticated" })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SpotsQuery {
    floor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParkBody {
    spot_id: String,
    license_plate: String,
    #[serde(rename = "type")]
    vehicle_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExitBody {
    spot_id: String,
}

/// POST /api/login
async fn login_handler(
    Extension(state): Extension<Arc<StubState>>,
    Json(body): Json<LoginBody>,
) -> Response {
    state.enter("/api/login").await;
    if body.email != ADMIN_EMAIL || body.password != ADMIN_PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid credentials" })),
        )
            .into_response();
    }

    let token = format!("s{}", state.next_session.fetch_add(1, Ordering::SeqCst));
    if let Ok(mut sessions) = state.sessions.lock() {
        sessions.insert(token.clone());
    }
    debug!(email = %body.email, "Stub login accepted");
    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, token),
        )],
        Json(json!({ "success": true, "user": { "email": body.email } })),
    )
        .into_response()
}

/// GET /dashboard
async fn dashboard_handler(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
) -> Response {
    state.enter("/dashboard").await;
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    Html("<html><body>Parking dashboard</body></html>").into_response()
}

/// GET /api/spots?floor=B1
async fn spots_handler(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
    Query(query): Query<SpotsQuery>,
) -> Response {
    state.enter("/api/spots").await;
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    let floor = query.floor.unwrap_or_else(|| "B1".to_string());
    if !["B1", "B2", "B3"].contains(&floor.as_str()) {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let spots: Vec<_> = (1..=15)
        .map(|n| json!({ "id": format!("{}-{:02}", floor, n), "occupied": false }))
        .collect();
    Json(json!({ "floor": floor, "spots": spots })).into_response()
}

/// POST /api/park
async fn park_handler(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<ParkBody>,
) -> Response {
    state.enter("/api/park").await;
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    if body.vehicle_type != "car" && body.vehicle_type != "bike" {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(json!({
        "success": true,
        "spotId": body.spot_id,
        "licensePlate": body.license_plate,
    }))
    .into_response()
}

/// POST /api/exit
async fn exit_handler(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<ExitBody>,
) -> Response {
    state.enter("/api/exit").await;
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "success": true, "spotId": body.spot_id })).into_response()
}

/// GET /api/history
async fn history_handler(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
) -> Response {
    state.enter("/api/history").await;
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "history": [] })).into_response()
}

/// POST /api/theme
async fn theme_handler(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
) -> Response {
    state.enter("/api/theme").await;
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "theme": "dark" })).into_response()
}

fn build_router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/api/login", post(login_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/api/spots", get(spots_handler))
        .route("/api/park", post(park_handler))
        .route("/api/exit", post(exit_handler))
        .route("/api/history", get(history_handler))
        .route("/api/theme", post(theme_handler))
        .layer(Extension(state))
}

/// Running stub server bound to an ephemeral localhost port.
///
/// The server task is aborted when this value is dropped.
pub struct StubParkingServer {
    addr: SocketAddr,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubParkingServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::with_latency(Duration::ZERO).await
    }

    /// Every request waits `latency` before it is handled.
    pub async fn with_latency(latency: Duration) -> std::io::Result<Self> {
        let state = Arc::new(StubState {
            latency,
            hits: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashSet::new()),
            next_session: AtomicU64::new(1),
        });
        let app = build_router(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Stub server failed");
            }
        });
        debug!(%addr, "Stub parking server listening");

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received on `path`, authorized or not.
    pub fn hits(&self, path: &str) -> u64 {
        self.state
            .hits
            .lock()
            .map(|h| h.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> u64 {
        self.state
            .hits
            .lock()
            .map(|h| h.values().sum())
            .unwrap_or(0)
    }

    /// Number of sessions handed out by successful logins.
    pub fn sessions_issued(&self) -> usize {
        self.state.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Drop for StubParkingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
