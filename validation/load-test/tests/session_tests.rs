//! Tests for HttpSession against the stub parking server.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use load_test::{ApiRequest, AuthResult, AuthStatus, Credentials, HttpSession, OutcomeKind, SessionClient};
use test_utils::{StubParkingServer, ADMIN_EMAIL, BAD_PASSWORD};

fn session(server: &StubParkingServer, id: u64) -> HttpSession {
    HttpSession::new(id, &server.base_url(), Duration::from_secs(5)).unwrap()
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_login_with_admin_credentials() {
    let server = StubParkingServer::start().await.unwrap();
    let mut s = session(&server, 1);

    let result = s.authenticate(&Credentials::default()).await;
    assert_eq!(result, AuthResult::Authenticated);
    assert_eq!(s.auth_status(), AuthStatus::Authenticated);
    assert_eq!(s.state().identity.as_deref(), Some(ADMIN_EMAIL));
    assert_eq!(server.hits("/api/login"), 1);
}

#[tokio::test]
async fn test_session_cookie_is_sent_on_later_requests() {
    let server = StubParkingServer::start().await.unwrap();
    let mut s = session(&server, 1);
    s.authenticate(&Credentials::default()).await;

    let outcome = s.execute("view_history", &ApiRequest::get("/api/history")).await;
    assert_eq!(outcome.kind, OutcomeKind::Status(200));
    assert_eq!(outcome.task, "view_history");
    assert_eq!(outcome.user_id, 1);
}

#[tokio::test]
async fn test_rejected_login_does_not_stop_requests() {
    let server = StubParkingServer::start().await.unwrap();
    let mut s = session(&server, 2);

    let result = s
        .authenticate(&Credentials::new(ADMIN_EMAIL, BAD_PASSWORD))
        .await;
    assert_eq!(result, AuthResult::Rejected { status: 401 });
    assert_eq!(s.auth_status(), AuthStatus::Failed);

    // later executes still complete and report what the server said
    for _ in 0..3 {
        let outcome = s.execute("view_dashboard", &ApiRequest::get("/dashboard")).await;
        assert_eq!(outcome.kind, OutcomeKind::Status(401));
    }
    assert_eq!(server.hits("/dashboard"), 3);
}

#[tokio::test]
async fn test_cookie_jars_are_per_session() {
    let server = StubParkingServer::start().await.unwrap();
    let mut logged_in = session(&server, 1);
    let mut anonymous = session(&server, 2);
    logged_in.authenticate(&Credentials::default()).await;

    let a = logged_in.execute("view_history", &ApiRequest::get("/api/history")).await;
    let b = anonymous.execute("view_history", &ApiRequest::get("/api/history")).await;
    assert!(a.is_success());
    assert_eq!(b.kind, OutcomeKind::Status(401));
}

// ============================================================================
// Request outcomes
// ============================================================================

#[tokio::test]
async fn test_park_request_body_is_accepted() {
    let server = StubParkingServer::start().await.unwrap();
    let mut s = session(&server, 3);
    s.authenticate(&Credentials::default()).await;

    let mut rng = StdRng::seed_from_u64(3);
    for request in load_test::parking::park_vehicle(&mut rng) {
        let outcome = s.execute("park_vehicle", &request).await;
        assert!(outcome.is_success(), "{:?}", outcome.kind);
    }
    let theme = s.execute("switch_theme", &ApiRequest::post("/api/theme")).await;
    assert!(theme.is_success());
}

#[tokio::test]
async fn test_slow_server_is_reported_as_timeout() {
    let server = StubParkingServer::with_latency(Duration::from_secs(2)).await.unwrap();
    let mut s = HttpSession::new(4, &server.base_url(), Duration::from_millis(200)).unwrap();

    let outcome = s.execute("view_history", &ApiRequest::get("/api/history")).await;
    assert_eq!(outcome.kind, OutcomeKind::Timeout);
    assert!(outcome.elapsed < Duration::from_secs(2));
}

#[tokio::test]
async fn test_unknown_path_is_a_status_not_an_error() {
    let server = StubParkingServer::start().await.unwrap();
    let mut s = session(&server, 5);
    let outcome = s.execute("custom", &ApiRequest::get("/api/nope")).await;
    assert_eq!(outcome.kind, OutcomeKind::Status(404));
}

#[tokio::test]
async fn test_truncated_body_is_a_transport_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        // promise 1000 bytes, send 5, hang up
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\nshort")
            .await;
        let _ = socket.shutdown().await;
    });

    let mut s = HttpSession::new(6, &format!("http://{}", addr), Duration::from_secs(5)).unwrap();
    let outcome = s.execute("view_history", &ApiRequest::get("/api/history")).await;
    assert!(matches!(outcome.kind, OutcomeKind::Transport(_)), "{:?}", outcome.kind);
    assert!(!outcome.is_success());
}
