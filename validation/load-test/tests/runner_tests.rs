//! End-to-end runs against the stub parking server.

use load_test::pacing::PacingBounds;
use load_test::{LoadRunner, ProfileConfig, ResultsReport, TaskWeight, TestConfig};
use test_utils::StubParkingServer;

fn fast_config(base_url: String) -> TestConfig {
    let mut config = TestConfig::parking_default(base_url);
    config.name = "stub run".to_string();
    config.concurrency = 4;
    config.ramp_secs = 0;
    config.duration_secs = 2;
    config.drain_timeout_secs = 5;
    config.request_timeout_ms = 2_000;
    config.seed = Some(42);
    config.profiles[0].pacing = PacingBounds {
        min_ms: 50,
        max_ms: 100,
    };
    config
}

// ============================================================================
// Browsing population
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_normal_population_logs_in_and_browses() {
    let server = StubParkingServer::start().await.unwrap();
    let config = fast_config(server.base_url());

    let results = LoadRunner::new(config).with_progress(false).run().await.unwrap();

    assert_eq!(results.users_spawned, 4);
    assert_eq!(results.users_authenticated, 4);
    assert_eq!(results.users_abandoned, 0);
    assert!(results.peak_concurrency <= 4);
    assert!(results.total_requests > 20, "{}", results.total_requests);
    assert_eq!(results.failed_requests, 0, "{:?}", results.failure_reasons);
    assert_eq!(server.hits("/api/login"), 4);
    // login is not a task outcome
    assert_eq!(results.total_requests + 4, server.total_hits());

    // heaviest task shows up most
    let dashboard = results
        .tasks
        .iter()
        .find(|t| t.name == "view_dashboard")
        .unwrap();
    assert!(results.tasks.iter().all(|t| t.requests <= dashboard.requests * 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rejected_logins_still_generate_load() {
    let server = StubParkingServer::start().await.unwrap();
    let mut config = fast_config(server.base_url());
    config.credentials.password = test_utils::BAD_PASSWORD.to_string();

    let results = LoadRunner::new(config).with_progress(false).run().await.unwrap();

    assert_eq!(results.users_auth_failed, 4);
    assert!(results.total_requests > 0);
    assert_eq!(results.successful_requests, 0);
    assert_eq!(
        results.failure_reasons.get("HTTP 401").copied(),
        Some(results.total_requests)
    );
}

// ============================================================================
// Mixed and stress populations
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_population_follows_profile_weights() {
    let server = StubParkingServer::start().await.unwrap();
    let mut config = fast_config(server.base_url());
    let mut stress = ProfileConfig::stress();
    stress.pacing = PacingBounds {
        min_ms: 50,
        max_ms: 100,
    };
    config.profiles[0].weight = 3;
    config.profiles.push(stress);

    let results = LoadRunner::new(config).with_progress(false).run().await.unwrap();

    // 3:1 over four users: one stress user, which never logs in
    assert_eq!(server.hits("/api/login"), 3);
    assert_eq!(results.users_authenticated, 3);
    let rapid = results
        .tasks
        .iter()
        .find(|t| t.name == "rapid_parking_operations")
        .unwrap();
    assert_eq!(rapid.requests % 5, 0);
    // stress user is not logged in, so every batch request is refused
    assert_eq!(rapid.failures, rapid.requests);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreachable_host_is_not_a_setup_error() {
    let mut config = fast_config("http://127.0.0.1:9".to_string());
    config.concurrency = 2;
    config.duration_secs = 1;
    config.profiles[0].tasks = vec![TaskWeight::new("view_history", 1)];

    let results = LoadRunner::new(config).with_progress(false).run().await.unwrap();
    assert_eq!(results.successful_requests, 0);
    assert_eq!(results.users_auth_failed, 2);
    assert_eq!(
        results.transport_errors + results.timeouts,
        results.total_requests
    );
    assert!(!ResultsReport::format_table(&results).is_empty());
}

#[tokio::test]
async fn test_request_log_is_written() {
    let server = StubParkingServer::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(server.base_url());
    config.concurrency = 1;
    config.duration_secs = 1;
    config.log_requests = true;

    let results = LoadRunner::new(config)
        .with_progress(false)
        .with_results_dir(dir.path())
        .run()
        .await
        .unwrap();

    let entry = std::fs::read_dir(dir.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert!(entry.file_name().to_string_lossy().starts_with("stub_run_"));
    let lines = std::fs::read_to_string(entry.path()).unwrap().lines().count();
    assert_eq!(lines as u64, results.total_requests);
}
