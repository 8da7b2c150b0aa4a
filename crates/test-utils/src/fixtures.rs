//! Common test fixtures for load-test tests.

/// Account the stub server (and the real app's seed data) accepts.
pub const ADMIN_EMAIL: &str = "admin@parking.com";
pub const ADMIN_PASSWORD: &str = "admin123";

/// Credentials the stub server rejects with 401.
pub const BAD_PASSWORD: &str = "wrong-password";

/// Six-task weight table used by the sampling tests.
pub const WEIGHTED_SCENARIO: [(&str, u32); 6] = [
    ("A", 3),
    ("B", 2),
    ("C", 1),
    ("D", 1),
    ("E", 2),
    ("F", 1),
];

/// Expected count of each entry of `table` after `draws` draws.
pub fn expected_counts(table: &[(&str, u32)], draws: usize) -> Vec<f64> {
    let total: u32 = table.iter().map(|(_, w)| w).sum();
    table
        .iter()
        .map(|(_, w)| draws as f64 * f64::from(*w) / f64::from(total))
        .collect()
}
