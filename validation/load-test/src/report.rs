//! Results reporting and formatting.

use crate::metrics::TestResults;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats test results for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as a console table.
    pub fn format_table(results: &TestResults) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Test Results: {}", results.scenario_name)]);

        table.add_row(vec!["Duration:", &format!("{:.1}s", results.duration_secs)]);
        table.add_row(vec![
            "Users:",
            &format!(
                "{} spawned / {} target (peak {})",
                results.users_spawned, results.target_concurrency, results.peak_concurrency
            ),
        ]);
        table.add_row(vec![
            "Logins:",
            &format!(
                "{} ok / {} failed",
                results.users_authenticated, results.users_auth_failed
            ),
        ]);
        if results.users_abandoned > 0 {
            table.add_row(vec![
                "Abandoned:",
                &format!("{} users past drain deadline", results.users_abandoned),
            ]);
        }
        table.add_row(vec!["Iterations:", &format!("{}", results.iterations)]);
        table.add_row(vec![
            "Total Requests:",
            &format!("{}", results.total_requests),
        ]);
        table.add_row(vec![
            "Success Rate:",
            &format!("{:.1}%", results.success_rate()),
        ]);
        table.add_row(vec![
            "Requests/sec:",
            &format!("{:.1}", results.requests_per_second),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                results.latency_p50,
                results.latency_p90,
                results.latency_p95,
                results.latency_p99,
                results.latency_max
            ),
        ]);

        if !results.failure_reasons.is_empty() {
            table.add_row(vec!["", ""]);
            for (reason, count) in &results.failure_reasons {
                table.add_row(vec![format!("Failures ({}):", reason), count.to_string()]);
            }
        }

        let mut out = table.to_string();
        if !results.tasks.is_empty() {
            out.push('\n');
            out.push_str(&Self::format_task_table(results));
        }
        out
    }

    /// Per-task breakdown.
    pub fn format_task_table(results: &TestResults) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Task", "Requests", "Failures", "p50 ms", "p95 ms", "max ms"]);
        for task in &results.tasks {
            table.add_row(vec![
                task.name.clone(),
                task.requests.to_string(),
                task.failures.to_string(),
                format!("{:.1}", task.latency_p50),
                format!("{:.1}", task.latency_p95),
                format!("{:.1}", task.latency_max),
            ]);
        }
        table.to_string()
    }

    /// Format results as JSON.
    pub fn format_json(results: &TestResults) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(results)?)
    }

    /// Format results as CSV row.
    pub fn format_csv(results: &TestResults) -> String {
        format!(
            "{},{},{},{},{},{},{},{:.1},{:.1},{:.1},{:.1},{}",
            results.timestamp,
            results.scenario_name,
            results.duration_secs,
            results.users_spawned,
            results.total_requests,
            results.failed_requests,
            results.timeouts,
            results.requests_per_second,
            results.latency_p50,
            results.latency_p90,
            results.latency_p99,
            results.users_abandoned
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,scenario,duration,users,requests,failed,timeouts,rps,p50,p90,p99,abandoned"
    }
}
