use std::collections::HashMap;

use gust_summary_model::StepStats;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "step")]
    name: String,
    count: u64,
    failed: u64,
    min_ms: f64,
    mean_ms: f64,
    p50_ms: f64,
    p95_ms: f64,
    p99_ms: f64,
    max_ms: f64,
}

/// Print a per-step summary table at the end of a run.
pub fn print_step_summary(per_step: &HashMap<String, StepStats>) {
    if per_step.is_empty() {
        println!("\nNo steps were recorded");
        return;
    }

    println!("\nSummary of steps");
    let mut rows: Vec<StepRow> = per_step
        .values()
        .map(|stats| StepRow {
            name: stats.name.clone(),
            count: stats.count,
            failed: stats.failure_count,
            min_ms: stats.min_ms,
            mean_ms: stats.mean_ms,
            p50_ms: stats.p50_ms,
            p95_ms: stats.p95_ms,
            p99_ms: stats.p99_ms,
            max_ms: stats.max_ms,
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{table}");
}
