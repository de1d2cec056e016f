use std::collections::HashMap;

use gust_summary_model::StepStats;

use crate::percentile::percentile;
use crate::StepRecord;

/// Group step records by name and aggregate each group into [StepStats].
///
/// This is a pure function of the records passed in, so it can be called mid-run on a snapshot
/// without disturbing collection, and the final numbers are exactly reproducible from the
/// retained records.
pub fn compute_step_stats(records: &[StepRecord]) -> HashMap<String, StepStats> {
    let mut groups: HashMap<&str, Vec<&StepRecord>> = HashMap::new();
    for record in records {
        groups.entry(&record.step_name).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(name, group)| {
            let mut durations: Vec<f64> = group.iter().map(|r| r.duration_ms).collect();
            durations.sort_by(|a, b| a.total_cmp(b));

            let count = group.len() as u64;
            let success_count = group.iter().filter(|r| r.success).count() as u64;
            let failure_count = count - success_count;
            let sum: f64 = durations.iter().sum();

            let stats = StepStats {
                name: name.to_string(),
                count,
                success_count,
                failure_count,
                error_rate: round2(failure_count as f64 / count as f64),
                min_ms: round2(durations.first().copied().unwrap_or(0.0)),
                max_ms: round2(durations.last().copied().unwrap_or(0.0)),
                mean_ms: round2(sum / count as f64),
                p50_ms: round2(percentile(&durations, 50.0)),
                p90_ms: round2(percentile(&durations, 90.0)),
                p95_ms: round2(percentile(&durations, 95.0)),
                p99_ms: round2(percentile(&durations, 99.0)),
            };
            (name.to_string(), stats)
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
