/// Compute a percentile from values sorted ascending, using linear interpolation between
/// closest ranks.
///
/// Returns 0 for an empty slice and the single value for a slice of one, for any `p`.
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    let n = sorted_values.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted_values[0];
    }

    let k = (p / 100.0) * (n - 1) as f64;
    let f = k.floor() as usize;
    let c = std::cmp::min(f + 1, n - 1);

    if f == c {
        return sorted_values[f];
    }

    sorted_values[f] + (k - f as f64) * (sorted_values[c] - sorted_values[f])
}
