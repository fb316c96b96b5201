//! Time parsing utilities for scheduler output.

use std::time::Duration;

/// Parse a duration in various formats.
///
/// Supports:
/// - D-HH:MM:SS (SLURM time limit with days)
/// - HH:MM:SS
/// - MM:SS
/// - Seconds as integer
///
/// Returns None for "UNLIMITED" or empty strings. Fractional seconds are
/// not accepted here; use [`slurm_time`] for accounting figures.
pub fn parse_duration(s: &str) -> Option<Duration> {
    if s.is_empty() || s == "UNLIMITED" || s == "-" {
        return None;
    }

    // Check for day separator (D-HH:MM:SS)
    let parts: Vec<&str> = s.split('-').collect();
    let (days, time_part) = if parts.len() == 2 {
        (parts[0].parse::<u64>().ok()?, parts[1])
    } else {
        (0, parts[0])
    };

    let time_parts: Vec<u64> = time_part
        .split(':')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;

    if time_parts.len() > 3 {
        return None;
    }
    let seconds = clock_seconds(&time_parts)?;

    Some(Duration::from_secs(days.checked_mul(86400)?.checked_add(seconds)?))
}

/// `[[HH:]MM:]SS` fields to seconds; `None` on overflow.
fn clock_seconds(fields: &[u64]) -> Option<u64> {
    fields
        .iter()
        .rev()
        .zip([1u64, 60, 3600])
        .try_fold(0u64, |total, (field, unit)| total.checked_add(field.checked_mul(unit)?))
}

/// Parse duration to seconds from various formats.
///
/// Like `parse_duration` but returns seconds as u64 instead of Duration.
pub fn parse_duration_secs(s: &str) -> Option<u64> {
    parse_duration(s).map(|d| d.as_secs())
}

/// Convert a SLURM accounting time (`[D-][[HH:]MM:]SS[.frac]`) to seconds.
///
/// `sacct` reports CPU time as e.g. `1-20:30:12.1`, `03:04.500` or `12.3`.
pub fn slurm_time(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (days, clock) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, s),
    };

    let mut fields: Vec<&str> = clock.split(':').collect();
    if fields.len() > 3 {
        return None;
    }
    let secs: f64 = fields.pop()?.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }

    let mut clock = fields
        .iter()
        .map(|f| f.parse::<u64>().ok())
        .collect::<Option<Vec<u64>>>()?;
    clock.push(0);
    let whole = days.checked_mul(86400)?.checked_add(clock_seconds(&clock)?)?;

    Some(whole as f64 + secs)
}
