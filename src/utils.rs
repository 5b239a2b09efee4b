//! Utility functions

use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

/// Open a file for writing, creating missing parent directories first
pub fn open_file_to_write(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    File::create(path)
}

/// Format a duration the way Go prints `time.Duration` (`1.5s`, `230.45ms`, `1m2s`)
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use quick::utils::format_duration;
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
/// assert_eq!(format_duration(Duration::from_micros(230_450)), "230.45ms");
/// assert_eq!(format_duration(Duration::from_secs(62)), "1m2s");
/// assert_eq!(format_duration(Duration::ZERO), "0s");
/// ```
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", fraction(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", fraction(nanos, 1_000_000));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs_nanos = u128::from(total_secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos());

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!("{}s", fraction(secs_nanos, 1_000_000_000)));
    out
}

/// Render `value / unit` with trailing zeros of the fraction trimmed
fn fraction(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return whole.to_string();
    }
    let width = unit.to_string().len() - 1;
    let digits = format!("{:0width$}", rem, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Round a duration to the nearest multiple of `unit` (half away from zero)
pub fn round_duration(d: Duration, unit: Duration) -> Duration {
    let unit_ns = unit.as_nanos();
    if unit_ns == 0 {
        return d;
    }
    let ns = d.as_nanos();
    let rounded = (ns + unit_ns / 2) / unit_ns * unit_ns;
    Duration::from_nanos(u64::try_from(rounded).unwrap_or(u64::MAX))
}

/// Parse a Go-style duration string such as `1.5s`, `300ms` or `1h2m3s`
///
/// A bare `0` is accepted, like Go does.
pub fn parse_go_duration(s: &str) -> Option<Duration> {
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut total_ns = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let value: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_end..];
        total_ns += value * scale;
    }

    Some(Duration::from_nanos(total_ns.round() as u64))
}
