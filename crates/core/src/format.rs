//! Human-readable formatters shared by the CSV builder and the CLI.

const SIZE_UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB"];

/// Format a byte count with a 1024 base, e.g. `"1.5 KB"` or `"100 MB"`.
///
/// Up to two decimals are kept; trailing zeros are trimmed.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{rendered} {}", SIZE_UNITS[unit])
}

/// Format a fraction in `[0, 1]` as a percentage, e.g. `0.82` -> `"82.0%"`.
pub fn format_percentage(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Format a duration in seconds: `"2.8s"`, `"3m 5s"` or `"1h 2m"`.
///
/// From one minute up the value is rounded to whole seconds first, so a
/// carry never renders as `"1m 60s"`.
pub fn format_duration(seconds: f64) -> String {
    if (seconds * 10.0).round() / 10.0 < 60.0 {
        return format!("{seconds:.1}s");
    }
    let total = seconds.round() as u64;
    let (hours, minutes, secs) = (total / 3600, total % 3600 / 60, total % 60);
    if hours == 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{hours}h {minutes}m")
    }
}
