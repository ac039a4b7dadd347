//! Human readable sizes, IEC units.

const UNITS: &[&str] = &["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// `fmt_size(1536) == "1.50 KiB"`, three significant digits.
pub fn fmt_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }

    // Rounding can reach the next unit, e.g. 1023.999 KiB.
    let mut rounded = round_to(value, decimals(value));
    if rounded >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
        rounded = round_to(value, decimals(value));
    }
    format!("{:.*} {}", decimals(rounded), rounded, UNITS[unit])
}

fn decimals(value: f64) -> usize {
    if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    }
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Short size followed by the exact byte count.
pub fn fmt_size_long(bytes: u64) -> String {
    format!("{} ({} bytes)", fmt_size(bytes), bytes)
}
