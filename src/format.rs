//! Display helpers for sizes and timestamps.

use std::time::SystemTime;

use chrono::{DateTime, Local, SecondsFormat, Utc};

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary (1024) steps, e.g. `1.5 KB`.
pub fn human_size(bytes: u64) -> String {
    let mut n = bytes as f64;
    for unit in SIZE_UNITS {
        if n < 1024.0 {
            return format!("{n:3.1} {unit}");
        }
        n /= 1024.0;
    }
    format!("{n:.1} PB")
}

/// Format a modification time in local time as `YYYY-MM-DD HH:MM:SS`.
pub fn format_mtime(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Convert a system time to an RFC3339 UTC string (e.g. `2024-01-15T10:30:00Z`).
pub fn to_rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_human_size_bytes() {
        assert_eq!(human_size(0), "0.0 B");
        assert_eq!(human_size(512), "512.0 B");
        assert_eq!(human_size(1023), "1023.0 B");
    }

    #[test]
    fn test_human_size_units() {
        assert_eq!(human_size(1024), "1.0 KB");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(human_size(2 * 1024u64.pow(4)), "2.0 TB");
    }

    #[test]
    fn test_human_size_petabytes() {
        assert_eq!(human_size(5 * 1024u64.pow(5)), "5.0 PB");
    }

    #[test]
    fn test_to_rfc3339() {
        let time = UNIX_EPOCH + Duration::from_secs(1_705_314_600);
        assert_eq!(to_rfc3339(time), "2024-01-15T10:30:00Z");
    }

    #[test]
    fn test_format_mtime_shape() {
        let formatted = format_mtime(UNIX_EPOCH + Duration::from_secs(1_705_314_600));
        // Local offset varies by machine, only the layout is stable
        assert_eq!(formatted.len(), 19);
        assert_eq!(&formatted[4..5], "-");
        assert_eq!(&formatted[10..11], " ");
        assert_eq!(&formatted[13..14], ":");
    }
}
