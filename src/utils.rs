//! Utility functions for common operations.

use chrono::{DateTime, Local};
use std::time::Duration;

/// Format of the timestamp suffix used in generated filenames.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Applies rate limiting delay.
///
/// Values that are not a valid duration are logged and skipped.
pub async fn rate_limit(delay_sec: f64) {
    if delay_sec <= 0.0 {
        return;
    }
    match Duration::try_from_secs_f64(delay_sec) {
        Ok(delay) => tokio::time::sleep(delay).await,
        Err(e) => tracing::warn!(delay_sec, error = %e, "Ignoring invalid delay"),
    }
}

/// Renders `at` as a filename timestamp (`YYYYMMDD_HHMMSS`).
pub fn file_timestamp(at: DateTime<Local>) -> String {
    at.format(FILE_TIMESTAMP_FORMAT).to_string()
}

/// Builds `<prefix>_<YYYYMMDD_HHMMSS>.<extension>`.
pub fn timestamped_filename(prefix: &str, at: DateTime<Local>, extension: &str) -> String {
    format!("{}_{}.{}", prefix.trim(), file_timestamp(at), extension)
}

/// Truncates text to `max_chars` characters, appending an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_filename() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            timestamped_filename("skoob_estante", at, "csv"),
            "skoob_estante_20240309_070501.csv"
        );
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("Coração", 4), "Cora...");
        assert_eq!(preview("curto", 10), "curto");
    }

    #[tokio::test]
    async fn test_rate_limit_zero_returns_immediately() {
        let start = std::time::Instant::now();
        rate_limit(0.0).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_rate_limit_ignores_invalid_delays() {
        let start = std::time::Instant::now();
        rate_limit(f64::INFINITY).await;
        rate_limit(f64::NAN).await;
        rate_limit(1e300).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
