use chrono::{DateTime, Utc};

/// First eight characters of an identifier or credential, for logging.
pub fn log_prefix(t: &str) -> &str {
    t.char_indices().nth(8).map_or(t, |(i, _)| &t[..i])
}

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Formats unix seconds the way the VPN clients expect:
/// `2023-11-19T21:33:41+00:00` (no fractional seconds, explicit offset).
pub fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S+00:00")
        .to_string()
}
