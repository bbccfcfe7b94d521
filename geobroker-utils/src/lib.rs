//! Utilities shared by the geobroker crates
//!
//! - [`Counter`]: atomic gauge, used for raster and worker statistics
//! - timestamp helpers with millisecond resolution (client heartbeats)
//! - `DashMap`/`DashSet`/`HashMap` aliases keyed with `ahash`
//!
//! ```
//! use geobroker_utils::{format_timestamp_millis, timestamp_millis, Counter};
//!
//! let clients = Counter::new();
//! clients.inc();
//! assert_eq!(clients.count(), 1);
//!
//! let now = timestamp_millis();
//! assert!(!format_timestamp_millis(now).is_empty());
//! ```

#![deny(unsafe_code)]

mod counter;

pub use counter::Counter;

/// Timestamp representation in milliseconds since Unix epoch
pub type TimestampMillis = i64;

pub type DashSet<V> = dashmap::DashSet<V, ahash::RandomState>;
pub type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;
pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
pub type HashSet<V> = std::collections::HashSet<V, ahash::RandomState>;

/// Get current timestamp in milliseconds
#[inline]
pub fn timestamp_millis() -> TimestampMillis {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|t| t.as_millis() as i64)
        .unwrap_or_else(|_| chrono::Local::now().timestamp_millis())
}

/// Format millisecond timestamp to string
#[inline]
pub fn format_timestamp_millis(t: TimestampMillis) -> String {
    if t <= 0 {
        "".into()
    } else {
        use chrono::TimeZone;
        if let chrono::LocalResult::Single(t) = chrono::Local.timestamp_millis_opt(t) {
            t.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
        } else {
            "".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp_millis() {
        assert_eq!(format_timestamp_millis(0), "");
        assert_eq!(format_timestamp_millis(-5), "");
        let s = format_timestamp_millis(timestamp_millis());
        // yyyy-mm-dd hh:mm:ss.mmm
        assert_eq!(s.len(), 23);
    }
}
