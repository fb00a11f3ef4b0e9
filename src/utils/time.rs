//! Timestamps are stored as Unix seconds.

use chrono::Utc;

pub fn unix_seconds() -> i64 {
    Utc::now().timestamp()
}
