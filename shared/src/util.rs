//! 时间工具

use chrono::{DateTime, Utc};

/// Milliseconds elapsed since `since`, clamped at 0 for clock skew
pub fn elapsed_millis(since: DateTime<Utc>) -> u64 {
    (Utc::now() - since).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_never_negative() {
        let future = Utc::now() + chrono::Duration::seconds(10);
        assert_eq!(elapsed_millis(future), 0);
        let past = Utc::now() - chrono::Duration::seconds(2);
        assert!(elapsed_millis(past) >= 2000);
    }
}
