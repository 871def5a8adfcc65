use chrono::{Duration, Local, SecondsFormat, Utc};

/// Calendar-day key for the host's local clock, `offset_days` whole days back.
/// Deliberately not UTC-normalized: "today" flips at local midnight, matching
/// what the user's device shows.
pub fn local_date_string(offset_days: i64) -> String {
    let day = Local::now().date_naive() - Duration::days(offset_days);
    day.format("%Y-%m-%d").to_string()
}

/// HH:MM:SS on the local clock.
pub fn local_time_string() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Full ISO-8601 UTC timestamp with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Millisecond-epoch id for records ordered by creation time.
pub fn creation_id() -> String {
    Utc::now().timestamp_millis().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_string_shape() {
        let today = local_date_string(0);
        assert_eq!(today.len(), 10);
        assert_eq!(&today[4..5], "-");
        assert_eq!(&today[7..8], "-");
    }

    #[test]
    fn offset_moves_backwards() {
        let today = local_date_string(0);
        let yesterday = local_date_string(1);
        assert!(yesterday < today);
    }

    #[test]
    fn time_string_shape() {
        let time = local_time_string();
        assert_eq!(time.len(), 8);
        assert_eq!(&time[2..3], ":");
    }
}
