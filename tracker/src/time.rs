use time::format_description::well_known::Iso8601;
use time::macros::format_description;
use time::OffsetDateTime;

pub trait TimeSource {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// ISO-8601 instant, the timestamp format stored on visitor records.
pub fn iso8601(instant: OffsetDateTime) -> String {
    instant
        .format(&Iso8601::DEFAULT)
        .expect("failed to iso8601 format timestamp")
}

/// UTC date key (`YYYY-MM-DD`) used for daily visit counters.
pub fn daily_key(instant: OffsetDateTime) -> String {
    instant
        .format(format_description!("[year]-[month]-[day]"))
        .expect("failed to format date key")
}

pub fn unix_millis(instant: OffsetDateTime) -> i128 {
    instant.unix_timestamp_nanos() / 1_000_000
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::{daily_key, unix_millis};

    #[test]
    fn daily_key_is_utc_date() {
        assert_eq!(daily_key(datetime!(2024-03-07 23:59:59 UTC)), "2024-03-07");
    }

    #[test]
    fn unix_millis_matches_epoch() {
        assert_eq!(unix_millis(datetime!(1970-01-01 00:00:01 UTC)), 1000);
    }
}
