use chrono::{DateTime, TimeZone, Utc};

/// Convert a `DateTime<Utc>` to epoch seconds for storage.
pub fn to_epoch(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// Convert epoch seconds back to `DateTime<Utc>`.
/// Falls back to the epoch itself for out-of-range values.
pub fn from_epoch(epoch: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_round_trip() {
        let now = Utc::now();
        let back = from_epoch(to_epoch(now));
        assert_eq!(back.timestamp(), now.timestamp());
    }
}
