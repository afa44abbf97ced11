//! Partition-tuple extraction from object-store keys of the form
//! `{prefix}/app_id=…/year=…/month=…/day=…/hour=…/{file}.parquet`.

use once_cell::sync::Lazy;
use regex::Regex;

static PARTITION_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"app_id=(?P<app_id>[^/]+)/year=(?P<year>\d{4})/month=(?P<month>\d{2})/day=(?P<day>\d{2})/hour=(?P<hour>\d{2})/",
    )
    .expect("partition key regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionTuple {
    pub app_id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl PartitionTuple {
    /// Directory this partition's files live under, relative to the
    /// configured root prefix.
    pub fn object_prefix(&self, root_prefix: &str) -> String {
        format!(
            "{}/app_id={}/year={:04}/month={:02}/day={:02}/hour={:02}",
            root_prefix, self.app_id, self.year, self.month, self.day, self.hour
        )
    }

    pub fn is_cold(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        use chrono::{Datelike, Timelike};
        (self.year, self.month, self.day, self.hour)
            < (now.year(), now.month(), now.day(), now.hour())
    }
}

/// Extract the partition tuple from a single object key. Keys that don't
/// match the expected layout (e.g. already-compacted files under a
/// different naming scheme) return `None` and are skipped.
pub fn extract_partition(key: &str) -> Option<PartitionTuple> {
    let captures = PARTITION_KEY_RE.captures(key)?;
    Some(PartitionTuple {
        app_id: captures["app_id"].to_string(),
        year: captures["year"].parse().ok()?,
        month: captures["month"].parse().ok()?,
        day: captures["day"].parse().ok()?,
        hour: captures["hour"].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_partition_tuple_from_a_sink_key() {
        let key = "events/app_id=demo/year=2026/month=07/day=26/hour=14/abc-123.parquet";
        let partition = extract_partition(key).unwrap();
        assert_eq!(partition.app_id, "demo");
        assert_eq!(partition.year, 2026);
        assert_eq!(partition.month, 7);
        assert_eq!(partition.day, 26);
        assert_eq!(partition.hour, 14);
    }

    #[test]
    fn extracts_partition_tuple_from_a_compacted_key() {
        let key = "events/app_id=demo/year=2026/month=07/day=26/hour=14/compacted_xyz.parquet";
        assert!(extract_partition(key).is_some());
    }

    #[test]
    fn rejects_keys_missing_the_partition_layout() {
        assert!(extract_partition("events/malformed-key.parquet").is_none());
    }

    #[test]
    fn current_hour_partition_is_not_cold() {
        let now = chrono::Utc::now();
        use chrono::{Datelike, Timelike};
        let partition = PartitionTuple {
            app_id: "demo".into(),
            year: now.year(),
            month: now.month(),
            day: now.day(),
            hour: now.hour(),
        };
        assert!(!partition.is_cold(now));
    }
}
