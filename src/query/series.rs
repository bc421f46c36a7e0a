use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::bucket::Bucket;
use crate::db::models::Channel;

/// One point of a single-channel series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SeriesPoint {
    pub time_group: String,
    pub timestamp: DateTime<Utc>,
    /// Bucket mean of the channel, already rounded.
    pub value: f64,
}

/// Project aggregated buckets onto one channel. Buckets where the channel
/// had no value are skipped rather than reported as zero.
pub fn project(channel: Channel, buckets: &[Bucket]) -> Vec<SeriesPoint> {
    buckets
        .iter()
        .filter_map(|b| {
            channel.value_in(&b.channels).map(|value| SeriesPoint {
                time_group: b.time_group.clone(),
                timestamp: b.bucket_start,
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{db::models::Channels, query::bucket::BucketKey};

    fn bucket(h: u32, temperature: Option<f64>) -> Bucket {
        let start = Utc.with_ymd_and_hms(2025, 7, 19, h, 0, 0).unwrap();
        Bucket {
            time_group: BucketKey::TwoHour.label(start),
            week_label: None,
            bucket_start: start,
            samples: 3,
            channels: Channels {
                temperature,
                voltage_in: Some(12.0),
                ..Channels::default()
            },
        }
    }

    #[test]
    fn skips_buckets_without_the_channel() {
        let buckets = [bucket(0, Some(20.5)), bucket(2, None), bucket(4, Some(22.0))];
        let points = project(Channel::Temperature, &buckets);

        let values: Vec<_> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![20.5, 22.0]);
        assert_eq!(points[1].timestamp, buckets[2].bucket_start);
        assert_eq!(points[1].time_group, buckets[2].time_group);
    }

    #[test]
    fn other_channels_are_ignored() {
        let points = project(Channel::VoltageIn, &[bucket(0, None)]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 12.0);
    }
}
