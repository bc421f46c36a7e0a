use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::{Channels, GroupedRow, Reading};

/// Grouping function applied to `timestamp` before averaging.
///
/// Every variant is calendar-relative in UTC: the bucket a reading lands in
/// depends on its timestamp alone, never on the time of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BucketKey {
    /// No grouping; every reading is its own point.
    Raw,
    /// Two-hour windows starting at even hours.
    #[serde(rename = "2-hour")]
    TwoHour,
    /// Calendar days.
    #[serde(rename = "1-day")]
    Day,
    /// Three-day windows counted from the first day of each year
    /// (`(day_of_year - 1) mod 3`), so the last window of a year may be short.
    #[serde(rename = "3-day")]
    ThreeDay,
    /// ISO-8601 weeks, Monday through Sunday.
    IsoWeek,
}

impl BucketKey {
    pub fn as_str(self) -> &'static str {
        match self {
            BucketKey::Raw => "raw",
            BucketKey::TwoHour => "2-hour",
            BucketKey::Day => "1-day",
            BucketKey::ThreeDay => "3-day",
            BucketKey::IsoWeek => "iso-week",
        }
    }

    pub fn is_raw(self) -> bool {
        self == BucketKey::Raw
    }

    /// Start of the bucket containing `ts`.
    ///
    /// For [`BucketKey::Raw`] this is the timestamp itself.
    pub fn floor(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = ts.date_naive().and_time(NaiveTime::MIN).and_utc();
        match self {
            BucketKey::Raw => ts,
            BucketKey::TwoHour => midnight + Duration::hours(i64::from(ts.hour() / 2 * 2)),
            BucketKey::Day => midnight,
            BucketKey::ThreeDay => midnight - Duration::days(i64::from(ts.ordinal0() % 3)),
            BucketKey::IsoWeek => {
                midnight - Duration::days(i64::from(ts.weekday().num_days_from_monday()))
            }
        }
    }

    /// Canonical, lexically sortable label for a bucket starting at `start`.
    pub fn label(self, start: DateTime<Utc>) -> String {
        match self {
            BucketKey::Raw => start.to_rfc3339(),
            BucketKey::TwoHour => start.format("%Y-%m-%d %H:00:00").to_string(),
            BucketKey::Day | BucketKey::ThreeDay | BucketKey::IsoWeek => {
                start.format("%Y-%m-%d").to_string()
            }
        }
    }

    /// Human week code (`2025-W07`) for ISO-week buckets.
    pub fn week_code(self, start: DateTime<Utc>) -> Option<String> {
        match self {
            BucketKey::IsoWeek => {
                let week = start.iso_week();
                Some(format!("{}-W{:02}", week.year(), week.week()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point of a historical series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Bucket {
    /// Bucket start (or the reading timestamp in raw mode) as a sortable label.
    pub time_group: String,
    /// ISO week code, only for `iso-week` buckets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_label: Option<String>,
    pub bucket_start: DateTime<Utc>,
    /// Number of readings that contributed to this bucket.
    pub samples: i64,
    #[serde(flatten)]
    pub channels: Channels,
}

impl Bucket {
    /// Raw mode: the reading itself, no averaging.
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            time_group: BucketKey::Raw.label(reading.timestamp),
            week_label: None,
            bucket_start: reading.timestamp,
            samples: 1,
            channels: reading.channels.rounded(),
        }
    }

    pub fn from_group(key: BucketKey, row: &GroupedRow) -> Self {
        Self {
            time_group: key.label(row.bucket_start),
            week_label: key.week_code(row.bucket_start),
            bucket_start: row.bucket_start,
            samples: row.samples,
            channels: row.channels.rounded(),
        }
    }
}

/// Running per-channel sums for one bucket; nulls are skipped per channel.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChannelAccumulator {
    samples: i64,
    sums: [f64; 6],
    counts: [u32; 6],
}

impl ChannelAccumulator {
    pub(crate) fn add(&mut self, channels: &Channels) {
        self.samples += 1;
        for (i, value) in channels.as_array().into_iter().enumerate() {
            if let Some(v) = value {
                self.sums[i] += v;
                self.counts[i] += 1;
            }
        }
    }

    pub(crate) fn finish(&self, bucket_start: DateTime<Utc>) -> GroupedRow {
        let mut means = [None; 6];
        for (i, mean) in means.iter_mut().enumerate() {
            if self.counts[i] > 0 {
                *mean = Some(self.sums[i] / f64::from(self.counts[i]));
            }
        }
        GroupedRow {
            bucket_start,
            samples: self.samples,
            channels: Channels::from_array(means),
        }
    }
}
