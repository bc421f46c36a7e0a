use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Months, Timelike, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::bucket::BucketKey;

/// Named historical window requested by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum RangeToken {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "15d")]
    FifteenDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "all")]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown range token: {0:?}")]
pub struct InvalidRange(pub String);

impl RangeToken {
    pub const ALL: [RangeToken; 8] = [
        RangeToken::OneHour,
        RangeToken::SixHours,
        RangeToken::TwelveHours,
        RangeToken::OneDay,
        RangeToken::FifteenDays,
        RangeToken::OneMonth,
        RangeToken::ThreeMonths,
        RangeToken::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RangeToken::OneHour => "1h",
            RangeToken::SixHours => "6h",
            RangeToken::TwelveHours => "12h",
            RangeToken::OneDay => "1d",
            RangeToken::FifteenDays => "15d",
            RangeToken::OneMonth => "1mo",
            RangeToken::ThreeMonths => "3mo",
            RangeToken::All => "all",
        }
    }

    /// Parse a token, falling back to `1h` for anything unrecognised.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|e: InvalidRange| {
            tracing::debug!(error = %e, "falling back to 1h range");
            RangeToken::OneHour
        })
    }

    pub fn bucket_key(self) -> BucketKey {
        match self {
            RangeToken::OneHour | RangeToken::SixHours | RangeToken::TwelveHours => BucketKey::Raw,
            RangeToken::OneDay => BucketKey::TwoHour,
            RangeToken::FifteenDays | RangeToken::OneMonth => BucketKey::Day,
            RangeToken::ThreeMonths => BucketKey::ThreeDay,
            RangeToken::All => BucketKey::IsoWeek,
        }
    }

    /// Nominal window start before alignment. `None` for [`RangeToken::All`],
    /// whose start comes from the data.
    fn nominal_start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = match self {
            RangeToken::OneHour => now - Duration::hours(1),
            RangeToken::SixHours => now - Duration::hours(6),
            RangeToken::TwelveHours => now - Duration::hours(12),
            RangeToken::OneDay => now - Duration::days(1),
            RangeToken::FifteenDays => now - Duration::days(15),
            RangeToken::OneMonth => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now - Duration::days(30)),
            RangeToken::ThreeMonths => now
                .checked_sub_months(Months::new(3))
                .unwrap_or(now - Duration::days(90)),
            RangeToken::All => return None,
        };
        Some(start)
    }
}

impl FromStr for RangeToken {
    type Err = InvalidRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RangeToken::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| InvalidRange(s.to_owned()))
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub token: RangeToken,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bucket_key: BucketKey,
}

/// Map a range token to its window and grouping.
///
/// The start is aligned down to the grouping granularity (the hour for raw
/// ranges, the bucket boundary otherwise), so the first bucket always covers
/// a whole calendar window. Windows are therefore up to one granule longer
/// than their name: `1h` at 11:05 starts at 10:00, and `1d` at 13:27 starts
/// at 12:00 the day before and usually yields 13 two-hour buckets, not 12.
///
/// `min_timestamp` is only consulted for [`RangeToken::All`]; when it is
/// absent (empty store) the window is the current ISO week, which holds no
/// rows.
pub fn resolve(
    token: RangeToken,
    now: DateTime<Utc>,
    min_timestamp: Option<DateTime<Utc>>,
) -> RangeSpec {
    let bucket_key = token.bucket_key();
    let nominal = token
        .nominal_start(now)
        .or(min_timestamp)
        .unwrap_or(now)
        .min(now);

    let start = match bucket_key {
        BucketKey::Raw => floor_hour(nominal),
        key => key.floor(nominal),
    };

    RangeSpec {
        token,
        start,
        end: now,
        bucket_key,
    }
}

fn floor_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}
