use std::{collections::BTreeMap, fmt};

use sha2::{Digest, Sha256};

use crate::{
    db::models::Channel,
    query::{logs::LogFilter, range::RangeToken},
};

/// What a cache entry holds. Part of every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Historical,
    ChannelSeries,
    Latest,
    Status,
    MinTimestamp,
    LogPage,
}

impl QueryKind {
    fn as_str(self) -> &'static str {
        match self {
            QueryKind::Historical => "historical",
            QueryKind::ChannelSeries => "channel_series",
            QueryKind::Latest => "latest",
            QueryKind::Status => "status",
            QueryKind::MinTimestamp => "min_timestamp",
            QueryKind::LogPage => "log_page",
        }
    }
}

/// Deterministic cache key.
///
/// The digest is SHA-256 over the query kind and every named part, sorted
/// by name and length-prefixed, so neither argument order nor separator
/// characters inside values can make two different queries collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: QueryKind,
    digest: String,
}

impl CacheKey {
    fn derive(kind: QueryKind, parts: &[(&str, Option<&str>)]) -> Self {
        let sorted: BTreeMap<&str, Option<&str>> = parts.iter().copied().collect();

        let mut hasher = Sha256::new();
        write_field(&mut hasher, kind.as_str().as_bytes());
        for (name, value) in sorted {
            write_field(&mut hasher, name.as_bytes());
            match value {
                None => hasher.update([0u8]),
                Some(v) => {
                    hasher.update([1u8]);
                    write_field(&mut hasher, v.as_bytes());
                }
            }
        }

        Self {
            kind,
            digest: hex::encode(hasher.finalize()),
        }
    }

    pub fn historical(range: RangeToken, device_id: &str) -> Self {
        Self::derive(
            QueryKind::Historical,
            &[("range", Some(range.as_str())), ("device_id", Some(device_id))],
        )
    }

    pub fn channel_series(channel: Channel, range: RangeToken, device_id: &str) -> Self {
        Self::derive(
            QueryKind::ChannelSeries,
            &[
                ("channel", Some(channel.as_str())),
                ("range", Some(range.as_str())),
                ("device_id", Some(device_id)),
            ],
        )
    }

    pub fn latest(device_id: &str) -> Self {
        Self::derive(QueryKind::Latest, &[("device_id", Some(device_id))])
    }

    pub fn status() -> Self {
        Self::derive(QueryKind::Status, &[])
    }

    pub fn min_timestamp() -> Self {
        Self::derive(QueryKind::MinTimestamp, &[])
    }

    pub fn log_page(filter: &LogFilter) -> Self {
        let start = filter.start_date.map(|d| d.to_string());
        let end = filter.end_date.map(|d| d.to_string());
        let page = filter.page.to_string();
        let per_page = filter.per_page.to_string();
        Self::derive(
            QueryKind::LogPage,
            &[
                ("device_id", Some(filter.device_id.as_str())),
                ("start_date", start.as_deref()),
                ("end_date", end.as_deref()),
                ("page", Some(page.as_str())),
                ("per_page", Some(per_page.as_str())),
            ],
        )
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), &self.digest[..12])
    }
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(
            CacheKey::historical(RangeToken::OneDay, "NANO_001"),
            CacheKey::historical(RangeToken::OneDay, "NANO_001"),
        );
        assert_eq!(CacheKey::status(), CacheKey::status());
        assert_eq!(CacheKey::status().as_str().len(), 64);
    }

    #[test]
    fn every_input_changes_the_key() {
        let base = CacheKey::historical(RangeToken::OneDay, "NANO_001");
        assert_ne!(base, CacheKey::historical(RangeToken::OneHour, "NANO_001"));
        assert_ne!(base, CacheKey::historical(RangeToken::OneDay, "NANO_002"));
        assert_ne!(CacheKey::latest("NANO_001"), CacheKey::latest("NANO_002"));
        let series = CacheKey::channel_series(Channel::Temperature, RangeToken::OneDay, "NANO_001");
        assert_ne!(
            series,
            CacheKey::channel_series(Channel::VoltageIn, RangeToken::OneDay, "NANO_001")
        );
        assert_ne!(series, base);
        assert_ne!(CacheKey::status(), CacheKey::min_timestamp());
    }

    #[test]
    fn part_order_does_not_matter() {
        let a = CacheKey::derive(QueryKind::Latest, &[("a", Some("1")), ("b", Some("2"))]);
        let b = CacheKey::derive(QueryKind::Latest, &[("b", Some("2")), ("a", Some("1"))]);
        assert_eq!(a, b);
    }

    #[test]
    fn separators_inside_values_do_not_collide() {
        let a = CacheKey::derive(QueryKind::Latest, &[("a", Some("x:y")), ("b", Some("z"))]);
        let b = CacheKey::derive(QueryKind::Latest, &[("a", Some("x")), ("b", Some("y:z"))]);
        assert_ne!(a, b);
    }

    #[test]
    fn absent_and_empty_values_differ() {
        let a = CacheKey::derive(QueryKind::LogPage, &[("start_date", None)]);
        let b = CacheKey::derive(QueryKind::LogPage, &[("start_date", Some(""))]);
        assert_ne!(a, b);
    }

    #[test]
    fn log_page_key_covers_every_filter_field() {
        let day = NaiveDate::from_ymd_opt(2025, 7, 19);
        let base = LogFilter::new("NANO_001", day, day, Some(1), Some(100));
        let key = CacheKey::log_page(&base);

        assert_ne!(key, CacheKey::log_page(&LogFilter { page: 2, ..base.clone() }));
        assert_ne!(key, CacheKey::log_page(&LogFilter { per_page: 50, ..base.clone() }));
        assert_ne!(key, CacheKey::log_page(&LogFilter { start_date: None, ..base.clone() }));
        assert_ne!(key, CacheKey::log_page(&LogFilter { end_date: None, ..base.clone() }));
        assert_eq!(key.kind(), QueryKind::LogPage);
    }
}
