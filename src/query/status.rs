use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health of one monitored component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Connected,
    Warning,
    Error,
}

impl HealthLevel {
    /// Classify a store round trip.
    pub fn from_probe_ms(ms: u64) -> Self {
        match ms {
            0..=99 => HealthLevel::Connected,
            100..=499 => HealthLevel::Warning,
            _ => HealthLevel::Error,
        }
    }

    /// Classify sensor liveness by the age of the newest reading.
    pub fn from_staleness(minutes_since_last: Option<i64>) -> Self {
        match minutes_since_last {
            None => HealthLevel::Error,
            Some(m) if m > 15 => HealthLevel::Error,
            Some(m) if m > 5 => HealthLevel::Warning,
            Some(_) => HealthLevel::Connected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DatabaseStatus {
    pub status: HealthLevel,
    /// `None` when the probe failed outright.
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorStatus {
    pub status: HealthLevel,
    pub device_id: String,
    pub last_reading_at: Option<DateTime<Utc>>,
    pub minutes_since_last: Option<i64>,
    /// Readings received in the last 30 minutes.
    pub recent_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PerformanceStatus {
    pub data_points_last_hour: i64,
    pub data_points_last_day: i64,
    pub total_data_points: i64,
    pub uptime_secs: u64,
    pub cache_entries: usize,
}

/// System health rollup served by `/system/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatusSnapshot {
    pub database: DatabaseStatus,
    pub sensors: SensorStatus,
    pub performance: PerformanceStatus,
    pub last_check: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Snapshots taken while the store could not be probed must not be cached.
    pub fn is_cacheable(&self) -> bool {
        self.database.response_time_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_thresholds() {
        assert_eq!(HealthLevel::from_probe_ms(0), HealthLevel::Connected);
        assert_eq!(HealthLevel::from_probe_ms(99), HealthLevel::Connected);
        assert_eq!(HealthLevel::from_probe_ms(100), HealthLevel::Warning);
        assert_eq!(HealthLevel::from_probe_ms(499), HealthLevel::Warning);
        assert_eq!(HealthLevel::from_probe_ms(500), HealthLevel::Error);
    }

    #[test]
    fn staleness_thresholds() {
        assert_eq!(HealthLevel::from_staleness(None), HealthLevel::Error);
        assert_eq!(HealthLevel::from_staleness(Some(0)), HealthLevel::Connected);
        assert_eq!(HealthLevel::from_staleness(Some(5)), HealthLevel::Connected);
        assert_eq!(HealthLevel::from_staleness(Some(6)), HealthLevel::Warning);
        assert_eq!(HealthLevel::from_staleness(Some(15)), HealthLevel::Warning);
        assert_eq!(HealthLevel::from_staleness(Some(16)), HealthLevel::Error);
    }

    #[test]
    fn health_level_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&HealthLevel::Warning).unwrap(), "\"warning\"");
    }
}
