use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Device id used when an ingested payload does not name one.
pub const DEFAULT_DEVICE_ID: &str = "NANO_001";

/// Decimal places kept for current and voltage channels.
pub const ELECTRICAL_PRECISION: i32 = 3;
/// Decimal places kept for temperature and battery channels.
pub const AMBIENT_PRECISION: i32 = 2;

/// The six numeric channels reported by the bridge.
///
/// Every channel is nullable in the `sensor_data` table. Aggregated rows reuse
/// this struct to carry one mean per channel; a `None` mean means no row in
/// the bucket had a value for that channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Channels {
    /// Amperes
    pub current_in: Option<f64>,
    /// Amperes
    pub current_out: Option<f64>,
    /// Volts
    pub voltage_in: Option<f64>,
    /// Volts
    pub voltage_out: Option<f64>,
    /// Degrees Celsius
    pub temperature: Option<f64>,
    /// Percent
    pub battery_percentage: Option<f64>,
}

impl Channels {
    /// Round each channel to its presentation precision.
    pub fn rounded(self) -> Self {
        Self {
            current_in: self.current_in.map(|v| round_to(v, ELECTRICAL_PRECISION)),
            current_out: self.current_out.map(|v| round_to(v, ELECTRICAL_PRECISION)),
            voltage_in: self.voltage_in.map(|v| round_to(v, ELECTRICAL_PRECISION)),
            voltage_out: self.voltage_out.map(|v| round_to(v, ELECTRICAL_PRECISION)),
            temperature: self.temperature.map(|v| round_to(v, AMBIENT_PRECISION)),
            battery_percentage: self.battery_percentage.map(|v| round_to(v, AMBIENT_PRECISION)),
        }
    }

    /// Replace missing channels with zero, as the ingestion path stores them.
    pub fn zero_filled(self) -> Self {
        Self {
            current_in: Some(self.current_in.unwrap_or(0.0)),
            current_out: Some(self.current_out.unwrap_or(0.0)),
            voltage_in: Some(self.voltage_in.unwrap_or(0.0)),
            voltage_out: Some(self.voltage_out.unwrap_or(0.0)),
            temperature: Some(self.temperature.unwrap_or(0.0)),
            battery_percentage: Some(self.battery_percentage.unwrap_or(0.0)),
        }
    }

    pub fn as_array(&self) -> [Option<f64>; 6] {
        [
            self.current_in,
            self.current_out,
            self.voltage_in,
            self.voltage_out,
            self.temperature,
            self.battery_percentage,
        ]
    }

    pub fn from_array(values: [Option<f64>; 6]) -> Self {
        let [current_in, current_out, voltage_in, voltage_out, temperature, battery_percentage] =
            values;
        Self {
            current_in,
            current_out,
            voltage_in,
            voltage_out,
            temperature,
            battery_percentage,
        }
    }
}

/// Name of a single channel, as used in per-channel series requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    CurrentIn,
    CurrentOut,
    VoltageIn,
    VoltageOut,
    Temperature,
    BatteryPercentage,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sensor type: {0:?}")]
pub struct InvalidChannel(pub String);

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::CurrentIn,
        Channel::CurrentOut,
        Channel::VoltageIn,
        Channel::VoltageOut,
        Channel::Temperature,
        Channel::BatteryPercentage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::CurrentIn => "current_in",
            Channel::CurrentOut => "current_out",
            Channel::VoltageIn => "voltage_in",
            Channel::VoltageOut => "voltage_out",
            Channel::Temperature => "temperature",
            Channel::BatteryPercentage => "battery_percentage",
        }
    }

    pub fn value_in(self, channels: &Channels) -> Option<f64> {
        match self {
            Channel::CurrentIn => channels.current_in,
            Channel::CurrentOut => channels.current_out,
            Channel::VoltageIn => channels.voltage_in,
            Channel::VoltageOut => channels.voltage_out,
            Channel::Temperature => channels.temperature,
            Channel::BatteryPercentage => channels.battery_percentage,
        }
    }
}

impl FromStr for Channel {
    type Err = InvalidChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| InvalidChannel(s.to_owned()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// One row of `sensor_data`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub id: Uuid,
    pub device_id: String,
    /// Sample time reported by the device; the ordering and grouping key.
    pub timestamp: DateTime<Utc>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub channels: Channels,
    /// Ingestion time. Informational only.
    pub created_at: DateTime<Utc>,
}

/// A reading about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub channels: Channels,
}

/// One grouped row as returned by a bucketed range scan.
///
/// `bucket_start` is the value of the bucket function for every row in the
/// group; `channels` holds the unrounded per-channel means.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct GroupedRow {
    pub bucket_start: DateTime<Utc>,
    pub samples: i64,
    #[sqlx(flatten)]
    pub channels: Channels,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_uses_per_channel_precision() {
        let c = Channels {
            current_in: Some(1.23456),
            current_out: Some(0.0004),
            voltage_in: Some(12.9996),
            voltage_out: None,
            temperature: Some(21.456),
            battery_percentage: Some(99.994),
        }
        .rounded();

        assert_eq!(c.current_in, Some(1.235));
        assert_eq!(c.current_out, Some(0.0));
        assert_eq!(c.voltage_in, Some(13.0));
        assert_eq!(c.voltage_out, None);
        assert_eq!(c.temperature, Some(21.46));
        assert_eq!(c.battery_percentage, Some(99.99));
    }

    #[test]
    fn zero_filled_keeps_present_values() {
        let c = Channels {
            temperature: Some(25.5),
            ..Channels::default()
        }
        .zero_filled();

        assert_eq!(c.temperature, Some(25.5));
        assert_eq!(c.current_in, Some(0.0));
        assert_eq!(c.battery_percentage, Some(0.0));
    }

    #[test]
    fn channel_names_round_trip_and_pick_their_value() {
        let c = Channels {
            voltage_out: Some(12.5),
            ..Channels::default()
        };
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
        assert_eq!(Channel::VoltageOut.value_in(&c), Some(12.5));
        assert_eq!(Channel::Temperature.value_in(&c), None);
        assert!("lux".parse::<Channel>().is_err());
    }

    #[test]
    fn array_conversion_preserves_order() {
        let values = [Some(1.0), Some(2.0), None, Some(4.0), Some(5.0), Some(6.0)];
        let c = Channels::from_array(values);
        assert_eq!(c.voltage_out, Some(4.0));
        assert_eq!(c.as_array(), values);
    }
}
