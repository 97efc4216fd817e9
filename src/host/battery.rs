use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use crate::Error;

use async_trait::async_trait;
use futures::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    Charging,
    Discharging,
    NotCharging,
    Full,
    Unknown,
}

impl From<&str> for BatteryStatus {
    fn from(value: &str) -> Self {
        match value {
            "Charging"     => BatteryStatus::Charging,
            "Discharging"  => BatteryStatus::Discharging,
            "Not charging" => BatteryStatus::NotCharging,
            "Full"         => BatteryStatus::Full,
            _              => BatteryStatus::Unknown,
        }
    }
}

impl BatteryStatus {
    pub fn is_charging(self) -> bool {
        matches!(self, BatteryStatus::Charging | BatteryStatus::Full)
    }
}

/// Exactly one source is reported per reading, Ac winning over Usb,
/// Usb over Wireless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingSource {
    Ac,
    Usb,
    Wireless,
    None,
}

impl fmt::Display for ChargingSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChargingSource::Ac       => write!(f, "AC"),
            ChargingSource::Usb      => write!(f, "USB"),
            ChargingSource::Wireless => write!(f, "Wireless"),
            ChargingSource::None     => write!(f, "Not charging"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryHealth {
    Good,
    Overheat,
    Dead,
    OverVoltage,
    UnspecifiedFailure,
    Cold,
    Unknown,
}

impl From<&str> for BatteryHealth {
    fn from(value: &str) -> Self {
        match value {
            "Good"                => BatteryHealth::Good,
            "Overheat"            => BatteryHealth::Overheat,
            "Dead"                => BatteryHealth::Dead,
            "Over voltage"        => BatteryHealth::OverVoltage,
            "Unspecified failure" => BatteryHealth::UnspecifiedFailure,
            "Cold"                => BatteryHealth::Cold,
            _                     => BatteryHealth::Unknown,
        }
    }
}

impl fmt::Display for BatteryHealth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BatteryHealth::Good               => write!(f, "Good"),
            BatteryHealth::Overheat           => write!(f, "Overheat"),
            BatteryHealth::Dead               => write!(f, "Dead"),
            BatteryHealth::OverVoltage        => write!(f, "Over voltage"),
            BatteryHealth::UnspecifiedFailure => write!(f, "Unspecified failure"),
            BatteryHealth::Cold               => write!(f, "Cold"),
            BatteryHealth::Unknown            => write!(f, "Unknown"),
        }
    }
}

/// One reading, derived in full from a single host snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryInfo {
    pub level:              u8,
    pub is_charging:        bool,
    pub source:             ChargingSource,
    pub health:             BatteryHealth,
    pub temperature:        f32, // celsius
    pub voltage_millivolts: u32,
}

#[async_trait]
pub trait Battery {
    async fn battery_level(&self) -> Result<u8, Error>;
    async fn battery_info(&self) -> Result<BatteryInfo, Error>;
    async fn battery_stream(&self, every: Duration) -> Result<Pin<Box<dyn Stream<Item = BatteryInfo> + Send>>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_host_string() {
        assert_eq!(BatteryStatus::from("Charging"), BatteryStatus::Charging);
        assert_eq!(BatteryStatus::from("Not charging"), BatteryStatus::NotCharging);
        assert_eq!(BatteryStatus::from("Levitating"), BatteryStatus::Unknown);
    }

    #[test]
    fn charging_covers_full() {
        assert!(BatteryStatus::Charging.is_charging());
        assert!(BatteryStatus::Full.is_charging());
        assert!(!BatteryStatus::Discharging.is_charging());
        assert!(!BatteryStatus::NotCharging.is_charging());
    }

    #[test]
    fn health_unrecognized_maps_to_unknown() {
        assert_eq!(BatteryHealth::from("Good"), BatteryHealth::Good);
        assert_eq!(BatteryHealth::from("Over voltage"), BatteryHealth::OverVoltage);
        assert_eq!(BatteryHealth::from("Warm"), BatteryHealth::Unknown);
        assert_eq!(BatteryHealth::from(""), BatteryHealth::Unknown);
    }

    #[test]
    fn source_labels() {
        assert_eq!(ChargingSource::Ac.to_string(), "AC");
        assert_eq!(ChargingSource::None.to_string(), "Not charging");
    }
}
