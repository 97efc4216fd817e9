use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use derive_more::Deref;
use futures::Stream;
use log::{debug, warn};

use super::battery::{Battery, BatteryHealth, BatteryInfo, BatteryStatus, ChargingSource};
use crate::Error;

pub const ROOT: &str = "/sys/class/power_supply";

mod keys {
    pub const TYPE:        &str = "POWER_SUPPLY_TYPE";
    pub const ONLINE:      &str = "POWER_SUPPLY_ONLINE";
    pub const STATUS:      &str = "POWER_SUPPLY_STATUS";
    pub const HEALTH:      &str = "POWER_SUPPLY_HEALTH";
    pub const CAPACITY:    &str = "POWER_SUPPLY_CAPACITY";
    pub const CHARGE_NOW:  &str = "POWER_SUPPLY_CHARGE_NOW";
    pub const CHARGE_FULL: &str = "POWER_SUPPLY_CHARGE_FULL";
    pub const ENERGY_NOW:  &str = "POWER_SUPPLY_ENERGY_NOW";
    pub const ENERGY_FULL: &str = "POWER_SUPPLY_ENERGY_FULL";
    pub const TEMP:        &str = "POWER_SUPPLY_TEMP";
    pub const VOLTAGE_NOW: &str = "POWER_SUPPLY_VOLTAGE_NOW";
}

/// One `uevent` read. Every field of a reply is derived from the same map,
/// so two fields never come from different reads.
#[derive(Debug, Deref)]
pub struct Snapshot(HashMap<String, String>);

impl Snapshot {
    fn parse(raw: &str) -> Snapshot {
        Snapshot(
            raw.lines()
                .filter_map(|line| line.split_once('='))
                .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
                .collect(),
        )
    }

    fn string(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }

    fn int(&self, key: &str) -> Result<i64, Error> {
        let raw = self
            .string(key)
            .ok_or_else(|| Error::unavailable(format!("snapshot is missing {key}")))?;

        raw.parse()
            .map_err(|_| Error::unavailable(format!("{key} is not an integer - `{raw}`")))
    }

    fn status(&self) -> Result<BatteryStatus, Error> {
        self.string(keys::STATUS)
            .map(BatteryStatus::from)
            .ok_or_else(|| Error::unavailable(format!("snapshot is missing {}", keys::STATUS)))
    }

    fn health(&self) -> BatteryHealth {
        self.string(keys::HEALTH).map(BatteryHealth::from).unwrap_or(BatteryHealth::Unknown)
    }

    /// Raw charge counters, `CHARGE_*` winning over the energy pair.
    /// Both halves come from this snapshot or not at all.
    fn charge_pair(&self) -> Option<(i64, i64)> {
        let pair = |now, full| Some((self.int(now).ok()?, self.int(full).ok()?));

        pair(keys::CHARGE_NOW, keys::CHARGE_FULL).or_else(|| pair(keys::ENERGY_NOW, keys::ENERGY_FULL))
    }

    fn temperature(&self) -> Result<f32, Error> {
        self.int(keys::TEMP).map(|tenths| tenths as f32 / 10.0)
    }

    fn voltage_millivolts(&self) -> Result<u32, Error> {
        self.int(keys::VOLTAGE_NOW).map(|microvolts| (microvolts / 1000).max(0) as u32)
    }
}

/// Level accessor behind one interface, picked per call by probing which
/// keys the snapshot actually carries.
trait Gauge {
    fn level(&self, snapshot: &Snapshot) -> Result<u8, Error>;
}

/// Hosts that report a percentage directly.
struct CapacityGauge;

/// Hosts that only expose the raw charge counters.
struct ChargeRatio;

impl Gauge for CapacityGauge {
    fn level(&self, snapshot: &Snapshot) -> Result<u8, Error> {
        snapshot.int(keys::CAPACITY).map(|raw| raw.clamp(0, 100) as u8)
    }
}

impl Gauge for ChargeRatio {
    fn level(&self, snapshot: &Snapshot) -> Result<u8, Error> {
        let (now, full) = snapshot
            .charge_pair()
            .ok_or_else(|| Error::unavailable("snapshot carries no charge counters"))?;

        ratio_percent(now, full)
    }
}

fn gauge_for(snapshot: &Snapshot) -> &'static dyn Gauge {
    if snapshot.contains_key(keys::CAPACITY) { &CapacityGauge } else { &ChargeRatio }
}

fn ratio_percent(now: i64, full: i64) -> Result<u8, Error> {
    if full <= 0 {
        return Err(Error::unavailable(format!("full charge scale is {full}")));
    }

    Ok((now as f64 / full as f64 * 100.0).round().clamp(0.0, 100.0) as u8)
}

/// The record's level is recomputed from the raw counters of the snapshot;
/// the direct percentage key only stands in when the host omits them.
fn record_level(snapshot: &Snapshot) -> Result<u8, Error> {
    match snapshot.charge_pair() {
        Some((now, full)) => ratio_percent(now, full),
        None              => CapacityGauge.level(snapshot),
    }
}

#[derive(Debug, Clone)]
pub struct SysfsBattery {
    root: PathBuf,
}

impl Default for SysfsBattery {
    fn default() -> Self {
        Self::at(ROOT)
    }
}

impl SysfsBattery {
    pub fn at<P>(root: P) -> Self
        where
        P: Into<PathBuf>
    {
        Self { root: root.into() }
    }

    fn supplies(&self) -> Result<Vec<PathBuf>, Error> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| Error::unavailable(format!("cannot read {} - {e}", self.root.display())))?;

        let mut supplies: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();

        supplies.sort();

        Ok(supplies)
    }

    fn snapshot_of(supply: &Path) -> Result<Snapshot, Error> {
        fs::read_to_string(supply.join("uevent"))
            .map(|raw| Snapshot::parse(&raw))
            .map_err(|e| Error::unavailable(format!("cannot read {} - {e}", supply.display())))
    }

    fn battery_snapshot(&self) -> Result<Snapshot, Error> {
        for supply in self.supplies()? {
            let snapshot = match Self::snapshot_of(&supply) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping unreadable supply {}: {e}", supply.display());
                    continue;
                }
            };

            if snapshot.string(keys::TYPE) == Some("Battery") {
                debug!("Using battery supply {}", supply.display());
                return Ok(snapshot);
            }
        }

        Err(Error::unavailable(format!("no battery supply under {}", self.root.display())))
    }

    fn charging_source(&self) -> ChargingSource {
        let mut usb = false;
        let mut wireless = false;

        let supplies = match self.supplies() {
            Ok(supplies) => supplies,
            Err(_) => return ChargingSource::None,
        };

        for supply in supplies {
            let Ok(snapshot) = Self::snapshot_of(&supply) else { continue };

            if snapshot.string(keys::ONLINE) != Some("1") {
                continue;
            }

            match snapshot.string(keys::TYPE) {
                Some("Mains")                         => return ChargingSource::Ac,
                Some(t) if t.starts_with("USB")       => usb = true,
                Some("Wireless")                      => wireless = true,
                _ => {}
            }
        }

        if usb {
            ChargingSource::Usb
        } else if wireless {
            ChargingSource::Wireless
        } else {
            ChargingSource::None
        }
    }
}

#[async_trait]
impl Battery for SysfsBattery {
    async fn battery_level(&self) -> Result<u8, Error> {
        let snapshot = self.battery_snapshot()?;

        gauge_for(&snapshot).level(&snapshot)
    }

    async fn battery_info(&self) -> Result<BatteryInfo, Error> {
        let snapshot = self.battery_snapshot()?;
        let status = snapshot.status()?;

        Ok(BatteryInfo {
            level:              record_level(&snapshot)?,
            is_charging:        status.is_charging(),
            source:             self.charging_source(),
            health:             snapshot.health(),
            temperature:        snapshot.temperature()?,
            voltage_millivolts: snapshot.voltage_millivolts()?,
        })
    }

    async fn battery_stream(&self, every: Duration) -> Result<Pin<Box<dyn Stream<Item = BatteryInfo> + Send>>, Error> {
        let probe = self.clone();
        let ticker = tokio::time::interval(every);

        let stream = futures::stream::unfold((probe, ticker), |(probe, mut ticker)| async move {
            loop {
                ticker.tick().await;

                match probe.battery_info().await {
                    Ok(info) => break Some((info, (probe, ticker))),
                    Err(e)   => warn!("Couldn't read battery state: {e}"),
                }
            }
        });

        Ok(Box::pin(stream) as _)
    }
}
