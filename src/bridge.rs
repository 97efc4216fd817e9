use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use phf::{phf_map, Map};

use crate::host::battery::{Battery, BatteryHealth, BatteryInfo, ChargingSource};
use crate::host::sysfs::SysfsBattery;
use crate::Error;

pub const MAGIC: &[u8; 3] = b"RSP";

/// Closed set of operations a caller can name.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    BatteryLevel,
    BatteryInfo,
}

static OPERATIONS: Map<&'static str, Operation> = phf_map! {
    "getBatteryLevel" => Operation::BatteryLevel,
    "getBatteryInfo"  => Operation::BatteryInfo,
};

pub fn appraise(name: &str) -> Option<Operation> {
    OPERATIONS.get(name).copied()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Level(u8),
    Info(BatteryInfo),
    Unavailable(String),
    NotImplemented(String),
}

impl From<BatteryInfo> for Reply {
    fn from(info: BatteryInfo) -> Reply { Reply::Info(info) }
}

impl Reply {
    fn id(&self) -> u8 {
        match self {
            Reply::Level(_)          => 11,
            Reply::Info(_)           => 12,
            Reply::Unavailable(_)    => 250,
            Reply::NotImplemented(_) => 251,
        }
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut vec = MAGIC.to_vec();
        vec.push(self.id());

        match self {
            Reply::Level(v) => {
                vec.push(*v);
            }
            Reply::Info(info) => {
                vec.push(info.level);
                vec.push(info.is_charging as u8);
                vec.push(source_id(info.source));
                vec.push(health_id(info.health));
                vec.extend_from_slice(&info.temperature.to_le_bytes());
                vec.extend_from_slice(&info.voltage_millivolts.to_le_bytes());
            }
            Reply::Unavailable(msg) | Reply::NotImplemented(msg) => {
                vec.extend_from_slice(&(msg.len() as u16).to_le_bytes());
                vec.extend_from_slice(msg.as_bytes());
            }
        }

        vec
    }

    /// Parses one reply, the `MAGIC` prefix already consumed.
    pub fn read(r: &mut impl Read) -> Result<Reply, Error> {
        let id = r.read_u8()?;

        match id {
            11 => Ok(Reply::Level(r.read_u8()?)),
            12 => {
                Ok(Reply::Info(BatteryInfo {
                    level:              r.read_u8()?,
                    is_charging:        r.read_u8()? != 0,
                    source:             source_from(r.read_u8()?)?,
                    health:             health_from(r.read_u8()?)?,
                    temperature:        r.read_f32::<LittleEndian>()?,
                    voltage_millivolts: r.read_u32::<LittleEndian>()?,
                }))
            }
            250 | 251 => {
                let len = r.read_u16::<LittleEndian>()? as usize;

                let mut raw = vec![0; len];
                r.read_exact(&mut raw)?;

                let msg = String::from_utf8_lossy(&raw).into_owned();

                Ok(match id {
                    250 => Reply::Unavailable(msg),
                    _   => Reply::NotImplemented(msg),
                })
            }
            _ => Err(Error::Parse { expected: "11,12,250,251", position: 0, actual: id }),
        }
    }
}

fn source_id(source: ChargingSource) -> u8 {
    match source {
        ChargingSource::None     => 0,
        ChargingSource::Ac       => 1,
        ChargingSource::Usb      => 2,
        ChargingSource::Wireless => 3,
    }
}

fn health_id(health: BatteryHealth) -> u8 {
    match health {
        BatteryHealth::Unknown            => 0,
        BatteryHealth::Good               => 1,
        BatteryHealth::Overheat           => 2,
        BatteryHealth::Dead               => 3,
        BatteryHealth::OverVoltage        => 4,
        BatteryHealth::UnspecifiedFailure => 5,
        BatteryHealth::Cold               => 6,
    }
}

fn source_from(id: u8) -> Result<ChargingSource, Error> {
    match id {
        0 => Ok(ChargingSource::None),
        1 => Ok(ChargingSource::Ac),
        2 => Ok(ChargingSource::Usb),
        3 => Ok(ChargingSource::Wireless),
        _ => Err(Error::Parse { expected: "0,1,2,3", position: 2, actual: id }),
    }
}

fn health_from(id: u8) -> Result<BatteryHealth, Error> {
    match id {
        0 => Ok(BatteryHealth::Unknown),
        1 => Ok(BatteryHealth::Good),
        2 => Ok(BatteryHealth::Overheat),
        3 => Ok(BatteryHealth::Dead),
        4 => Ok(BatteryHealth::OverVoltage),
        5 => Ok(BatteryHealth::UnspecifiedFailure),
        6 => Ok(BatteryHealth::Cold),
        _ => Err(Error::Parse { expected: "0..=6", position: 3, actual: id }),
    }
}

pub struct Bridge {
    host: SysfsBattery,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::with_host(SysfsBattery::default())
    }
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(host: SysfsBattery) -> Self {
        Self { host }
    }

    /// Resolves a named call to a typed reply. Host failures fold into
    /// `Unavailable` with their diagnostic text, unknown names into
    /// `NotImplemented`; the caller never sees a partial payload.
    pub async fn call(&self, name: &str) -> Reply {
        let Some(operation) = appraise(name) else {
            debug!("Unrecognized operation requested - `{name}`");
            return Reply::NotImplemented(name.to_owned());
        };

        let result = match operation {
            Operation::BatteryLevel => self.host.battery_level().await.map(Reply::Level),
            Operation::BatteryInfo  => self.host.battery_info().await.map(Reply::from),
        };

        match result {
            Ok(reply)                       => reply,
            Err(Error::Unavailable(reason)) => Reply::Unavailable(reason),
            Err(other)                      => Reply::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    fn bridge_over(uevent: Option<&str>) -> (TempDir, Bridge) {
        let tmp = TempDir::new().unwrap();

        if let Some(uevent) = uevent {
            let dir = tmp.path().join("BAT0");
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("uevent"), uevent).unwrap();
        }

        let bridge = Bridge::with_host(SysfsBattery::at(tmp.path()));

        (tmp, bridge)
    }

    #[tokio::test]
    async fn unrecognized_name_is_not_implemented() {
        let (_tmp, bridge) = bridge_over(None);

        match bridge.call("getFoo").await {
            Reply::NotImplemented(name) => assert_eq!(name, "getFoo"),
            other => panic!("expected NotImplemented, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn known_call_with_no_battery_is_unavailable() {
        let (_tmp, bridge) = bridge_over(None);

        assert!(matches!(bridge.call("getBatteryLevel").await, Reply::Unavailable(_)));
        assert!(matches!(bridge.call("getBatteryInfo").await, Reply::Unavailable(_)));
    }

    #[tokio::test]
    async fn level_call_reads_the_host() {
        let (_tmp, bridge) = bridge_over(Some(
            "POWER_SUPPLY_TYPE=Battery\nPOWER_SUPPLY_CAPACITY=64\n",
        ));

        match bridge.call("getBatteryLevel").await {
            Reply::Level(level) => assert_eq!(level, 64),
            other => panic!("expected Level, got {other:?}"),
        }
    }

    #[test]
    fn level_reply_encoding() {
        assert_eq!(Reply::Level(80).to_le_bytes(), vec![b'R', b'S', b'P', 11, 80]);
    }

    #[test]
    fn error_reply_encoding_carries_the_message() {
        assert_eq!(
            Reply::Unavailable("no".to_owned()).to_le_bytes(),
            vec![b'R', b'S', b'P', 250, 2, 0, b'n', b'o'],
        );
    }

    #[test]
    fn info_reply_encoding() {
        let info = BatteryInfo {
            level:              80,
            is_charging:        true,
            source:             ChargingSource::Usb,
            health:             BatteryHealth::Good,
            temperature:        28.5,
            voltage_millivolts: 4000,
        };

        assert_eq!(Reply::from(info).to_le_bytes(), vec![
            b'R', b'S', b'P', 12,
            80, 1, 2, 1,
            0x00, 0x00, 0xE4, 0x41,
            0xA0, 0x0F, 0x00, 0x00,
        ]);
    }

    #[test]
    fn info_reply_reads_back() {
        use std::io::Cursor;

        let info = BatteryInfo {
            level:              80,
            is_charging:        true,
            source:             ChargingSource::Usb,
            health:             BatteryHealth::Good,
            temperature:        28.5,
            voltage_millivolts: 4000,
        };

        let frame = Reply::from(info).to_le_bytes();

        assert_eq!(Reply::read(&mut Cursor::new(&frame[MAGIC.len()..])).unwrap(), Reply::Info(info));
    }

    #[test]
    fn unknown_reply_id_is_a_parse_error() {
        use std::io::Cursor;

        assert!(matches!(
            Reply::read(&mut Cursor::new([99u8])),
            Err(Error::Parse { .. }),
        ));
    }
}
