use std::io::Read;

use byteorder::ReadBytesExt;

use crate::error::Error;

pub const MAGIC: &[u8; 3] = b"REQ";

/// A named call crossing the socket: `MAGIC`, a length byte, then the
/// UTF-8 operation name.
#[derive(Debug, PartialEq, Eq)]
pub struct Call {
    pub name: String,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Call { name: name.into() }
    }

    /// Parses one call, the `MAGIC` prefix already consumed.
    pub fn read(r: &mut impl Read) -> Result<Self, Error> {
        let len = r.read_u8()? as usize;

        if len == 0 {
            return Err(Error::Length { expected: 1, actual: 0 })
        }

        let mut raw = vec![0; len];
        r.read_exact(&mut raw)?;

        String::from_utf8(raw)
            .map(|name| Call { name })
            .map_err(|e| {
                let at = e.utf8_error().valid_up_to();
                Error::Parse { expected: "utf-8 operation name", position: at, actual: e.as_bytes()[at] }
            })
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let name = self.name.as_bytes();

        let mut vec = Vec::with_capacity(MAGIC.len() + 1 + name.len());
        vec.extend_from_slice(MAGIC);
        vec.push(name.len().min(u8::MAX as usize) as u8);
        vec.extend_from_slice(&name[..name.len().min(u8::MAX as usize)]);

        vec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn reads_back_what_it_wrote() {
        let frame = Call::new("getBatteryInfo").to_le_bytes();

        assert_eq!(&frame[..3], MAGIC);

        let call = Call::read(&mut Cursor::new(&frame[3..])).unwrap();

        assert_eq!(call.name, "getBatteryInfo");
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            Call::read(&mut Cursor::new([0u8])),
            Err(Error::Length { .. }),
        ));
    }

    #[test]
    fn truncated_frame_is_an_io_error() {
        assert!(matches!(
            Call::read(&mut Cursor::new([10u8, b'g', b'e', b't'])),
            Err(Error::Io(_)),
        ));
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        assert!(matches!(
            Call::read(&mut Cursor::new([2u8, 0xFF, 0xFE])),
            Err(Error::Parse { .. }),
        ));
    }
}
