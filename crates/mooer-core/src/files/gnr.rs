//! `.gnr` impulse-response / cabinet container.
//!
//! ```text
//! magic "mooerge\0" (8) | info size (u32 LE) | info (info size) | IR data (rest)
//! ```
//! The IR payload is opaque here; it is uploaded to the device as-is.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::preset::CodecError;
use crate::protocol::constants::{GNR_HEADER_LEN, GNR_MAGIC};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrContainer {
    pub info: Vec<u8>,
    pub ir_data: Vec<u8>,
}

impl IrContainer {
    pub fn new(info: Vec<u8>, ir_data: Vec<u8>) -> Self {
        Self { info, ir_data }
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < GNR_HEADER_LEN {
            return Err(CodecError::TruncatedData {
                what: ".gnr header",
                expected: GNR_HEADER_LEN,
                actual: data.len(),
            });
        }
        if &data[..GNR_MAGIC.len()] != GNR_MAGIC {
            return Err(CodecError::BadMagic {
                expected: GNR_MAGIC.to_vec(),
                actual: data[..GNR_MAGIC.len()].to_vec(),
            });
        }

        let mut cursor = Cursor::new(&data[GNR_MAGIC.len()..GNR_HEADER_LEN]);
        let info_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| CodecError::TruncatedData {
                what: ".gnr header",
                expected: GNR_HEADER_LEN,
                actual: data.len(),
            })? as usize;

        let info_end = GNR_HEADER_LEN.saturating_add(info_size);
        if info_end > data.len() {
            return Err(CodecError::TruncatedData {
                what: ".gnr info section",
                expected: info_end,
                actual: data.len(),
            });
        }

        Ok(Self {
            info: data[GNR_HEADER_LEN..info_end].to_vec(),
            ir_data: data[info_end..].to_vec(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let info_size = u32::try_from(self.info.len()).map_err(|_| CodecError::InvalidValue {
            field: ".gnr info size",
            value: self.info.len(),
            max: u32::MAX as usize,
        })?;
        let mut out = Vec::with_capacity(self.data_offset() + self.ir_data.len());
        out.extend_from_slice(GNR_MAGIC);
        out.extend_from_slice(&info_size.to_le_bytes());
        out.extend_from_slice(&self.info);
        out.extend_from_slice(&self.ir_data);
        Ok(out)
    }

    /// File offset where the IR payload begins.
    pub fn data_offset(&self) -> usize {
        GNR_HEADER_LEN + self.info.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid() {
        let mut data = GNR_MAGIC.to_vec();
        data.extend_from_slice(&[8, 0, 0, 0]);
        data.extend_from_slice(b"testinfo");
        data.extend_from_slice(&[0x42; 100]);

        let ir = IrContainer::decode(&data).unwrap();
        assert_eq!(ir.info, b"testinfo");
        assert_eq!(ir.ir_data, vec![0x42; 100]);
        assert_eq!(ir.data_offset(), 20);
        assert_eq!(ir.encode().unwrap(), data);
    }

    #[test]
    fn test_bad_magic() {
        let data = b"badmagic\x00\x00\x00\x00";
        assert!(matches!(
            IrContainer::decode(data),
            Err(CodecError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(
            IrContainer::decode(b"short"),
            Err(CodecError::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_info_size_past_end() {
        let mut data = GNR_MAGIC.to_vec();
        data.extend_from_slice(&[0xFF, 0, 0, 0]);
        data.extend_from_slice(&[0; 10]);
        assert!(matches!(
            IrContainer::decode(&data),
            Err(CodecError::TruncatedData {
                expected: 267,
                actual: 22,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_info() {
        let ir = IrContainer::new(Vec::new(), vec![1, 2, 3]);
        let bytes = ir.encode().unwrap();
        assert_eq!(bytes.len(), 15);
        assert_eq!(IrContainer::decode(&bytes).unwrap(), ir);
    }
}
