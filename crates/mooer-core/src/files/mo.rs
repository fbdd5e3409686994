//! `.mo` single-preset export.
//!
//! ```text
//! 0x000..0x200  header   (opaque, preserved)
//! 0x200..0x400  preset   (512-byte preset body)
//! 0x400..0x800  padding  (preserved)
//! ```

use crate::preset::{CodecError, Preset};
use crate::protocol::constants::{
    MO_FILE_SIZE, MO_HEADER_SIZE, MO_PADDING_SIZE, MO_PRESET_OFFSET, PRESET_SIZE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoFile {
    pub header: [u8; MO_HEADER_SIZE],
    pub preset: Preset,
    pub padding: [u8; MO_PADDING_SIZE],
}

impl MoFile {
    /// Wrap a preset with a zeroed header and padding, as the editor exports.
    pub fn new(preset: Preset) -> Self {
        Self {
            header: [0u8; MO_HEADER_SIZE],
            preset,
            padding: [0u8; MO_PADDING_SIZE],
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() != MO_FILE_SIZE {
            return Err(CodecError::TruncatedData {
                what: ".mo file",
                expected: MO_FILE_SIZE,
                actual: data.len(),
            });
        }

        let preset_end = MO_PRESET_OFFSET + PRESET_SIZE;
        let preset = Preset::decode(0, &data[MO_PRESET_OFFSET..preset_end])?;

        let mut header = [0u8; MO_HEADER_SIZE];
        header.copy_from_slice(&data[..MO_HEADER_SIZE]);
        let mut padding = [0u8; MO_PADDING_SIZE];
        padding.copy_from_slice(&data[preset_end..]);

        Ok(Self {
            header,
            preset,
            padding,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MO_FILE_SIZE);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.preset.encode());
        out.extend_from_slice(&self.padding);
        out
    }
}
