//! `.mbf` full-device backup archive.
//!
//! ```text
//! manufacturer (8, ASCII) | model (32, ASCII) | version (u32 LE)
//! 199 × entry (0x222):  preset (512) | trailer (34, opaque)
//! ```
//! An entry whose preset body is all zero is an empty slot.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::preset::{CodecError, Preset, check_slot};
use crate::protocol::constants::{
    MBF_DEFAULT_MANUFACTURER, MBF_DEFAULT_MODEL, MBF_DEFAULT_VERSION,
    MBF_ENTRY_COUNT, MBF_ENTRY_SIZE, MBF_HEADER_SIZE, MBF_MANUFACTURER_SIZE, MBF_MODEL_NAME_SIZE,
    PRESET_SIZE,
};

pub const ENTRY_TRAILER_LEN: usize = MBF_ENTRY_SIZE - PRESET_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub preset: Option<Preset>,
    pub trailer: [u8; ENTRY_TRAILER_LEN],
}

impl BackupEntry {
    pub fn empty() -> Self {
        Self {
            preset: None,
            trailer: [0u8; ENTRY_TRAILER_LEN],
        }
    }

    pub fn with_preset(preset: Preset) -> Self {
        Self {
            preset: Some(preset),
            trailer: [0u8; ENTRY_TRAILER_LEN],
        }
    }

    fn decode(slot: u8, data: &[u8]) -> Result<Self, CodecError> {
        let (body, rest) = data.split_at(PRESET_SIZE);
        let preset = if body.iter().all(|&b| b == 0) {
            None
        } else {
            Some(Preset::decode(slot, body)?)
        };
        let mut trailer = [0u8; ENTRY_TRAILER_LEN];
        trailer.copy_from_slice(rest);
        Ok(Self { preset, trailer })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match &self.preset {
            Some(preset) => out.extend_from_slice(&preset.encode()),
            None => out.extend_from_slice(&[0u8; PRESET_SIZE]),
        }
        out.extend_from_slice(&self.trailer);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub manufacturer: String,
    pub model_name: String,
    pub version: u32,
    /// Always exactly 199 entries, indexed by slot.
    entries: Vec<BackupEntry>,
    /// Bytes past the last entry, kept for byte-exact re-encode.
    pub trailing: Vec<u8>,
}

impl Default for BackupArchive {
    fn default() -> Self {
        Self {
            manufacturer: MBF_DEFAULT_MANUFACTURER.to_string(),
            model_name: MBF_DEFAULT_MODEL.to_string(),
            version: MBF_DEFAULT_VERSION,
            entries: vec![BackupEntry::empty(); MBF_ENTRY_COUNT],
            trailing: Vec::new(),
        }
    }
}

impl BackupArchive {
    /// Build an archive from presets, each placed at its own slot.
    pub fn from_presets(presets: impl IntoIterator<Item = Preset>) -> Result<Self, CodecError> {
        let mut archive = Self::default();
        for preset in presets {
            archive.set(preset.slot, Some(preset))?;
        }
        Ok(archive)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < MBF_HEADER_SIZE {
            return Err(CodecError::TruncatedData {
                what: ".mbf header",
                expected: MBF_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let manufacturer = ascii_field(&data[..MBF_MANUFACTURER_SIZE]);
        let model_end = MBF_MANUFACTURER_SIZE + MBF_MODEL_NAME_SIZE;
        let model_name = ascii_field(&data[MBF_MANUFACTURER_SIZE..model_end]);

        let mut cursor = Cursor::new(&data[model_end..MBF_HEADER_SIZE]);
        let version = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| CodecError::TruncatedData {
                what: ".mbf header",
                expected: MBF_HEADER_SIZE,
                actual: data.len(),
            })?;

        let body = &data[MBF_HEADER_SIZE..];
        let complete = body.len() / MBF_ENTRY_SIZE;
        if complete < MBF_ENTRY_COUNT {
            return Err(CodecError::TruncatedArchive {
                entries: complete,
                expected: MBF_ENTRY_COUNT,
            });
        }

        let entries = body
            .chunks_exact(MBF_ENTRY_SIZE)
            .take(MBF_ENTRY_COUNT)
            .enumerate()
            .map(|(slot, entry)| BackupEntry::decode(slot as u8, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let trailing = body[MBF_ENTRY_COUNT * MBF_ENTRY_SIZE..].to_vec();

        Ok(Self {
            manufacturer,
            model_name,
            version,
            entries,
            trailing,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let len = MBF_HEADER_SIZE + MBF_ENTRY_COUNT * MBF_ENTRY_SIZE + self.trailing.len();
        let mut out = Vec::with_capacity(len);
        push_ascii(&mut out, &self.manufacturer, MBF_MANUFACTURER_SIZE);
        push_ascii(&mut out, &self.model_name, MBF_MODEL_NAME_SIZE);
        out.extend_from_slice(&self.version.to_le_bytes());
        for entry in &self.entries {
            entry.encode_into(&mut out);
        }
        out.extend_from_slice(&self.trailing);
        out
    }

    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    pub fn get(&self, slot: u8) -> Option<&Preset> {
        self.entries.get(slot as usize)?.preset.as_ref()
    }

    /// Place (or clear) the preset at `slot`. The preset's own slot is updated.
    pub fn set(&mut self, slot: u8, preset: Option<Preset>) -> Result<(), CodecError> {
        check_slot(slot, (MBF_ENTRY_COUNT - 1) as u8)?;
        let entry = &mut self.entries[slot as usize];
        entry.preset = preset.map(|mut p| {
            p.slot = slot;
            p
        });
        Ok(())
    }

    /// Occupied entries in slot order.
    pub fn presets(&self) -> impl Iterator<Item = &Preset> {
        self.entries.iter().filter_map(|e| e.preset.as_ref())
    }

    pub fn occupied(&self) -> usize {
        self.presets().count()
    }
}

fn ascii_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn push_ascii(out: &mut Vec<u8>, value: &str, width: usize) {
    let start = out.len();
    out.extend(value.bytes().map(|b| if b.is_ascii() { b } else { b'?' }).take(width));
    out.resize(start + width, 0);
}
