//! Preset codec - the 512-byte on-device patch structure.
//!
//! Layout (offsets relative to preset start):
//! ```text
//! ┌──────────────┬────────┬──────┬────┬────┬─────┬─────┬────┬────┬─────┬───────┬────────┬──────┐
//! │ Effect Order │ Size   │ Name │ FX │ OD │ AMP │ CAB │ NS │ EQ │ MOD │ DELAY │ REVERB │ Tail │
//! │ 0x00 / 10B   │ BE u16 │ 14B  │    │    │     │     │    │    │     │       │        │      │
//! └──────────────┴────────┴──────┴────┴────┴─────┴─────┴────┴────┴─────┴───────┴────────┴──────┘
//! ```
//! The size field is big-endian, unlike the little-endian frame header.

pub mod modules;

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::protocol::constants::{
    EFFECT_ORDER_LEN, MAX_PRESET_SLOT, NAME_LEN, OFF_EFFECT_ORDER, OFF_NAME, OFF_SIZE, OFF_TAIL,
    PRESET_DECLARED_SIZE, PRESET_SIZE,
};

pub use modules::{
    AmpModule, CabModule, DelayModule, EffectModule, EqModule, FxModule, ModuleCodec, ModuleKind,
    ModulationModule, NoiseGateModule, OdModule, ReverbModule,
};

/// Bytes following the REVERB block that carry undocumented state.
pub const PRESET_TAIL_LEN: usize = PRESET_SIZE - OFF_TAIL;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated {what}: expected {expected} bytes, got {actual}")]
    TruncatedData {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Truncated archive: {entries} complete entries, expected {expected}")]
    TruncatedArchive { entries: usize, expected: usize },

    #[error("Size mismatch at offset 0x{offset:03X}: expected {expected}, got {actual}")]
    SizeMismatch {
        offset: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Bad magic: expected {expected:02X?}, got {actual:02X?}")]
    BadMagic { expected: Vec<u8>, actual: Vec<u8> },

    #[error("Invalid slot {slot}: max {max}")]
    InvalidSlot { slot: u8, max: u8 },

    #[error("Invalid {field}: {value} exceeds {max}")]
    InvalidValue {
        field: &'static str,
        value: usize,
        max: usize,
    },
}

/// Reject slots beyond the device range.
pub fn check_slot(slot: u8, max: u8) -> Result<u8, CodecError> {
    if slot > max {
        return Err(CodecError::InvalidSlot { slot, max });
    }
    Ok(slot)
}

/// One complete patch definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    /// Device slot this preset was read from or is destined for.
    pub slot: u8,
    pub effect_order: [u8; EFFECT_ORDER_LEN],
    /// Name field as stored, including anything after the terminator.
    name: [u8; NAME_LEN],
    pub fx: FxModule,
    pub od: OdModule,
    pub amp: AmpModule,
    pub cab: CabModule,
    pub ns: NoiseGateModule,
    pub eq: EqModule,
    pub modulation: ModulationModule,
    pub delay: DelayModule,
    pub reverb: ReverbModule,
    /// Bytes 0x9F..0x200, preserved verbatim.
    pub tail: [u8; PRESET_TAIL_LEN],
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            slot: 0,
            effect_order: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
            name: [0u8; NAME_LEN],
            fx: FxModule::default(),
            od: OdModule::default(),
            amp: AmpModule::default(),
            cab: CabModule::default(),
            ns: NoiseGateModule::default(),
            eq: EqModule::default(),
            modulation: ModulationModule::default(),
            delay: DelayModule::default(),
            reverb: ReverbModule::default(),
            tail: [0u8; PRESET_TAIL_LEN],
        }
    }
}

impl Preset {
    pub fn named(name: &str) -> Self {
        let mut preset = Self::default();
        preset.set_name(name);
        preset
    }

    /// Decode a preset body. Extra bytes past 512 are ignored.
    pub fn decode(slot: u8, data: &[u8]) -> Result<Self, CodecError> {
        check_slot(slot, MAX_PRESET_SLOT)?;
        if data.len() < PRESET_SIZE {
            return Err(CodecError::TruncatedData {
                what: "preset",
                expected: PRESET_SIZE,
                actual: data.len(),
            });
        }
        let data = &data[..PRESET_SIZE];

        let declared = BigEndian::read_u16(&data[OFF_SIZE..OFF_SIZE + 2]);
        if declared != PRESET_DECLARED_SIZE {
            return Err(CodecError::SizeMismatch {
                offset: OFF_SIZE,
                expected: PRESET_DECLARED_SIZE as usize,
                actual: declared as usize,
            });
        }

        let mut effect_order = [0u8; EFFECT_ORDER_LEN];
        effect_order.copy_from_slice(&data[OFF_EFFECT_ORDER..OFF_EFFECT_ORDER + EFFECT_ORDER_LEN]);

        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&data[OFF_NAME..OFF_NAME + NAME_LEN]);

        let block = move |kind: ModuleKind| &data[kind.offset()..kind.offset() + kind.size()];

        let mut tail = [0u8; PRESET_TAIL_LEN];
        tail.copy_from_slice(&data[OFF_TAIL..]);

        Ok(Self {
            slot,
            effect_order,
            name,
            fx: FxModule::decode(block(ModuleKind::Fx))?,
            od: OdModule::decode(block(ModuleKind::Od))?,
            amp: AmpModule::decode(block(ModuleKind::Amp))?,
            cab: CabModule::decode(block(ModuleKind::Cab))?,
            ns: NoiseGateModule::decode(block(ModuleKind::Ns))?,
            eq: EqModule::decode(block(ModuleKind::Eq))?,
            modulation: ModulationModule::decode(block(ModuleKind::Mod))?,
            delay: DelayModule::decode(block(ModuleKind::Delay))?,
            reverb: ReverbModule::decode(block(ModuleKind::Reverb))?,
            tail,
        })
    }

    /// Encode to exactly 512 bytes. The size field is always recomputed.
    pub fn encode(&self) -> [u8; PRESET_SIZE] {
        let mut buf = [0u8; PRESET_SIZE];

        buf[OFF_EFFECT_ORDER..OFF_EFFECT_ORDER + EFFECT_ORDER_LEN]
            .copy_from_slice(&self.effect_order);
        BigEndian::write_u16(&mut buf[OFF_SIZE..OFF_SIZE + 2], PRESET_DECLARED_SIZE);
        buf[OFF_NAME..OFF_NAME + NAME_LEN].copy_from_slice(&self.name);

        for module in self.modules() {
            let kind = module.kind();
            module.encode_into(&mut buf[kind.offset()..kind.offset() + kind.size()]);
        }

        buf[OFF_TAIL..].copy_from_slice(&self.tail);
        buf
    }

    /// Display name: the field up to the first NUL, lossily decoded.
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Raw 14-byte name field.
    pub fn name_bytes(&self) -> &[u8; NAME_LEN] {
        &self.name
    }

    /// Rebuild the name field: ASCII, truncated to 14 bytes, NUL padded.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0u8; NAME_LEN];
        for (dst, c) in self.name.iter_mut().zip(name.chars()) {
            *dst = if c.is_ascii() && c != '\0' { c as u8 } else { b'?' };
        }
    }

    /// Whether the slot holds a user-visible patch.
    pub fn is_named(&self) -> bool {
        !self.name().trim().is_empty()
    }

    pub fn module(&self, kind: ModuleKind) -> EffectModule {
        match kind {
            ModuleKind::Fx => EffectModule::Fx(self.fx.clone()),
            ModuleKind::Od => EffectModule::Od(self.od.clone()),
            ModuleKind::Amp => EffectModule::Amp(self.amp.clone()),
            ModuleKind::Cab => EffectModule::Cab(self.cab.clone()),
            ModuleKind::Ns => EffectModule::Ns(self.ns.clone()),
            ModuleKind::Eq => EffectModule::Eq(self.eq.clone()),
            ModuleKind::Mod => EffectModule::Mod(self.modulation.clone()),
            ModuleKind::Delay => EffectModule::Delay(self.delay.clone()),
            ModuleKind::Reverb => EffectModule::Reverb(self.reverb.clone()),
        }
    }

    pub fn set_module(&mut self, module: EffectModule) {
        match module {
            EffectModule::Fx(m) => self.fx = m,
            EffectModule::Od(m) => self.od = m,
            EffectModule::Amp(m) => self.amp = m,
            EffectModule::Cab(m) => self.cab = m,
            EffectModule::Ns(m) => self.ns = m,
            EffectModule::Eq(m) => self.eq = m,
            EffectModule::Mod(m) => self.modulation = m,
            EffectModule::Delay(m) => self.delay = m,
            EffectModule::Reverb(m) => self.reverb = m,
        }
    }

    /// All nine modules in block order.
    pub fn modules(&self) -> [EffectModule; 9] {
        ModuleKind::ALL.map(|kind| self.module(kind))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Preset {:03} \"{}\"", self.slot, self.name())?;
        writeln!(f, "  order: {:?}", self.effect_order)?;
        for module in self.modules() {
            writeln!(
                f,
                "  {:<6} {} type={:3} header=0x{:02X}",
                module.kind().name(),
                if module.is_enabled() { "on " } else { "off" },
                module.type_id(),
                module.header(),
            )?;
        }
        Ok(())
    }
}
