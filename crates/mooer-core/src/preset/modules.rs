//! Fixed-layout effect module blocks.
//!
//! Every block starts with the same three bytes:
//!
//! | Byte | Meaning |
//! |------|---------|
//! | 0    | header (opaque, kept verbatim) |
//! | 1    | enabled (nonzero = on, kept verbatim) |
//! | 2    | model / type id |
//!
//! followed by the module's parameters and a reserved tail. The reserved tail
//! may hold firmware state we do not understand, so it is carried through
//! decode and encode untouched.

use std::fmt;
use std::str::FromStr;

use super::CodecError;
use crate::protocol::Command;
use crate::protocol::constants::{
    OFF_AMP, OFF_CAB, OFF_DELAY, OFF_EQ, OFF_FX, OFF_MOD, OFF_NS, OFF_OD, OFF_REVERB,
};

/// The nine processing stages of a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Fx,
    Od,
    Amp,
    Cab,
    Ns,
    Eq,
    Mod,
    Delay,
    Reverb,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 9] = [
        ModuleKind::Fx,
        ModuleKind::Od,
        ModuleKind::Amp,
        ModuleKind::Cab,
        ModuleKind::Ns,
        ModuleKind::Eq,
        ModuleKind::Mod,
        ModuleKind::Delay,
        ModuleKind::Reverb,
    ];

    /// Offset of the block inside the 512-byte preset body.
    pub const fn offset(self) -> usize {
        match self {
            ModuleKind::Fx => OFF_FX,
            ModuleKind::Od => OFF_OD,
            ModuleKind::Amp => OFF_AMP,
            ModuleKind::Cab => OFF_CAB,
            ModuleKind::Ns => OFF_NS,
            ModuleKind::Eq => OFF_EQ,
            ModuleKind::Mod => OFF_MOD,
            ModuleKind::Delay => OFF_DELAY,
            ModuleKind::Reverb => OFF_REVERB,
        }
    }

    pub const fn size(self) -> usize {
        match self {
            ModuleKind::Fx => FxModule::SIZE,
            ModuleKind::Od => OdModule::SIZE,
            ModuleKind::Amp => AmpModule::SIZE,
            ModuleKind::Cab => CabModule::SIZE,
            ModuleKind::Ns => NoiseGateModule::SIZE,
            ModuleKind::Eq => EqModule::SIZE,
            ModuleKind::Mod => ModulationModule::SIZE,
            ModuleKind::Delay => DelayModule::SIZE,
            ModuleKind::Reverb => ReverbModule::SIZE,
        }
    }

    /// Position in block order, as used in the effect order field.
    pub const fn index(self) -> u8 {
        self as u8
    }

        /// Command group used for live parameter edits.
    pub const fn command(self) -> Command {
        match self {
            ModuleKind::Fx => Command::Fx,
            ModuleKind::Od => Command::DsOd,
            ModuleKind::Amp => Command::Amp,
            ModuleKind::Cab => Command::Cab,
            ModuleKind::Ns => Command::NsGate,
            ModuleKind::Eq => Command::Eq,
            ModuleKind::Mod => Command::Mod,
            ModuleKind::Delay => Command::Delay,
            ModuleKind::Reverb => Command::Reverb,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Fx => "fx",
            ModuleKind::Od => "od",
            ModuleKind::Amp => "amp",
            ModuleKind::Cab => "cab",
            ModuleKind::Ns => "ns",
            ModuleKind::Eq => "eq",
            ModuleKind::Mod => "mod",
            ModuleKind::Delay => "delay",
            ModuleKind::Reverb => "reverb",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ModuleKind::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or_else(|| format!("unknown module '{s}'"))
    }
}

/// Fixed-size (de)serialization of one module block.
pub trait ModuleCodec: Sized {
    const KIND: ModuleKind;
    const SIZE: usize;

    fn decode(data: &[u8]) -> Result<Self, CodecError>;

    /// Write exactly `Self::SIZE` bytes into `out`.
    fn encode_into(&self, out: &mut [u8]);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE];
        self.encode_into(&mut out);
        out
    }
}

fn check_len(kind: ModuleKind, data: &[u8], size: usize) -> Result<(), CodecError> {
    if data.len() < size {
        return Err(CodecError::TruncatedData {
            what: kind.name(),
            expected: size,
            actual: data.len(),
        });
    }
    Ok(())
}

/// `is_enabled`/`set_enabled` over the raw enabled byte.
macro_rules! enabled_flag {
    ($name:ident) => {
        impl $name {
            pub fn is_enabled(&self) -> bool {
                self.enabled != 0
            }

            /// Turning on an already-enabled block keeps its original byte.
            pub fn set_enabled(&mut self, on: bool) {
                if !on {
                    self.enabled = 0;
                } else if self.enabled == 0 {
                    self.enabled = 1;
                }
            }
        }
    };
}

/// Declares a module whose parameters are consecutive single bytes.
macro_rules! effect_module {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:ident, size = $size:expr, reserved = $reserved:expr,
        [$($param:ident),* $(,)?]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            pub header: u8,
            pub enabled: u8,
            pub type_id: u8,
            $(pub $param: u8,)*
            pub reserved: [u8; $reserved],
        }

        impl ModuleCodec for $name {
            const KIND: ModuleKind = ModuleKind::$kind;
            const SIZE: usize = $size;

            #[allow(unused_assignments)]
            fn decode(data: &[u8]) -> Result<Self, CodecError> {
                check_len(Self::KIND, data, Self::SIZE)?;
                let mut pos = 3;
                $(
                    let $param = data[pos];
                    pos += 1;
                )*
                let mut reserved = [0u8; $reserved];
                reserved.copy_from_slice(&data[pos..Self::SIZE]);
                Ok(Self {
                    header: data[0],
                    enabled: data[1],
                    type_id: data[2],
                    $($param,)*
                    reserved,
                })
            }

            #[allow(unused_assignments)]
            fn encode_into(&self, out: &mut [u8]) {
                out[0] = self.header;
                out[1] = self.enabled;
                out[2] = self.type_id;
                let mut pos = 3;
                $(
                    out[pos] = self.$param;
                    pos += 1;
                )*
                out[pos..Self::SIZE].copy_from_slice(&self.reserved);
            }
        }

        enabled_flag!($name);
    };
}

effect_module! {
    /// FX / compressor block (13 bytes).
    FxModule, Fx, size = 13, reserved = 6,
    [q, position, peak, level]
}

effect_module! {
    /// Distortion / overdrive block (11 bytes).
    OdModule, Od, size = 11, reserved = 5,
    [volume, tone, gain]
}

effect_module! {
    /// Amp model block (17 bytes).
    AmpModule, Amp, size = 17, reserved = 8,
    [gain, bass, mid, treble, presence, master]
}

effect_module! {
    /// Cabinet simulation block (13 bytes).
    CabModule, Cab, size = 13, reserved = 6,
    [mic, center, distance, tube]
}

effect_module! {
    /// Noise gate block (11 bytes).
    NoiseGateModule, Ns, size = 11, reserved = 5,
    [attack, release, threshold]
}

effect_module! {
    /// Modulation block (15 bytes). The last two parameters are unnamed in
    /// the editor and differ per modulation type.
    ModulationModule, Mod, size = 15, reserved = 7,
    [rate, level, depth, param4, param5]
}

effect_module! {
    /// Reverb block (13 bytes).
    ReverbModule, Reverb, size = 13, reserved = 6,
    [pre_delay, level, decay, tone]
}

/// Equalizer block (23 bytes): two banks of six band gains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EqModule {
    pub header: u8,
    pub enabled: u8,
    pub type_id: u8,
    pub bands: [u8; 6],
    pub bands_extra: [u8; 6],
    pub reserved: [u8; 8],
}

impl ModuleCodec for EqModule {
    const KIND: ModuleKind = ModuleKind::Eq;
    const SIZE: usize = 23;

    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        check_len(Self::KIND, data, Self::SIZE)?;
        let mut m = Self {
            header: data[0],
            enabled: data[1],
            type_id: data[2],
            ..Default::default()
        };
        m.bands.copy_from_slice(&data[3..9]);
        m.bands_extra.copy_from_slice(&data[9..15]);
        m.reserved.copy_from_slice(&data[15..23]);
        Ok(m)
    }

    fn encode_into(&self, out: &mut [u8]) {
        out[0] = self.header;
        out[1] = self.enabled;
        out[2] = self.type_id;
        out[3..9].copy_from_slice(&self.bands);
        out[9..15].copy_from_slice(&self.bands_extra);
        out[15..23].copy_from_slice(&self.reserved);
    }
}

enabled_flag!(EqModule);

/// Delay block (17 bytes). Delay time is a little-endian u16 at bytes 5-6.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayModule {
    pub header: u8,
    pub enabled: u8,
    pub type_id: u8,
    pub level: u8,
    pub feedback: u8,
    pub time_ms: u16,
    pub subdivision: u8,
    pub param5: u8,
    pub param6: u8,
    pub reserved: [u8; 7],
}

impl ModuleCodec for DelayModule {
    const KIND: ModuleKind = ModuleKind::Delay;
    const SIZE: usize = 17;

    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        check_len(Self::KIND, data, Self::SIZE)?;
        let mut reserved = [0u8; 7];
        reserved.copy_from_slice(&data[10..17]);
        Ok(Self {
            header: data[0],
            enabled: data[1],
            type_id: data[2],
            level: data[3],
            feedback: data[4],
            time_ms: u16::from_le_bytes([data[5], data[6]]),
            subdivision: data[7],
            param5: data[8],
            param6: data[9],
            reserved,
        })
    }

    fn encode_into(&self, out: &mut [u8]) {
        out[0] = self.header;
        out[1] = self.enabled;
        out[2] = self.type_id;
        out[3] = self.level;
        out[4] = self.feedback;
        out[5..7].copy_from_slice(&self.time_ms.to_le_bytes());
        out[7] = self.subdivision;
        out[8] = self.param5;
        out[9] = self.param6;
        out[10..17].copy_from_slice(&self.reserved);
    }
}

enabled_flag!(DelayModule);

/// Any one of the nine module blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectModule {
    Fx(FxModule),
    Od(OdModule),
    Amp(AmpModule),
    Cab(CabModule),
    Ns(NoiseGateModule),
    Eq(EqModule),
    Mod(ModulationModule),
    Delay(DelayModule),
    Reverb(ReverbModule),
}

/// Applies the same expression to whichever module the enum holds.
macro_rules! with_module {
    ($value:expr, $m:ident => $body:expr) => {
        match $value {
            EffectModule::Fx($m) => $body,
            EffectModule::Od($m) => $body,
            EffectModule::Amp($m) => $body,
            EffectModule::Cab($m) => $body,
            EffectModule::Ns($m) => $body,
            EffectModule::Eq($m) => $body,
            EffectModule::Mod($m) => $body,
            EffectModule::Delay($m) => $body,
            EffectModule::Reverb($m) => $body,
        }
    };
}

impl EffectModule {
    pub fn decode(kind: ModuleKind, data: &[u8]) -> Result<Self, CodecError> {
        Ok(match kind {
            ModuleKind::Fx => EffectModule::Fx(FxModule::decode(data)?),
            ModuleKind::Od => EffectModule::Od(OdModule::decode(data)?),
            ModuleKind::Amp => EffectModule::Amp(AmpModule::decode(data)?),
            ModuleKind::Cab => EffectModule::Cab(CabModule::decode(data)?),
            ModuleKind::Ns => EffectModule::Ns(NoiseGateModule::decode(data)?),
            ModuleKind::Eq => EffectModule::Eq(EqModule::decode(data)?),
            ModuleKind::Mod => EffectModule::Mod(ModulationModule::decode(data)?),
            ModuleKind::Delay => EffectModule::Delay(DelayModule::decode(data)?),
            ModuleKind::Reverb => EffectModule::Reverb(ReverbModule::decode(data)?),
        })
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            EffectModule::Fx(_) => ModuleKind::Fx,
            EffectModule::Od(_) => ModuleKind::Od,
            EffectModule::Amp(_) => ModuleKind::Amp,
            EffectModule::Cab(_) => ModuleKind::Cab,
            EffectModule::Ns(_) => ModuleKind::Ns,
            EffectModule::Eq(_) => ModuleKind::Eq,
            EffectModule::Mod(_) => ModuleKind::Mod,
            EffectModule::Delay(_) => ModuleKind::Delay,
            EffectModule::Reverb(_) => ModuleKind::Reverb,
        }
    }

    pub fn header(&self) -> u8 {
        with_module!(self, m => m.header)
    }

    pub fn is_enabled(&self) -> bool {
        with_module!(self, m => m.is_enabled())
    }

    /// Raw enabled byte as stored on the device.
    pub fn enabled_byte(&self) -> u8 {
        with_module!(self, m => m.enabled)
    }

    pub fn set_enabled(&mut self, on: bool) {
        with_module!(self, m => m.set_enabled(on))
    }

    pub fn type_id(&self) -> u8 {
        with_module!(self, m => m.type_id)
    }

    pub fn encode_into(&self, out: &mut [u8]) {
        with_module!(self, m => m.encode_into(out))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        with_module!(self, m => m.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| seed.wrapping_add(i as u8 * 7)).collect()
    }

    #[test]
    fn test_block_sizes_tile_the_preset() {
        let mut expected = ModuleKind::Fx.offset();
        for kind in ModuleKind::ALL {
            assert_eq!(kind.offset(), expected, "{kind}");
            expected += kind.size();
        }
        assert_eq!(expected, crate::protocol::constants::OFF_TAIL);
    }

    #[test]
    fn test_every_variant_roundtrips_bytes() {
        for (i, kind) in ModuleKind::ALL.into_iter().enumerate() {
            let raw = pattern(kind.size(), i as u8 * 31);
            let module = EffectModule::decode(kind, &raw).unwrap();
            assert_eq!(module.kind(), kind);
            assert_eq!(module.to_bytes(), raw, "{kind}");
        }
    }

    #[test]
    fn test_reserved_bytes_preserved() {
        let mut raw = vec![0u8; AmpModule::SIZE];
        raw[..9].copy_from_slice(&[0x07, 1, 10, 200, 64, 100, 80, 90, 200]);
        raw[9..].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 1, 2, 3, 4]);

        let mut amp = AmpModule::decode(&raw).unwrap();
        assert_eq!(amp.gain, 200);
        assert_eq!(amp.reserved, [0xDE, 0xAD, 0xBE, 0xEF, 1, 2, 3, 4]);

        amp.master = 10;
        let out = amp.to_bytes();
        assert_eq!(out[8], 10);
        assert_eq!(&out[9..], &raw[9..]);
    }

    #[test]
    fn test_delay_time_is_little_endian() {
        let mut raw = vec![0u8; DelayModule::SIZE];
        raw[5] = 0xF4;
        raw[6] = 0x01;
        let delay = DelayModule::decode(&raw).unwrap();
        assert_eq!(delay.time_ms, 500);
        assert_eq!(delay.to_bytes(), raw);
    }

    #[test]
    fn test_enabled_byte_kept_verbatim() {
        let mut raw = vec![0u8; OdModule::SIZE];
        raw[1] = 0x02;
        let mut od = OdModule::decode(&raw).unwrap();
        assert!(od.is_enabled());
        assert_eq!(od.to_bytes(), raw);

        od.set_enabled(true);
        assert_eq!(od.enabled, 0x02);
        od.set_enabled(false);
        assert_eq!(od.to_bytes()[1], 0);
        od.set_enabled(true);
        assert_eq!(od.to_bytes()[1], 1);
    }

    #[test]
    fn test_truncated_block() {
        let err = EqModule::decode(&[0u8; 22]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TruncatedData {
                expected: 23,
                actual: 22,
                ..
            }
        ));
    }

    #[test]
    fn test_set_enabled_through_enum() {
        let mut m = EffectModule::Reverb(ReverbModule::default());
        assert!(!m.is_enabled());
        m.set_enabled(true);
        assert!(m.is_enabled());
        assert_eq!(m.enabled_byte(), 1);
        assert_eq!(m.to_bytes()[1], 1);
    }

    #[test]
    fn test_kind_index_follows_block_order() {
        for (i, kind) in ModuleKind::ALL.into_iter().enumerate() {
            assert_eq!(kind.index() as usize, i);
        }
    }

        #[test]
    fn test_kind_from_str() {
        assert_eq!("DELAY".parse::<ModuleKind>(), Ok(ModuleKind::Delay));
        assert!("wah".parse::<ModuleKind>().is_err());
    }

    proptest! {
        #[test]
        fn prop_any_block_bytes_roundtrip(
            kind in proptest::sample::select(ModuleKind::ALL.to_vec()),
            seed in proptest::collection::vec(any::<u8>(), 23),
        ) {
            let raw = &seed[..kind.size()];
            let module = EffectModule::decode(kind, raw).unwrap();
            prop_assert_eq!(module.kind(), kind);
            prop_assert_eq!(module.to_bytes(), raw.to_vec());
        }
    }
}
