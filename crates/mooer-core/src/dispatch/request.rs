//! Typed requests and their payload encoding rules.

use std::fmt;

use crate::preset::{CodecError, ModuleKind, Preset, check_slot};
use crate::protocol::constants::{EFFECT_ORDER_LEN, MAX_IR_SLOT, MAX_PRESET_SLOT, MAX_VOLUME};
use crate::protocol::{Command, Operation};

/// Parameter index that switches a module on or off.
pub const TOGGLE_PARAM_INDEX: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Identify,
    ReadPreset {
        slot: u8,
    },
    StorePatch {
        slot: u8,
        preset: Box<Preset>,
    },
    SelectPatch {
        slot: u8,
    },
    /// Signal chain order of the active patch, one module index per position.
    SetEffectOrder {
        order: [u8; EFFECT_ORDER_LEN],
    },
    SetModuleParam {
        module: ModuleKind,
        index: u8,
        value: u8,
    },
    ToggleModule {
        module: ModuleKind,
        enabled: bool,
    },
    ReadSystem,
    WriteSystem {
        index: u8,
        value: u8,
    },
    ReadVolume,
    SetVolume {
        volume: u8,
    },
    ListCabModels,
    ListAmpModels,
    UploadCabinet {
        slot: u8,
        data: Vec<u8>,
    },
    UploadAmp {
        slot: u8,
        data: Vec<u8>,
    },
    /// Opaque passthrough for groups without a typed wrapper.
    Raw {
        command: Command,
        payload: Vec<u8>,
    },
}

impl Request {
    pub fn store_patch(slot: u8, preset: Preset) -> Self {
        Request::StorePatch {
            slot,
            preset: Box::new(preset),
        }
    }

    /// Chain order from module kinds; unused positions are zero.
    pub fn effect_order(modules: &[ModuleKind]) -> Result<Self, CodecError> {
        if modules.len() > EFFECT_ORDER_LEN {
            return Err(CodecError::InvalidValue {
                field: "effect order length",
                value: modules.len(),
                max: EFFECT_ORDER_LEN,
            });
        }
        let mut order = [0u8; EFFECT_ORDER_LEN];
        for (dst, kind) in order.iter_mut().zip(modules) {
            *dst = kind.index();
        }
        Ok(Request::SetEffectOrder { order })
    }

    pub fn command(&self) -> Command {
        match self {
            Request::Identify => Command::Identify,
            Request::ReadPreset { .. } => Command::Preset,
            Request::StorePatch { .. } => Command::StorePatch,
            Request::SelectPatch { .. } => Command::ActivePatch,
            Request::SetEffectOrder { .. } => Command::PatchSetting,
            Request::SetModuleParam { module, .. } | Request::ToggleModule { module, .. } => {
                module.command()
            }
            Request::ReadSystem | Request::WriteSystem { .. } => Command::System,
            Request::ReadVolume | Request::SetVolume { .. } => Command::Volume,
            Request::ListCabModels => Command::CabModels,
            Request::ListAmpModels => Command::AmpModels,
            Request::UploadCabinet { .. } => Command::CabinetUpload,
            Request::UploadAmp { .. } => Command::AmpUpload,
            Request::Raw { command, .. } => *command,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Request::Identify
            | Request::ReadPreset { .. }
            | Request::ReadSystem
            | Request::ReadVolume => Operation::Read,
            Request::StorePatch { .. }
            | Request::SelectPatch { .. }
            | Request::SetEffectOrder { .. }
            | Request::SetModuleParam { .. }
            | Request::ToggleModule { .. }
            | Request::WriteSystem { .. }
            | Request::SetVolume { .. }
            | Request::UploadCabinet { .. }
            | Request::UploadAmp { .. } => Operation::Write,
            Request::ListCabModels | Request::ListAmpModels => Operation::List,
            Request::Raw { .. } => Operation::Unknown,
        }
    }

    /// Encode the frame payload, validating ranges first.
    pub fn payload(&self) -> Result<Vec<u8>, CodecError> {
        let payload = match self {
            Request::Identify
            | Request::ReadSystem
            | Request::ReadVolume
            | Request::ListCabModels
            | Request::ListAmpModels => Vec::new(),
            Request::ReadPreset { slot } | Request::SelectPatch { slot } => {
                vec![check_slot(*slot, MAX_PRESET_SLOT)?]
            }
            Request::StorePatch { slot, preset } => {
                let mut payload = Vec::with_capacity(1 + 512);
                payload.push(check_slot(*slot, MAX_PRESET_SLOT)?);
                payload.extend_from_slice(&preset.encode());
                payload
            }
            Request::SetEffectOrder { order } => {
                if let Some(&bad) = order.iter().find(|&&i| i as usize >= EFFECT_ORDER_LEN) {
                    return Err(CodecError::InvalidValue {
                        field: "effect order index",
                        value: bad as usize,
                        max: EFFECT_ORDER_LEN - 1,
                    });
                }
                order.to_vec()
            }
            Request::SetModuleParam { index, value, .. }
            | Request::WriteSystem { index, value } => vec![*index, *value],
            Request::ToggleModule { enabled, .. } => vec![TOGGLE_PARAM_INDEX, u8::from(*enabled)],
            Request::SetVolume { volume } => {
                if *volume > MAX_VOLUME {
                    return Err(CodecError::InvalidValue {
                        field: "volume",
                        value: *volume as usize,
                        max: MAX_VOLUME as usize,
                    });
                }
                vec![*volume]
            }
            Request::UploadCabinet { slot, data } | Request::UploadAmp { slot, data } => {
                let mut payload = Vec::with_capacity(1 + data.len());
                payload.push(check_slot(*slot, MAX_IR_SLOT)?);
                payload.extend_from_slice(data);
                payload
            }
            Request::Raw { payload, .. } => payload.clone(),
        };
        Ok(payload)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation(), self.command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_mapping() {
        let cases = [
            (Request::Identify, 0x10, Operation::Read),
            (Request::ReadPreset { slot: 3 }, 0x83, Operation::Read),
            (Request::store_patch(3, Preset::default()), 0xA8, Operation::Write),
            (Request::SelectPatch { slot: 2 }, 0xA6, Operation::Write),
            (
                Request::SetEffectOrder { order: [0; 10] },
                0xA5,
                Operation::Write,
            ),
            (Request::ReadSystem, 0xA1, Operation::Read),
            (Request::WriteSystem { index: 4, value: 1 }, 0xA1, Operation::Write),
            (Request::ReadVolume, 0xA2, Operation::Read),
            (Request::SetVolume { volume: 80 }, 0xA2, Operation::Write),
            (Request::ListCabModels, 0x85, Operation::List),
            (Request::ListAmpModels, 0xE3, Operation::List),
            (
                Request::UploadCabinet { slot: 0, data: vec![] },
                0xE1,
                Operation::Write,
            ),
            (Request::UploadAmp { slot: 0, data: vec![] }, 0xE2, Operation::Write),
            (
                Request::Raw {
                    command: Command::PedalAssignAlt,
                    payload: vec![],
                },
                0x84,
                Operation::Unknown,
            ),
        ];
        for (req, id, op) in cases {
            assert_eq!(req.command().id(), id, "{req:?}");
            assert_eq!(req.operation(), op, "{req:?}");
        }
    }

    #[test]
    fn test_module_requests_address_module_group() {
        let req = Request::SetModuleParam {
            module: ModuleKind::Delay,
            index: 4,
            value: 90,
        };
        assert_eq!(req.command(), Command::Delay);
        assert_eq!(req.payload().unwrap(), vec![4, 90]);

        let toggle = Request::ToggleModule {
            module: ModuleKind::Amp,
            enabled: true,
        };
        assert_eq!(toggle.command(), Command::Amp);
        assert_eq!(toggle.payload().unwrap(), vec![1, 1]);
        let off = Request::ToggleModule {
            module: ModuleKind::Reverb,
            enabled: false,
        };
        assert_eq!(off.payload().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_effect_order_payload() {
        let req = Request::effect_order(&[
            ModuleKind::Amp,
            ModuleKind::Cab,
            ModuleKind::Fx,
            ModuleKind::Od,
            ModuleKind::Ns,
            ModuleKind::Eq,
            ModuleKind::Mod,
            ModuleKind::Delay,
            ModuleKind::Reverb,
        ])
        .unwrap();
        assert_eq!(req.command(), Command::PatchSetting);
        assert_eq!(req.payload().unwrap(), vec![2, 3, 0, 1, 4, 5, 6, 7, 8, 0]);

        let bad = Request::SetEffectOrder {
            order: [0, 1, 2, 3, 4, 5, 6, 7, 8, 10],
        };
        assert!(matches!(
            bad.payload(),
            Err(CodecError::InvalidValue { value: 10, max: 9, .. })
        ));
        assert!(Request::effect_order(&[ModuleKind::Fx; 11]).is_err());
    }

    #[test]
    fn test_store_patch_payload() {
        let preset = Preset::named("Stored");
        let payload = Request::store_patch(42, preset.clone()).payload().unwrap();
        assert_eq!(payload.len(), 513);
        assert_eq!(payload[0], 42);
        assert_eq!(&payload[1..], &preset.encode());
    }

    #[test]
    fn test_slot_validation() {
        assert_eq!(Request::SelectPatch { slot: 199 }.payload().unwrap(), vec![199]);
        assert!(matches!(
            Request::SelectPatch { slot: 200 }.payload(),
            Err(CodecError::InvalidSlot { slot: 200, max: 199 })
        ));
        assert!(matches!(
            Request::ReadPreset { slot: 255 }.payload(),
            Err(CodecError::InvalidSlot { .. })
        ));
        assert!(matches!(
            Request::store_patch(200, Preset::default()).payload(),
            Err(CodecError::InvalidSlot { .. })
        ));
    }

    #[test]
    fn test_upload_payload() {
        let req = Request::UploadCabinet {
            slot: 9,
            data: vec![1, 2, 3],
        };
        assert_eq!(req.payload().unwrap(), vec![9, 1, 2, 3]);
        let bad = Request::UploadCabinet {
            slot: 10,
            data: vec![1],
        };
        assert!(matches!(
            bad.payload(),
            Err(CodecError::InvalidSlot { slot: 10, max: 9 })
        ));
    }

    #[test]
    fn test_volume_bounds() {
        assert_eq!(Request::SetVolume { volume: 100 }.payload().unwrap(), vec![100]);
        assert!(matches!(
            Request::SetVolume { volume: 101 }.payload(),
            Err(CodecError::InvalidValue { field: "volume", .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Request::SelectPatch { slot: 1 }.to_string(),
            "write ActivePatch (0xA6)"
        );
    }
}
