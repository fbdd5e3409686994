//! Command groups.
//!
//! A single byte selects which subsystem a frame addresses. The same id is
//! used by the host request and the device response.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unknown command group 0x{0:02X}")]
pub struct UnknownCommand(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Identify = 0x10,
    Menu = 0x82,
    Preset = 0x83,
    /// Tentative: seen in captures next to the pedal assignment traffic.
    PedalAssignAlt = 0x84,
    CabModels = 0x85,
    FootSwitch = 0x89,
    Fx = 0x90,
    DsOd = 0x91,
    Amp = 0x93,
    Cab = 0x94,
    NsGate = 0x95,
    Eq = 0x96,
    Mod = 0x97,
    Delay = 0x98,
    Reverb = 0x99,
    System = 0xA1,
    Volume = 0xA2,
    PedalAssignment = 0xA3,
    PatchAlternate = 0xA4,
    PatchSetting = 0xA5,
    ActivePatch = 0xA6,
    StorePatch = 0xA8,
    ActivePatchSetting = 0xA9,
    CabinetUpload = 0xE1,
    AmpUpload = 0xE2,
    AmpModels = 0xE3,
}

impl Command {
    pub const ALL: [Command; 26] = [
        Command::Identify,
        Command::Menu,
        Command::Preset,
        Command::PedalAssignAlt,
        Command::CabModels,
        Command::FootSwitch,
        Command::Fx,
        Command::DsOd,
        Command::Amp,
        Command::Cab,
        Command::NsGate,
        Command::Eq,
        Command::Mod,
        Command::Delay,
        Command::Reverb,
        Command::System,
        Command::Volume,
        Command::PedalAssignment,
        Command::PatchAlternate,
        Command::PatchSetting,
        Command::ActivePatch,
        Command::StorePatch,
        Command::ActivePatchSetting,
        Command::CabinetUpload,
        Command::AmpUpload,
        Command::AmpModels,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Identify => "Identify",
            Command::Menu => "Menu",
            Command::Preset => "Preset",
            Command::PedalAssignAlt => "PedalAssign",
            Command::CabModels => "CabModels",
            Command::FootSwitch => "FootSwitch",
            Command::Fx => "FX",
            Command::DsOd => "DS_OD",
            Command::Amp => "AMP",
            Command::Cab => "CAB",
            Command::NsGate => "NS_GATE",
            Command::Eq => "EQ",
            Command::Mod => "MOD",
            Command::Delay => "DELAY",
            Command::Reverb => "REVERB",
            Command::System => "System",
            Command::Volume => "Volume",
            Command::PedalAssignment => "PedalAssignment",
            Command::PatchAlternate => "PatchAlternate",
            Command::PatchSetting => "PatchSetting",
            Command::ActivePatch => "ActivePatch",
            Command::StorePatch => "StorePatch",
            Command::ActivePatchSetting => "ActivePatchSetting",
            Command::CabinetUpload => "CabinetUpload",
            Command::AmpUpload => "AmpUpload",
            Command::AmpModels => "AmpModels",
        }
    }

    /// Groups whose payload layout has not been confirmed against hardware.
    pub fn is_tentative(self) -> bool {
        matches!(self, Command::PedalAssignAlt)
    }
}

impl TryFrom<u8> for Command {
    type Error = UnknownCommand;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .iter()
            .copied()
            .find(|c| c.id() == id)
            .ok_or(UnknownCommand(id))
    }
}

impl From<Command> for u8 {
    fn from(c: Command) -> u8 {
        c.id()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.id())
    }
}

/// What a request does within its command group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    List,
    Unknown,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Write => write!(f, "write"),
            Operation::List => write!(f, "list"),
            Operation::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_roundtrip() {
        for c in Command::ALL {
            assert_eq!(Command::try_from(c.id()), Ok(c));
        }
    }

    #[test]
    fn test_unknown_id() {
        assert_eq!(Command::try_from(0x92), Err(UnknownCommand(0x92)));
        assert_eq!(Command::try_from(0x00), Err(UnknownCommand(0x00)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::ActivePatch.to_string(), "ActivePatch (0xA6)");
    }
}
