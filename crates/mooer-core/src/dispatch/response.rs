//! Typed responses decoded from device frames.

use std::fmt;

use super::DispatchError;
use crate::preset::Preset;
use crate::protocol::{Command, Frame};

const FIRMWARE_LEN: usize = 5;
const DEVICE_NAME_LEN: usize = 11;
const UNKNOWN: &str = "unknown";

/// Whether a device feature is known to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    Supported,
    Unsupported,
    /// No confirmed way to detect the feature yet.
    Unconfirmed,
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Support::Supported => write!(f, "yes"),
            Support::Unsupported => write!(f, "no"),
            Support::Unconfirmed => write!(f, "unconfirmed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub midi: Support,
    pub bluetooth: Support,
}

/// Identify (0x10) response: firmware version and device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyInfo {
    pub firmware: String,
    pub device_name: String,
    pub raw: Vec<u8>,
}

impl IdentifyInfo {
    /// Parse the identify payload. Short payloads yield `"unknown"` fields.
    pub fn parse(payload: &[u8]) -> Self {
        if payload.len() < FIRMWARE_LEN + DEVICE_NAME_LEN {
            return Self {
                firmware: UNKNOWN.to_string(),
                device_name: UNKNOWN.to_string(),
                raw: payload.to_vec(),
            };
        }

        let parts: Vec<String> = payload[..FIRMWARE_LEN]
            .iter()
            .filter(|&&b| b != 0)
            .map(|b| b.to_string())
            .collect();
        let firmware = if parts.is_empty() {
            UNKNOWN.to_string()
        } else {
            parts.join(".")
        };

        let name = &payload[FIRMWARE_LEN..FIRMWARE_LEN + DEVICE_NAME_LEN];
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        let device_name = String::from_utf8_lossy(&name[..end]).into_owned();

        Self {
            firmware,
            device_name,
            raw: payload.to_vec(),
        }
    }

    /// MIDI and Bluetooth are reported inconsistently across device
    /// documentation and nothing in the identify payload confirms either.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            midi: Support::Unconfirmed,
            bluetooth: Support::Unconfirmed,
        }
    }
}

/// Raw system settings block (0xA1). Field meanings are undocumented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSettings {
    pub raw: Vec<u8>,
}

impl SystemSettings {
    pub fn get(&self, index: u8) -> Option<u8> {
        self.raw.get(index as usize).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Identify(IdentifyInfo),
    Preset { slot: u8, preset: Box<Preset> },
    ActivePatch { slot: u8 },
    Volume { volume: u8 },
    System(SystemSettings),
    Models { command: Command, raw: Vec<u8> },
    /// Acknowledgement of a write; payload is whatever the device echoed.
    Ack { command: Command, payload: Vec<u8> },
    Raw(Frame),
}

impl Response {
    pub fn decode(frame: Frame) -> Result<Self, DispatchError> {
        let command = Command::try_from(frame.command).map_err(|_| DispatchError::UnknownCommand {
            command: frame.command,
        })?;

        let response = match command {
            Command::Identify => Response::Identify(IdentifyInfo::parse(&frame.payload)),
            Command::Preset => {
                let Some((&slot, body)) = frame.payload.split_first() else {
                    return Err(DispatchError::UnexpectedResponse {
                        command: frame.command,
                        reason: "preset response carries no slot".into(),
                    });
                };
                Response::Preset {
                    slot,
                    preset: Box::new(Preset::decode(slot, body)?),
                }
            }
            Command::ActivePatch => match frame.payload.first() {
                Some(&slot) => Response::ActivePatch { slot },
                None => Response::Ack {
                    command,
                    payload: frame.payload,
                },
            },
            Command::Volume => match frame.payload.first() {
                Some(&volume) => Response::Volume { volume },
                None => Response::Ack {
                    command,
                    payload: frame.payload,
                },
            },
            Command::System => Response::System(SystemSettings { raw: frame.payload }),
            Command::CabModels | Command::AmpModels => Response::Models {
                command,
                raw: frame.payload,
            },
            Command::StorePatch
            | Command::PatchSetting
            | Command::Fx
            | Command::DsOd
            | Command::Amp
            | Command::Cab
            | Command::NsGate
            | Command::Eq
            | Command::Mod
            | Command::Delay
            | Command::Reverb
            | Command::CabinetUpload
            | Command::AmpUpload => Response::Ack {
                command,
                payload: frame.payload,
            },
            _ => Response::Raw(frame),
        };
        Ok(response)
    }
}
