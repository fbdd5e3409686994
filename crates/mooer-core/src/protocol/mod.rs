//! Protocol module - wire-level definitions.

pub mod command;
pub mod constants;
pub mod crc;
pub mod frame;

pub use command::{Command, Operation, UnknownCommand};
pub use constants::*;
pub use crc::{crc16, frame_checksum};
pub use frame::{Frame, FrameError, ReassemblyBuffer};
