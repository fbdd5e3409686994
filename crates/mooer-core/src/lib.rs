//! Mooer-Core: USB control protocol for Mooer GE-series effects processors.
//!
//! This crate implements the framed HID protocol spoken by the GE150 family,
//! plus the fixed-layout codecs for presets and the vendor file formats.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, command groups, CRC, frame codec and reassembly
//! - **Transport**: Packet channel abstraction (nusb HID, mock)
//! - **Dispatch**: Typed requests/responses with timeout and retry
//! - **Preset**: 512-byte preset body and the nine effect module blocks
//! - **Files**: `.mo` preset export, `.gnr` IR container, `.mbf` backup
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: Composite device operations (backup, restore, copy)
//!
//! # Example
//!
//! ```no_run
//! use mooer_core::session::{DeviceSession, SessionConfig};
//!
//! let config = SessionConfig::default();
//! let mut session = DeviceSession::open(&config)?;
//! let preset = session.read_preset(0)?;
//! println!("{preset}");
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod dispatch;
pub mod events;
pub mod files;
pub mod preset;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use dispatch::{DispatchError, Dispatcher, DispatcherConfig, IdentifyInfo, Request, Response};
pub use events::{NullObserver, SessionEvent, SessionObserver, TracingObserver};
pub use files::{BackupArchive, FileKind, IrContainer, MoFile};
pub use preset::{CodecError, EffectModule, ModuleKind, Preset};
pub use protocol::{Command, Frame, FrameError, ReassemblyBuffer, crc16};
pub use session::{DeviceSession, PresetSummary, RestoreReport, SessionConfig};
pub use transport::{MockTransport, NusbTransport, PacketTransport, TransportError};
