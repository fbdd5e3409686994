//! Packet transport abstraction.
//!
//! The protocol engine only needs a duplex channel that moves fixed-size
//! HID reports. Device discovery and claiming live in the implementations.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not available: 0x{address:02X}")]
    EndpointNotFound { address: u8 },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Packet of {len} bytes exceeds report size {max}")]
    PacketTooLarge { len: usize, max: usize },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn timeout(timeout: Duration) -> Self {
        TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

/// Duplex channel exchanging fixed-size packets with the device.
///
/// One outbound packet per `write_packet`, one inbound packet per
/// `read_packet`. Packets are exactly `packet_size()` bytes on the wire;
/// shorter writes are zero padded by the implementation.
pub trait PacketTransport: Send + Sync {
    fn write_packet(&self, packet: &[u8]) -> Result<(), TransportError>;

    /// Block until one packet arrives or `timeout` elapses.
    fn read_packet(&self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    fn packet_size(&self) -> usize;

    fn is_connected(&self) -> bool;

    fn vendor_id(&self) -> u16;

    fn product_id(&self) -> u16;
}
