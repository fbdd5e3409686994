//! Session events for UI decoupling.
//!
//! Front ends subscribe through [`SessionObserver`] instead of scraping logs.

use std::fmt;

/// Long-running session operations that report progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Listing,
    Backup,
    Restore,
    IrUpload,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Connecting => write!(f, "Connecting"),
            SessionPhase::Listing => write!(f, "Listing"),
            SessionPhase::Backup => write!(f, "Backup"),
            SessionPhase::Restore => write!(f, "Restore"),
            SessionPhase::IrUpload => write!(f, "IR Upload"),
        }
    }
}

/// Events emitted by the dispatcher and session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DeviceConnected { vid: u16, pid: u16 },
    DeviceDisconnected,
    /// One transport packet moved.
    Packet {
        direction: PacketDirection,
        length: usize,
        /// Leading bytes only.
        data: Vec<u8>,
    },
    /// A complete frame was reassembled from the device.
    FrameReceived { command: u8, payload_len: usize },
    /// A request attempt failed and is being resent.
    Retry {
        command: u8,
        attempt: u32,
        reason: String,
    },
    Progress {
        phase: SessionPhase,
        current: u64,
        total: u64,
    },
    Complete { phase: SessionPhase },
}

/// Packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving session events.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            SessionEvent::DeviceDisconnected => {
                tracing::warn!("Device disconnected");
            }
            SessionEvent::Packet {
                direction,
                length,
                data,
            } => {
                tracing::trace!(dir = %direction, len = length, data = ?data, "HID report");
            }
            SessionEvent::FrameReceived {
                command,
                payload_len,
            } => {
                tracing::debug!(command = %format!("0x{:02X}", command), payload_len, "Frame received");
            }
            SessionEvent::Retry {
                command,
                attempt,
                reason,
            } => {
                tracing::warn!(command = %format!("0x{:02X}", command), attempt, reason = %reason, "Retrying request");
            }
            SessionEvent::Progress {
                phase,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(phase = %phase, progress = %format!("{}%", pct), "Progress");
            }
            SessionEvent::Complete { phase } => {
                tracing::info!(phase = %phase, "Operation complete");
            }
        }
    }
}
