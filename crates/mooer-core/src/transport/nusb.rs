//! nusb-based HID transport.
//!
//! The control channel is a vendor HID interface with one interrupt endpoint
//! per direction. Reports are written and read raw; no HID report parsing.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nusb::descriptors::TransferType;
use nusb::transfer::{Direction, In, Interrupt, Out, TransferError};
use nusb::{Endpoint, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{PacketTransport, TransportError};
use crate::protocol::constants::{EP_IN, EP_OUT, HID_REPORT_SIZE};

/// How long a single OUT report may take before the write is abandoned.
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// nusb-based packet transport.
pub struct NusbTransport {
    in_ep: Mutex<Endpoint<Interrupt, In>>,
    out_ep: Mutex<Endpoint<Interrupt, Out>>,
    packet_size: usize,
    connected: AtomicBool,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open the first device matching `vid`/`pid` and claim its control interface.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open(vid: u16, pid: u16, interface: u8) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            product = device_info.product_string().unwrap_or("?"),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let claimed = device
            .detach_and_claim_interface(interface)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface,
                message: e.to_string(),
            })?;

        // Prefer the report size the descriptor advertises for the IN endpoint.
        let mut packet_size = HID_REPORT_SIZE;
        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != interface {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() == TransferType::Interrupt
                            && ep.direction() == Direction::In
                            && ep.address() == EP_IN
                        {
                            packet_size = ep.max_packet_size();
                        }
                    }
                }
            }
        }

        let in_ep = claimed
            .endpoint::<Interrupt, In>(EP_IN)
            .map_err(|_| TransportError::EndpointNotFound { address: EP_IN })?;
        let out_ep = claimed
            .endpoint::<Interrupt, Out>(EP_OUT)
            .map_err(|_| TransportError::EndpointNotFound { address: EP_OUT })?;

        info!(
            interface,
            in_ep = %format!("0x{:02X}", EP_IN),
            out_ep = %format!("0x{:02X}", EP_OUT),
            packet_size,
            "Device opened successfully"
        );

        Ok(Self {
            in_ep: Mutex::new(in_ep),
            out_ep: Mutex::new(out_ep),
            packet_size,
            connected: AtomicBool::new(true),
            vid,
            pid,
        })
    }

    fn map_transfer_error(&self, e: TransferError, read: bool) -> TransportError {
        if matches!(e, TransferError::Disconnected) {
            warn!("Device disconnected");
            self.connected.store(false, Ordering::Relaxed);
            return TransportError::Disconnected;
        }
        if read {
            TransportError::ReadFailed(e.to_string())
        } else {
            TransportError::WriteFailed(e.to_string())
        }
    }
}

impl PacketTransport for NusbTransport {
    #[instrument(level = "trace", skip(self, packet), fields(len = packet.len()))]
    fn write_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
        if packet.len() > self.packet_size {
            return Err(TransportError::PacketTooLarge {
                len: packet.len(),
                max: self.packet_size,
            });
        }
        let mut ep = self
            .out_ep
            .lock()
            .map_err(|_| TransportError::WriteFailed("endpoint lock poisoned".into()))?;

        let mut report = packet.to_vec();
        report.resize(self.packet_size, 0);
        ep.submit(report.into());

        let completion = match ep.wait_next_complete(WRITE_TIMEOUT) {
            Some(c) => c,
            None => {
                ep.cancel_all();
                // Reap the cancelled transfer so it does not linger.
                let _ = ep.wait_next_complete(WRITE_TIMEOUT);
                return Err(TransportError::timeout(WRITE_TIMEOUT));
            }
        };
        completion
            .status
            .map_err(|e| self.map_transfer_error(e, false))?;

        debug!(bytes_written = packet.len(), "Write complete");
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    fn read_packet(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut ep = self
            .in_ep
            .lock()
            .map_err(|_| TransportError::ReadFailed("endpoint lock poisoned".into()))?;

        // A transfer left pending by an earlier timeout is still valid.
        if ep.pending() == 0 {
            let buf = ep.allocate(self.packet_size);
            ep.submit(buf);
        }

        let completion = ep
            .wait_next_complete(timeout)
            .ok_or_else(|| TransportError::timeout(timeout))?;
        completion
            .status
            .map_err(|e| self.map_transfer_error(e, true))?;

        let data = completion.buffer.to_vec();
        debug!(bytes_read = data.len(), "Read complete");
        Ok(data)
    }

    fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
