//! Mock packet transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{PacketTransport, TransportError};
use crate::protocol::constants::{GE150_PRODUCT_ID, HID_REPORT_SIZE, MOOER_VENDOR_ID};
use crate::protocol::frame;

/// Mock transport for exercising the dispatcher and session without hardware.
///
/// Clones share the same queues, so a test can keep a handle after moving
/// the transport into a dispatcher.
#[derive(Clone, Debug)]
pub struct MockTransport {
    /// Packets returned by `read_packet`, in order.
    read_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    packet_size: usize,
    vid: u16,
    pid: u16,
    connected: Arc<Mutex<bool>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_packet_size(HID_REPORT_SIZE)
    }

    pub fn with_packet_size(packet_size: usize) -> Self {
        Self {
            read_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            packet_size,
            vid: MOOER_VENDOR_ID,
            pid: GE150_PRODUCT_ID,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue one raw inbound packet.
    pub fn queue_packet(&self, packet: &[u8]) {
        lock(&self.read_queue).push_back(packet.to_vec());
    }

    /// Queue a device response frame, split into packets.
    pub fn queue_frame(&self, command: u8, payload: &[u8]) {
        let packets = frame::encode(command, payload, self.packet_size)
            .unwrap_or_else(|e| panic!("mock frame does not encode: {e}"));
        let mut queue = lock(&self.read_queue);
        queue.extend(packets);
    }

    pub fn pending_reads(&self) -> usize {
        lock(&self.read_queue).len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        lock(&self.write_log).clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        lock(&self.write_log).clear();
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *lock(&self.connected) = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *lock(&self.connected) = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketTransport for MockTransport {
    fn write_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if packet.len() > self.packet_size {
            return Err(TransportError::PacketTooLarge {
                len: packet.len(),
                max: self.packet_size,
            });
        }
        let mut padded = packet.to_vec();
        padded.resize(self.packet_size, 0);
        lock(&self.write_log).push(padded);
        Ok(())
    }

    fn read_packet(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        lock(&self.read_queue)
            .pop_front()
            .ok_or_else(|| TransportError::timeout(timeout))
    }

    fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn is_connected(&self) -> bool {
        *lock(&self.connected)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
