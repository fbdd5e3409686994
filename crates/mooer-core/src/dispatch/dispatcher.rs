//! Synchronous request/response dispatcher.
//!
//! One request is in flight at a time: `send` takes `&mut self`, so callers
//! sharing a device must serialize through a single dispatcher.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::request::Request;
use super::response::Response;
use crate::events::{NullObserver, PacketDirection, SessionEvent, SessionObserver};
use crate::preset::CodecError;
use crate::protocol::constants::{DEFAULT_MAX_FRAME_LEN, HID_REPORT_SIZE};
use crate::protocol::{Command, Frame, FrameError, ReassemblyBuffer, frame};
use crate::transport::{PacketTransport, TransportError};

/// Leading bytes of each packet copied into packet events.
const PACKET_PREVIEW_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unknown command group 0x{command:02X}")]
    UnknownCommand { command: u8 },

    #[error("No response to {command} after {attempts} attempt(s)")]
    Timeout { command: Command, attempts: u32 },

    #[error("Unexpected response to 0x{command:02X}: {reason}")]
    UnexpectedResponse { command: u8, reason: String },
}

impl DispatchError {
    /// Failures a resend may cure.
    fn is_transient(&self) -> bool {
        matches!(
            self,
            DispatchError::Frame(FrameError::Framing { .. })
                | DispatchError::Frame(FrameError::ChecksumMismatch { .. })
                | DispatchError::Transport(TransportError::Timeout { .. })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Deadline for one attempt, from the last packet written.
    pub timeout: Duration,
    /// Resends after the first attempt.
    pub retries: u32,
    pub packet_size: usize,
    pub max_frame_len: usize,
    /// Pause between packets of a chunked request.
    pub inter_packet_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            retries: 1,
            packet_size: HID_REPORT_SIZE,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            inter_packet_delay: Duration::from_millis(10),
        }
    }
}

pub struct Dispatcher<T: PacketTransport, O: SessionObserver = NullObserver> {
    transport: T,
    buffer: ReassemblyBuffer,
    config: DispatcherConfig,
    observer: Arc<O>,
}

impl<T: PacketTransport> Dispatcher<T, NullObserver> {
    pub fn new(transport: T, config: DispatcherConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(NullObserver))
    }
}

impl<T: PacketTransport, O: SessionObserver> Dispatcher<T, O> {
    /// The transport's packet size wins over `config.packet_size`.
    pub fn with_observer(transport: T, mut config: DispatcherConfig, observer: Arc<O>) -> Self {
        let packet_size = transport.packet_size();
        if packet_size != config.packet_size {
            warn!(
                configured = config.packet_size,
                transport = packet_size,
                "Packet size differs from endpoint, using endpoint size"
            );
            config.packet_size = packet_size;
        }
        let buffer = ReassemblyBuffer::new(config.packet_size, config.max_frame_len);
        Self {
            transport,
            buffer,
            config,
            observer,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn observer(&self) -> &Arc<O> {
        &self.observer
    }

    /// Encode, send and wait for the typed response.
    #[instrument(level = "debug", skip(self, request), fields(request = %request))]
    pub fn send(&mut self, request: &Request) -> Result<Response, DispatchError> {
        let payload = request.payload()?;
        let frame = self.exchange(request.command(), &payload)?;
        Response::decode(frame)
    }

    /// Send one frame and return the first reply frame for the same group.
    pub fn exchange(&mut self, command: Command, payload: &[u8]) -> Result<Frame, DispatchError> {
        let packets = frame::encode(command.id(), payload, self.config.packet_size)?;
        let attempts = self.config.retries + 1;
        let mut attempt = 1;

        loop {
            // Stale bytes from an abandoned exchange must not prefix this reply.
            self.buffer.reset();

            let result = self
                .write_packets(&packets)
                .and_then(|()| self.await_frame(command));

            match result {
                Ok(frame) => return Ok(frame),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(command = %command, attempt, error = %e, "Request failed, resending");
                    self.observer.on_event(&SessionEvent::Retry {
                        command: command.id(),
                        attempt,
                        reason: e.to_string(),
                    });
                    attempt += 1;
                }
                Err(DispatchError::Transport(TransportError::Timeout { .. })) => {
                    self.buffer.reset();
                    return Err(DispatchError::Timeout { command, attempts });
                }
                Err(e) => {
                    self.buffer.reset();
                    if matches!(e, DispatchError::Transport(TransportError::Disconnected)) {
                        self.observer.on_event(&SessionEvent::DeviceDisconnected);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn write_packets(&self, packets: &[Vec<u8>]) -> Result<(), DispatchError> {
        for (i, packet) in packets.iter().enumerate() {
            if i > 0 && !self.config.inter_packet_delay.is_zero() {
                thread::sleep(self.config.inter_packet_delay);
            }
            self.transport.write_packet(packet)?;
            self.emit_packet(PacketDirection::Tx, packet);
        }
        debug!(packets = packets.len(), "Request written");
        Ok(())
    }

    fn await_frame(&mut self, command: Command) -> Result<Frame, DispatchError> {
        let deadline = Instant::now() + self.config.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::timeout(self.config.timeout).into());
            }

            let packet = self.transport.read_packet(remaining)?;
            self.emit_packet(PacketDirection::Rx, &packet);

            let mut next = self.buffer.push_packet(&packet)?;
            while let Some(frame) = next {
                self.observer.on_event(&SessionEvent::FrameReceived {
                    command: frame.command,
                    payload_len: frame.payload.len(),
                });
                if frame.command == command.id() {
                    return Ok(frame);
                }
                if Command::try_from(frame.command).is_err() {
                    return Err(DispatchError::UnknownCommand {
                        command: frame.command,
                    });
                }
                warn!(expected = %command, frame = %frame, "Discarding unsolicited frame");
                next = self.buffer.take_frame()?;
            }
        }
    }

    fn emit_packet(&self, direction: PacketDirection, packet: &[u8]) {
        self.observer.on_event(&SessionEvent::Packet {
            direction,
            length: packet.len(),
            data: packet.iter().take(PACKET_PREVIEW_LEN).copied().collect(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::preset::Preset;
    use crate::transport::MockTransport;

    fn test_config() -> DispatcherConfig {
        DispatcherConfig {
            inter_packet_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn dispatcher() -> (MockTransport, Dispatcher<MockTransport>) {
        let mock = MockTransport::new();
        (mock.clone(), Dispatcher::new(mock, test_config()))
    }

    fn corrupted_packet(command: u8, payload: &[u8]) -> Vec<u8> {
        let mut packets = frame::encode(command, payload, HID_REPORT_SIZE).unwrap();
        let mut packet = packets.remove(0);
        // Last checksum byte of a single-packet frame.
        let count = packet[0] as usize;
        packet[count] ^= 0xFF;
        packet
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl SessionObserver for RecordingObserver {
        fn on_event(&self, event: &SessionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_select_patch_wire_bytes() {
        let (mock, mut d) = dispatcher();
        mock.queue_frame(0xA6, &[0x02]);

        let response = d.send(&Request::SelectPatch { slot: 2 }).unwrap();
        assert_eq!(response, Response::ActivePatch { slot: 2 });

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            &writes[0][..9],
            &[0x08, 0xAA, 0x55, 0x02, 0x00, 0xA6, 0x02, 0x85, 0x0D]
        );
        assert!(writes[0][9..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_timeout_after_retries() {
        let (mock, mut d) = dispatcher();

        let err = d.send(&Request::ReadVolume).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Timeout {
                command: Command::Volume,
                attempts: 2
            }
        ));
        // Initial attempt plus one resend.
        assert_eq!(mock.get_writes().len(), 2);
    }

    #[test]
    fn test_no_retries_configured() {
        let mock = MockTransport::new();
        let config = DispatcherConfig {
            retries: 0,
            ..test_config()
        };
        let mut d = Dispatcher::new(mock.clone(), config);

        assert!(matches!(
            d.send(&Request::ReadVolume),
            Err(DispatchError::Timeout { attempts: 1, .. })
        ));
        assert_eq!(mock.get_writes().len(), 1);
    }

    #[test]
    fn test_checksum_mismatch_is_retried() {
        let (mock, mut d) = dispatcher();
        mock.queue_packet(&corrupted_packet(0xA2, &[40]));
        mock.queue_frame(0xA2, &[40]);

        let response = d.send(&Request::ReadVolume).unwrap();
        assert_eq!(response, Response::Volume { volume: 40 });
        assert_eq!(mock.get_writes().len(), 2);
    }

    #[test]
    fn test_checksum_mismatch_surfaces_after_retries() {
        let (mock, mut d) = dispatcher();
        mock.queue_packet(&corrupted_packet(0xA2, &[40]));
        mock.queue_packet(&corrupted_packet(0xA2, &[40]));

        assert!(matches!(
            d.send(&Request::ReadVolume),
            Err(DispatchError::Frame(FrameError::ChecksumMismatch { command: 0xA2, .. }))
        ));
    }

    #[test]
    fn test_framing_error_is_retried() {
        let (mock, mut d) = dispatcher();
        mock.queue_packet(&[3, 0x12, 0x34, 0x56]);
        mock.queue_frame(0xA6, &[5]);

        assert_eq!(
            d.send(&Request::SelectPatch { slot: 5 }).unwrap(),
            Response::ActivePatch { slot: 5 }
        );
    }

    #[test]
    fn test_unsolicited_frame_discarded() {
        let (mock, mut d) = dispatcher();
        mock.queue_frame(0xA2, &[50]);
        mock.queue_frame(0xA6, &[3]);

        assert_eq!(
            d.send(&Request::SelectPatch { slot: 3 }).unwrap(),
            Response::ActivePatch { slot: 3 }
        );
        assert_eq!(mock.get_writes().len(), 1);
    }

    #[test]
    fn test_unknown_command_surfaces() {
        let (mock, mut d) = dispatcher();
        mock.queue_frame(0x42, &[]);

        assert!(matches!(
            d.send(&Request::Identify),
            Err(DispatchError::UnknownCommand { command: 0x42 })
        ));
        assert_eq!(mock.get_writes().len(), 1);
    }

    #[test]
    fn test_store_patch_is_chunked() {
        let (mock, mut d) = dispatcher();
        mock.queue_frame(0xA8, &[12]);

        let response = d
            .send(&Request::store_patch(12, Preset::named("Chunked")))
            .unwrap();
        assert_eq!(
            response,
            Response::Ack {
                command: Command::StorePatch,
                payload: vec![12]
            }
        );

        let writes = mock.get_writes();
        // 4 header + 1 command + 513 payload + 2 checksum, 63 per packet.
        assert_eq!(writes.len(), 9);
        assert_eq!(&writes[0][1..7], &[0xAA, 0x55, 0x02, 0x02, 0xA8, 12]);
        assert_eq!(writes[8][0] as usize, 520 - 8 * 63);
    }

    #[test]
    fn test_packet_size_follows_transport() {
        let mock = MockTransport::with_packet_size(32);
        let mut d = Dispatcher::new(mock.clone(), test_config());
        assert_eq!(d.config().packet_size, 32);
        mock.queue_frame(0xA8, &[12]);

        d.send(&Request::store_patch(12, Preset::named("Small")))
            .unwrap();

        let writes = mock.get_writes();
        // 520 wire bytes, 31 per packet.
        assert_eq!(writes.len(), 17);
        assert!(writes.iter().all(|w| w.len() == 32));
        assert_eq!(writes[16][0] as usize, 520 - 16 * 31);
    }

    #[test]
    fn test_multi_packet_response() {
        let (mock, mut d) = dispatcher();
        let mut payload = vec![33];
        payload.extend_from_slice(&Preset::named("Big Reply").encode());
        mock.queue_frame(0x83, &payload);
        assert!(mock.pending_reads() > 1);

        match d.send(&Request::ReadPreset { slot: 33 }).unwrap() {
            Response::Preset { slot, preset } => {
                assert_eq!(slot, 33);
                assert_eq!(preset.name(), "Big Reply");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stale_partial_frame_cleared() {
        let mock = MockTransport::new();
        let config = DispatcherConfig {
            retries: 0,
            ..test_config()
        };
        let mut d = Dispatcher::new(mock.clone(), config);

        let mut payload = vec![1];
        payload.extend_from_slice(&Preset::default().encode());
        let packets = frame::encode(0x83, &payload, HID_REPORT_SIZE).unwrap();
        mock.queue_packet(&packets[0]);
        assert!(d.send(&Request::ReadPreset { slot: 1 }).is_err());

        mock.queue_frame(0xA2, &[60]);
        assert_eq!(
            d.send(&Request::ReadVolume).unwrap(),
            Response::Volume { volume: 60 }
        );
    }

    #[test]
    fn test_invalid_request_not_written() {
        let (mock, mut d) = dispatcher();
        assert!(matches!(
            d.send(&Request::SelectPatch { slot: 200 }),
            Err(DispatchError::Codec(CodecError::InvalidSlot { .. }))
        ));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_disconnect_surfaces_without_retry() {
        let mock = MockTransport::new();
        let observer = Arc::new(RecordingObserver::default());
        let mut d = Dispatcher::with_observer(mock.clone(), test_config(), observer.clone());
        mock.disconnect();

        assert!(matches!(
            d.send(&Request::Identify),
            Err(DispatchError::Transport(TransportError::Disconnected))
        ));
        let events = observer.events.lock().unwrap();
        assert_eq!(events.as_slice(), &[SessionEvent::DeviceDisconnected]);
    }

    #[test]
    fn test_observer_sees_retry_and_packets() {
        let mock = MockTransport::new();
        let observer = Arc::new(RecordingObserver::default());
        let mut d = Dispatcher::with_observer(mock.clone(), test_config(), observer.clone());

        assert!(d.send(&Request::SelectPatch { slot: 1 }).is_err());

        let events = observer.events.lock().unwrap();
        let retries: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Retry { .. }))
            .collect();
        assert_eq!(retries.len(), 1);
        assert!(matches!(
            retries[0],
            SessionEvent::Retry {
                command: 0xA6,
                attempt: 1,
                ..
            }
        ));
        let tx = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SessionEvent::Packet {
                        direction: PacketDirection::Tx,
                        length: 64,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(tx, 2);
    }
}
