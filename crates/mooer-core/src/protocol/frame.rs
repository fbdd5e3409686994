//! Frame encoding, packetization and stateful reassembly.
//!
//! Wire format of one frame:
//! ```text
//! ┌───────────┬───────────┬─────────┬──────────────┬──────────────┐
//! │ Preamble  │ Size      │ Command │ Payload      │ Checksum     │
//! │ AA 55     │ (2B LE)   │ (1B)    │ (Size-1 B)   │ (2B LE)      │
//! └───────────┴───────────┴─────────┴──────────────┴──────────────┘
//! ```
//! `Size` counts the command byte plus payload. The encoded frame is then cut
//! into fixed-size HID reports whose first byte is the number of meaningful
//! bytes that follow; the rest of each report is zero.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{debug, trace};

use super::constants::{
    CHECKSUM_LEN, DEFAULT_MAX_FRAME_LEN, FRAME_HEADER_LEN, HID_REPORT_SIZE, PACKET_COUNT_LEN,
    PREAMBLE,
};
use super::crc::frame_checksum;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Framing error: {reason}")]
    Framing { reason: String },

    #[error("Checksum mismatch on command 0x{command:02X}: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch {
        command: u8,
        expected: u16,
        actual: u16,
    },

    #[error("Payload too large: {size} bytes, max {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

impl FrameError {
    fn framing(reason: impl Into<String>) -> Self {
        FrameError::Framing {
            reason: reason.into(),
        }
    }
}

/// One logical protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// `command ++ payload`, the span covered by the size field.
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(1 + self.payload.len());
        body.push(self.command);
        body.extend_from_slice(&self.payload);
        body
    }

    pub fn checksum(&self) -> u16 {
        frame_checksum(&self.body())
    }

    /// Encoded size before packetization.
    pub fn wire_len(&self) -> usize {
        FRAME_HEADER_LEN + 1 + self.payload.len() + CHECKSUM_LEN
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        encode_frame(self.command, &self.payload)
    }

    pub fn to_packets(&self, packet_size: usize) -> Result<Vec<Vec<u8>>, FrameError> {
        encode(self.command, &self.payload, packet_size)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(command=0x{:02X}, payload=", self.command)?;
        if self.payload.is_empty() {
            return write!(f, "(empty))");
        }
        for (i, b) in self.payload.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// Encode a frame into its unpacketized wire bytes.
pub fn encode_frame(command: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let body_len = 1 + payload.len();
    if body_len > u16::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u16::MAX as usize - 1,
        });
    }

    let mut body = Vec::with_capacity(body_len);
    body.push(command);
    body.extend_from_slice(payload);

    let mut wire = Vec::with_capacity(FRAME_HEADER_LEN + body_len + CHECKSUM_LEN);
    wire.extend_from_slice(&PREAMBLE);
    wire.extend_from_slice(&(body_len as u16).to_le_bytes());
    wire.extend_from_slice(&body);
    wire.extend_from_slice(&frame_checksum(&body).to_le_bytes());
    Ok(wire)
}

/// Split encoded frame bytes into count-prefixed, zero-padded packets.
pub fn packetize(wire: &[u8], packet_size: usize) -> Result<Vec<Vec<u8>>, FrameError> {
    let chunk_len = usable_len(packet_size)?;
    Ok(wire
        .chunks(chunk_len)
        .map(|chunk| {
            let mut packet = vec![0u8; packet_size];
            packet[0] = chunk.len() as u8;
            packet[PACKET_COUNT_LEN..PACKET_COUNT_LEN + chunk.len()].copy_from_slice(chunk);
            packet
        })
        .collect())
}

/// Encode and packetize in one step.
pub fn encode(command: u8, payload: &[u8], packet_size: usize) -> Result<Vec<Vec<u8>>, FrameError> {
    let wire = encode_frame(command, payload)?;
    packetize(&wire, packet_size)
}

/// Decode a complete frame from an ordered sequence of packets.
///
/// Fails if the packets run out before the frame is complete.
pub fn decode<'a, I>(packets: I) -> Result<Frame, FrameError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut buffer = ReassemblyBuffer::default();
    for packet in packets {
        if let Some(frame) = buffer.push_packet(packet)? {
            return Ok(frame);
        }
    }
    Err(FrameError::framing(format!(
        "incomplete frame: {} bytes buffered",
        buffer.pending()
    )))
}

fn usable_len(packet_size: usize) -> Result<usize, FrameError> {
    // The count byte must be able to describe every data byte in the packet.
    if !(PACKET_COUNT_LEN + 1..=PACKET_COUNT_LEN + u8::MAX as usize).contains(&packet_size) {
        return Err(FrameError::framing(format!(
            "unsupported packet size {packet_size}"
        )));
    }
    Ok(packet_size - PACKET_COUNT_LEN)
}

/// Per-channel buffer that collects packet contents until a frame is whole.
///
/// Partial frames persist across calls; call [`ReassemblyBuffer::reset`] after
/// a timeout or abandoned request so stale bytes do not prefix the next frame.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    buf: Vec<u8>,
    packet_size: usize,
    max_frame_len: usize,
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new(HID_REPORT_SIZE, DEFAULT_MAX_FRAME_LEN)
    }
}

impl ReassemblyBuffer {
    pub fn new(packet_size: usize, max_frame_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(packet_size * 2),
            packet_size,
            max_frame_len,
        }
    }

    /// Bytes buffered towards the next frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!(discarded = self.buf.len(), "Reassembly buffer reset");
        }
        self.buf.clear();
    }

    /// Feed one transport packet. Returns a frame once one is complete.
    ///
    /// Any error clears the buffer.
    pub fn push_packet(&mut self, packet: &[u8]) -> Result<Option<Frame>, FrameError> {
        let result = self.accept(packet).and_then(|()| self.next_frame());
        if result.is_err() {
            self.buf.clear();
        }
        result
    }

    /// Extract a frame already sitting in the buffer without new input.
    pub fn take_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let result = self.next_frame();
        if result.is_err() {
            self.buf.clear();
        }
        result
    }

    fn accept(&mut self, packet: &[u8]) -> Result<(), FrameError> {
        let Some((&count, data)) = packet.split_first() else {
            return Ok(());
        };
        let count = count as usize;
        if count > data.len() || count > self.packet_size.saturating_sub(PACKET_COUNT_LEN) {
            return Err(FrameError::framing(format!(
                "packet declares {count} bytes but carries {}",
                data.len()
            )));
        }
        trace!(count, buffered = self.buf.len(), "Packet accepted");
        self.buf.extend_from_slice(&data[..count]);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let seen = self.buf.len().min(PREAMBLE.len());
        if self.buf[..seen] != PREAMBLE[..seen] {
            return Err(FrameError::framing(format!(
                "missing preamble: got {:02X?}",
                &self.buf[..seen]
            )));
        }
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let size = LittleEndian::read_u16(&self.buf[2..4]) as usize;
        if size == 0 {
            return Err(FrameError::framing("declared size is zero"));
        }
        if size > self.max_frame_len {
            return Err(FrameError::framing(format!(
                "declared size {size} exceeds maximum {}",
                self.max_frame_len
            )));
        }

        let total = FRAME_HEADER_LEN + size + CHECKSUM_LEN;
        if self.buf.len() < total {
            return Ok(None);
        }

        let body = &self.buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + size];
        let expected = frame_checksum(body);
        let actual = LittleEndian::read_u16(&self.buf[FRAME_HEADER_LEN + size..total]);
        if expected != actual {
            return Err(FrameError::ChecksumMismatch {
                command: body[0],
                expected,
                actual,
            });
        }

        let frame = Frame::new(body[0], &body[1..]);
        self.buf.drain(..total);
        debug!(command = %format!("0x{:02X}", frame.command), len = frame.payload.len(), "Frame reassembled");
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(buffer: &mut ReassemblyBuffer, packets: &[Vec<u8>]) -> Result<Option<Frame>, FrameError> {
        let mut out = None;
        for p in packets {
            if let Some(frame) = buffer.push_packet(p)? {
                out = Some(frame);
            }
        }
        Ok(out)
    }

    #[test]
    fn test_captured_select_patch_frame() {
        let wire = encode_frame(0xA6, &[0x02]).unwrap();
        assert_eq!(wire, [0xAA, 0x55, 0x02, 0x00, 0xA6, 0x02, 0x85, 0x0D]);
    }

    #[test]
    fn test_single_packet_layout() {
        let packets = encode(0xA6, &[0x02], HID_REPORT_SIZE).unwrap();
        assert_eq!(packets.len(), 1);
        let p = &packets[0];
        assert_eq!(p.len(), HID_REPORT_SIZE);
        assert_eq!(p[0], 8);
        assert_eq!(&p[1..9], &[0xAA, 0x55, 0x02, 0x00, 0xA6, 0x02, 0x85, 0x0D]);
        assert!(p[9..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_roundtrip_empty_payload() {
        let packets = encode(0x10, &[], HID_REPORT_SIZE).unwrap();
        let frame = decode(packets.iter().map(Vec::as_slice)).unwrap();
        assert_eq!(frame, Frame::new(0x10, Vec::new()));
    }

    #[test]
    fn test_store_patch_is_chunked() {
        let payload = vec![0x5A; 513];
        let packets = encode(0xA8, &payload, HID_REPORT_SIZE).unwrap();
        // 4 + 514 + 2 = 520 wire bytes at 63 per packet.
        assert_eq!(packets.len(), 9);
        assert!(packets.iter().all(|p| p.len() == HID_REPORT_SIZE));
        assert_eq!(packets[8][0] as usize, 520 - 8 * 63);

        let frame = decode(packets.iter().map(Vec::as_slice)).unwrap();
        assert_eq!(frame.command, 0xA8);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_partial_frame_persists_across_calls() {
        let packets = encode(0x83, &[7u8; 100], HID_REPORT_SIZE).unwrap();
        let mut buffer = ReassemblyBuffer::default();
        assert!(buffer.push_packet(&packets[0]).unwrap().is_none());
        assert_eq!(buffer.pending(), 63);
        let frame = buffer.push_packet(&packets[1]).unwrap().unwrap();
        assert_eq!(frame.payload, vec![7u8; 100]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let stale = encode(0x83, &[1u8; 100], HID_REPORT_SIZE).unwrap();
        let fresh = encode(0xA6, &[0x05], HID_REPORT_SIZE).unwrap();
        let mut buffer = ReassemblyBuffer::default();
        buffer.push_packet(&stale[0]).unwrap();
        buffer.reset();
        let frame = buffer.push_packet(&fresh[0]).unwrap().unwrap();
        assert_eq!(frame, Frame::new(0xA6, [0x05]));
    }

    #[test]
    fn test_bad_preamble() {
        let mut packet = encode(0xA6, &[0x02], HID_REPORT_SIZE).unwrap().remove(0);
        packet[1] = 0xBB;
        let mut buffer = ReassemblyBuffer::default();
        assert!(matches!(
            buffer.push_packet(&packet),
            Err(FrameError::Framing { .. })
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_declared_size_above_maximum() {
        let mut packet = vec![0u8; HID_REPORT_SIZE];
        packet[..5].copy_from_slice(&[4, 0xAA, 0x55, 0xFF, 0xFF]);
        let mut buffer = ReassemblyBuffer::new(HID_REPORT_SIZE, 1024);
        assert!(matches!(
            buffer.push_packet(&packet),
            Err(FrameError::Framing { .. })
        ));
    }

    #[test]
    fn test_count_byte_larger_than_packet() {
        let mut packet = vec![0u8; HID_REPORT_SIZE];
        packet[0] = 64;
        let mut buffer = ReassemblyBuffer::default();
        assert!(matches!(
            buffer.push_packet(&packet),
            Err(FrameError::Framing { .. })
        ));
    }

    #[test]
    fn test_corrupted_checksum() {
        let mut packet = encode(0xA6, &[0x02], HID_REPORT_SIZE).unwrap().remove(0);
        packet[7] = 0;
        packet[8] = 0;
        let mut buffer = ReassemblyBuffer::default();
        assert!(matches!(
            buffer.push_packet(&packet),
            Err(FrameError::ChecksumMismatch { command: 0xA6, .. })
        ));
    }

    #[test]
    fn test_incomplete_stream() {
        let packets = encode(0x83, &[0u8; 200], HID_REPORT_SIZE).unwrap();
        let result = decode(packets[..2].iter().map(Vec::as_slice));
        assert!(matches!(result, Err(FrameError::Framing { .. })));
    }

    #[test]
    fn test_back_to_back_frames_in_one_packet() {
        let mut wire = encode_frame(0xA2, &[50]).unwrap();
        wire.extend(encode_frame(0xA6, &[3]).unwrap());
        let packets = packetize(&wire, HID_REPORT_SIZE).unwrap();
        assert_eq!(packets.len(), 1);

        let mut buffer = ReassemblyBuffer::default();
        let first = buffer.push_packet(&packets[0]).unwrap().unwrap();
        assert_eq!(first, Frame::new(0xA2, [50]));
        let second = buffer.take_frame().unwrap().unwrap();
        assert_eq!(second, Frame::new(0xA6, [3]));
        assert!(buffer.is_empty());
        assert_eq!(buffer.take_frame().unwrap(), None);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; u16::MAX as usize];
        assert!(matches!(
            encode_frame(0xE1, &payload),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_display() {
        let f = Frame::new(0xA6, [0x02]);
        assert_eq!(f.to_string(), "Frame(command=0xA6, payload=02)");
    }

    proptest! {
        #[test]
        fn prop_frame_roundtrip(command in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..600)) {
            let packets = encode(command, &payload, HID_REPORT_SIZE).unwrap();
            let mut buffer = ReassemblyBuffer::new(HID_REPORT_SIZE, 1024);
            let frame = feed(&mut buffer, &packets).unwrap().unwrap();
            prop_assert_eq!(frame, Frame::new(command, payload));
            prop_assert!(buffer.is_empty());
        }

        #[test]
        fn prop_chunked_matches_direct(payload in proptest::collection::vec(any::<u8>(), 60..400)) {
            let wire = encode_frame(0x83, &payload).unwrap();
            let packets = packetize(&wire, HID_REPORT_SIZE).unwrap();
            prop_assert!(packets.len() > 1);
            let reassembled: Vec<u8> = packets
                .iter()
                .flat_map(|p| p[1..1 + p[0] as usize].to_vec())
                .collect();
            prop_assert_eq!(reassembled, wire);
        }

        #[test]
        fn prop_payload_corruption_fails_checksum(
            payload in proptest::collection::vec(any::<u8>(), 1..50),
            index in any::<proptest::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let mut wire = encode_frame(0x97, &payload).unwrap();
            let i = FRAME_HEADER_LEN + 1 + index.index(payload.len());
            wire[i] ^= flip;
            let packets = packetize(&wire, HID_REPORT_SIZE).unwrap();
            let result = decode(packets.iter().map(Vec::as_slice));
            let is_checksum_mismatch = matches!(result, Err(FrameError::ChecksumMismatch { .. }));
            prop_assert!(is_checksum_mismatch);
        }
    }
}
