//! Table-driven CRC-16 used by the frame checksum.
//!
//! Polynomial 0x1021, MSB-first, zero initial register, result inverted.

const POLY: u16 = 0x1021;

static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[inline]
fn update(mut crc: u16, data: &[u8]) -> u16 {
    for &b in data {
        crc = (crc << 8) ^ TABLE[((crc >> 8) as u8 ^ b) as usize];
    }
    crc
}

/// Inverted CRC-16 over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    !update(0, data)
}

/// Checksum field for a frame body (`command ++ payload`), in the order it is
/// read little-endian off the wire.
///
/// The device runs the register over the little-endian size field before the
/// body and transmits the inverted result high byte first.
pub fn frame_checksum(body: &[u8]) -> u16 {
    let size = (body.len() as u16).to_le_bytes();
    let crc = !update(update(0, &size), body);
    crc.swap_bytes()
}
