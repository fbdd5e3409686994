//! Protocol constants for the Mooer GE-series USB control channel.
//!
//! Captured from USB traffic between the vendor editor and a GE150 Pro Li.

// ============================================================================
// Device Identification
// ============================================================================

/// STMicroelectronics Vendor ID (the GE150 uses an STM32 USB stack)
pub const MOOER_VENDOR_ID: u16 = 0x0483;

/// GE150 Pro Li Product ID
pub const GE150_PRODUCT_ID: u16 = 0x5703;

/// HID interface carrying the control protocol
pub const HID_INTERFACE: u8 = 3;

/// Interrupt IN endpoint
pub const EP_IN: u8 = 0x81;

/// Interrupt OUT endpoint
pub const EP_OUT: u8 = 0x02;

// ============================================================================
// Transport Packets
// ============================================================================

/// Fixed HID report size.
pub const HID_REPORT_SIZE: usize = 64;

/// Leading byte of every report: count of meaningful bytes that follow.
pub const PACKET_COUNT_LEN: usize = 1;

// ============================================================================
// Frame Layout
// ============================================================================

/// Frame preamble.
pub const PREAMBLE: [u8; 2] = [0xAA, 0x55];

/// Preamble (2) + size (2).
pub const FRAME_HEADER_LEN: usize = 4;

/// Trailing checksum field.
pub const CHECKSUM_LEN: usize = 2;

/// Default ceiling for the declared size field of an inbound frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

// ============================================================================
// Slots
// ============================================================================

/// Number of preset slots addressable on the device (0..=199).
pub const PRESET_SLOT_COUNT: usize = 200;

/// Highest valid preset slot.
pub const MAX_PRESET_SLOT: u8 = 199;

/// Highest valid user IR slot.
pub const MAX_IR_SLOT: u8 = 9;

/// Highest valid output volume.
pub const MAX_VOLUME: u8 = 100;

// ============================================================================
// Preset Layout (offsets within the 512-byte body)
// ============================================================================

pub const PRESET_SIZE: usize = 0x200;

pub const OFF_EFFECT_ORDER: usize = 0x00;
pub const EFFECT_ORDER_LEN: usize = 10;
pub const OFF_SIZE: usize = 0x0A;
pub const OFF_NAME: usize = 0x0C;
pub const NAME_LEN: usize = 14;

pub const OFF_FX: usize = 0x1A;
pub const OFF_OD: usize = 0x27;
pub const OFF_AMP: usize = 0x32;
pub const OFF_CAB: usize = 0x43;
pub const OFF_NS: usize = 0x50;
pub const OFF_EQ: usize = 0x5B;
pub const OFF_MOD: usize = 0x72;
pub const OFF_DELAY: usize = 0x81;
pub const OFF_REVERB: usize = 0x92;

/// First byte after the REVERB block.
pub const OFF_TAIL: usize = 0x9F;

/// Value of the big-endian size field: everything after the field itself.
pub const PRESET_DECLARED_SIZE: u16 = (PRESET_SIZE - OFF_SIZE - 2) as u16;

// ============================================================================
// File Formats
// ============================================================================

/// `.mo` single-preset export
pub const MO_FILE_SIZE: usize = 0x800;
pub const MO_HEADER_SIZE: usize = 0x200;
pub const MO_PRESET_OFFSET: usize = 0x200;
pub const MO_PADDING_SIZE: usize = 0x400;

/// `.gnr` IR container magic
pub const GNR_MAGIC: &[u8; 8] = b"mooerge\0";
pub const GNR_HEADER_LEN: usize = 12;

/// `.mbf` full backup
pub const MBF_MANUFACTURER_SIZE: usize = 8;
pub const MBF_MODEL_NAME_SIZE: usize = 32;
pub const MBF_VERSION_SIZE: usize = 4;
pub const MBF_HEADER_SIZE: usize = MBF_MANUFACTURER_SIZE + MBF_MODEL_NAME_SIZE + MBF_VERSION_SIZE;
pub const MBF_ENTRY_SIZE: usize = 0x222;
pub const MBF_ENTRY_COUNT: usize = 199;
pub const MBF_DEFAULT_MANUFACTURER: &str = "MOOER";
pub const MBF_DEFAULT_MODEL: &str = "GE150 Pro Li";
pub const MBF_DEFAULT_VERSION: u32 = 1;
