//! UF2 block header and wire-level constants.
//!
//! A UF2 file is a plain concatenation of 512-byte blocks.  Every field
//! except the payload is a little-endian `u32`:
//!
//! | Offset | Size | Field                                      |
//! |--------|------|--------------------------------------------|
//! | 0      | 4    | first magic, `0x0A324655` ("UF2\n")        |
//! | 4      | 4    | second magic, `0x9E5D5157` (overridable)   |
//! | 8      | 4    | flags                                      |
//! | 12     | 4    | target address                             |
//! | 16     | 4    | payload bytes used                         |
//! | 20     | 4    | block number, 0-based                      |
//! | 24     | 4    | total blocks in file                       |
//! | 28     | 4    | family id, file size or zero               |
//! | 32     | 476  | payload, zero padded                       |
//! | 508    | 4    | final magic, `0x0AB16F30` (overridable)    |

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use thiserror::Error;

// ── Layout ───────────────────────────────────────────────────────────────────

/// Size of one block on the wire.
pub const BLOCK_SIZE:                 usize = 512;
/// Magic numbers plus the six header fields.
pub const HEADER_SIZE:                usize = 32;
/// Largest payload a single block can carry.
pub const MAX_PAYLOAD_SIZE:           usize = 476;
/// Chunk size used when splitting raw payload into blocks.
pub const DEFAULT_BLOCK_PAYLOAD_SIZE: usize = 256;
/// Offset of the final magic number.
pub const MAGIC_END_OFFSET:           usize = BLOCK_SIZE - 4;

pub const MAGIC_START0: u32 = 0x0A32_4655;
pub const MAGIC_START1: u32 = 0x9E5D_5157;
pub const MAGIC_END:    u32 = 0x0AB1_6F30;

/// Header flag bits.
pub mod flags {
    /// Block is not meant for main flash (e.g. comments or metadata).
    pub const NOT_MAIN_FLASH:         u32 = 0x0000_0001;
    /// The family slot holds the total file size.
    pub const FILE_CONTAINER:         u32 = 0x0000_1000;
    /// The family slot holds a board family id.
    pub const FAMILY_ID_PRESENT:      u32 = 0x0000_2000;
    pub const MD5_PRESENT:            u32 = 0x0000_4000;
    pub const EXTENSION_TAGS_PRESENT: u32 = 0x0000_8000;

    /// Short names for every known bit, lowest bit first.
    pub const NAMES: [(u32, &str); 5] = [
        (NOT_MAIN_FLASH,         "not-main-flash"),
        (FILE_CONTAINER,         "file-container"),
        (FAMILY_ID_PRESENT,      "family-id"),
        (MD5_PRESENT,            "md5"),
        (EXTENSION_TAGS_PRESENT, "extension-tags"),
    ];

    /// Render a flag word as `name|name|0x...` for diagnostics.
    pub fn describe(value: u32) -> String {
        let mut parts: Vec<String> = NAMES.iter()
            .filter(|(bit, _)| value & bit != 0)
            .map(|(_, name)| (*name).to_string())
            .collect();
        let unknown = NAMES.iter().fold(value, |rest, (bit, _)| rest & !bit);
        if unknown != 0 {
            parts.push(format!("0x{unknown:x}"));
        }
        if parts.is_empty() { "none".to_string() } else { parts.join("|") }
    }
}

// ── Magic overrides ──────────────────────────────────────────────────────────

/// Replacement values for the two variable magic numbers.
///
/// `None` means "use the standard constant".  The first magic number is
/// never overridable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MagicOverrides {
    pub start1: Option<u32>,
    pub end:    Option<u32>,
}

impl MagicOverrides {
    pub fn new(start1: Option<u32>, end: Option<u32>) -> Self {
        Self { start1, end }
    }

    /// Second magic number in effect.
    pub fn start1(&self) -> u32 {
        self.start1.unwrap_or(MAGIC_START1)
    }

    /// Final magic number in effect.
    pub fn end(&self) -> u32 {
        self.end.unwrap_or(MAGIC_END)
    }

    pub fn is_default(&self) -> bool {
        self.start1() == MAGIC_START1 && self.end() == MAGIC_END
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid UF2 block size: {len} bytes (must be exactly {BLOCK_SIZE})")]
    WrongBlockSize { len: usize },
    #[error("Invalid {field} magic value: expected 0x{expected:08x}, found 0x{found:08x}")]
    BadMagic { field: &'static str, expected: u32, found: u32 },
    #[error("Payload size {size} exceeds the {MAX_PAYLOAD_SIZE}-byte payload region")]
    PayloadTooLarge { size: u32 },
}

// ── BlockHeader ──────────────────────────────────────────────────────────────

/// The six metadata fields of a block.
///
/// `Copy`: a header used as a template for new blocks is always copied by
/// value, so changing the address or number of the copy leaves the template
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub flags:          u32,
    pub address:        u32,
    pub payload_size:   u32,
    pub block_number:   u32,
    pub total_blocks:   u32,
    /// Board family id, total file size or zero, depending on `flags`.
    pub family_or_size: u32,
}

impl BlockHeader {
    pub fn new(
        flags:          u32,
        address:        u32,
        payload_size:   u32,
        block_number:   u32,
        total_blocks:   u32,
        family_or_size: u32,
    ) -> Self {
        Self { flags, address, payload_size, block_number, total_blocks, family_or_size }
    }

    /// Template header for a file built from scratch: family id present,
    /// everything else zero.
    pub fn prototype(family_id: u32) -> Self {
        Self::new(flags::FAMILY_ID_PRESENT, 0, 0, 0, 0, family_id)
    }

    /// Decode the header of a raw 512-byte block.
    ///
    /// Both leading magic numbers are checked; the second one against
    /// `magic.start1()`.  A mismatch is an error, never a warning.
    pub fn from_block(raw: &[u8], magic: &MagicOverrides) -> Result<Self, FormatError> {
        if raw.len() != BLOCK_SIZE {
            return Err(FormatError::WrongBlockSize { len: raw.len() });
        }

        let mut words = [0u32; HEADER_SIZE / 4];
        LittleEndian::read_u32_into(&raw[..HEADER_SIZE], &mut words);

        if words[0] != MAGIC_START0 {
            return Err(FormatError::BadMagic {
                field: "START0", expected: MAGIC_START0, found: words[0],
            });
        }
        if words[1] != magic.start1() {
            return Err(FormatError::BadMagic {
                field: "START1", expected: magic.start1(), found: words[1],
            });
        }

        let header = Self::new(words[2], words[3], words[4], words[5], words[6], words[7]);
        if header.payload_size as usize > MAX_PAYLOAD_SIZE {
            return Err(FormatError::PayloadTooLarge { size: header.payload_size });
        }
        Ok(header)
    }

    /// Serialize magic numbers and fields into the first 32 bytes of `dst`.
    ///
    /// `payload_len` is written in place of `self.payload_size`.
    pub(crate) fn write_into(&self, dst: &mut [u8], payload_len: u32, magic: &MagicOverrides) {
        let words = [
            MAGIC_START0,
            magic.start1(),
            self.flags,
            self.address,
            payload_len,
            self.block_number,
            self.total_blocks,
            self.family_or_size,
        ];
        LittleEndian::write_u32_into(&words, &mut dst[..HEADER_SIZE]);
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    /// Board family id, if the family-id flag is set.
    pub fn family_id(&self) -> Option<u32> {
        self.has_flag(flags::FAMILY_ID_PRESENT).then_some(self.family_or_size)
    }

    /// Store a board family id and raise the family-id flag.
    pub fn set_family_id(&mut self, family_id: u32) {
        self.flags |= flags::FAMILY_ID_PRESENT;
        self.family_or_size = family_id;
    }

    /// Total file size, if the file-container flag is set.
    pub fn file_size(&self) -> Option<u32> {
        self.has_flag(flags::FILE_CONTAINER).then_some(self.family_or_size)
    }

    /// First address past this block's payload.
    pub fn end_address(&self) -> u64 {
        u64::from(self.address) + u64::from(self.payload_size)
    }
}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "header #{} @ {:#x}", self.block_number, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_block(words: [u32; 8]) -> Vec<u8> {
        let mut raw = vec![0u8; BLOCK_SIZE];
        LittleEndian::write_u32_into(&words, &mut raw[..HEADER_SIZE]);
        raw
    }

    #[test]
    fn decodes_fields_in_wire_order() {
        let raw = raw_block([MAGIC_START0, MAGIC_START1, 0x2000, 0x1000_0000, 256, 3, 10, 0xe48b_ff56]);
        let h = BlockHeader::from_block(&raw, &MagicOverrides::default()).unwrap();
        assert_eq!(h, BlockHeader::new(0x2000, 0x1000_0000, 256, 3, 10, 0xe48b_ff56));
        assert_eq!(h.family_id(), Some(0xe48b_ff56));
        assert_eq!(h.file_size(), None);
    }

    #[test]
    fn rejects_wrong_length() {
        for len in [0, 511, 513, 1024] {
            let err = BlockHeader::from_block(&vec![0u8; len], &MagicOverrides::default()).unwrap_err();
            assert!(matches!(err, FormatError::WrongBlockSize { len: l } if l == len));
        }
    }

    #[test]
    fn magic_mismatch_is_fatal() {
        let raw = raw_block([0xDEAD_BEEF, MAGIC_START1, 0, 0, 0, 0, 1, 0]);
        let err = BlockHeader::from_block(&raw, &MagicOverrides::default()).unwrap_err();
        assert!(matches!(err, FormatError::BadMagic { field: "START0", found: 0xDEAD_BEEF, .. }));

        let raw = raw_block([MAGIC_START0, 0x1234_5678, 0, 0, 0, 0, 1, 0]);
        let err = BlockHeader::from_block(&raw, &MagicOverrides::default()).unwrap_err();
        assert!(matches!(err, FormatError::BadMagic { field: "START1", expected: MAGIC_START1, .. }));
    }

    #[test]
    fn start1_checked_against_override() {
        let custom = MagicOverrides::new(Some(0x1234_5678), None);
        let raw = raw_block([MAGIC_START0, 0x1234_5678, 0, 0, 0, 0, 1, 0]);
        assert!(BlockHeader::from_block(&raw, &custom).is_ok());

        let standard = raw_block([MAGIC_START0, MAGIC_START1, 0, 0, 0, 0, 1, 0]);
        assert!(BlockHeader::from_block(&standard, &custom).is_err());
    }

    #[test]
    fn oversized_payload_field_rejected() {
        let raw = raw_block([MAGIC_START0, MAGIC_START1, 0, 0, 477, 0, 1, 0]);
        let err = BlockHeader::from_block(&raw, &MagicOverrides::default()).unwrap_err();
        assert!(matches!(err, FormatError::PayloadTooLarge { size: 477 }));
    }

    #[test]
    fn template_copy_is_independent() {
        let proto = BlockHeader::prototype(0xada5_2840);
        let mut copy = proto;
        copy.address = 0x2000;
        copy.block_number = 7;
        assert_eq!(proto.address, 0);
        assert_eq!(proto.block_number, 0);
        assert_eq!(copy.family_id(), Some(0xada5_2840));
    }

    #[test]
    fn flag_description() {
        assert_eq!(flags::describe(0), "none");
        assert_eq!(flags::describe(flags::FAMILY_ID_PRESENT), "family-id");
        assert_eq!(flags::describe(0x2001 | 0x10), "not-main-flash|family-id|0x10");
    }

    #[test]
    fn end_address_does_not_wrap() {
        let h = BlockHeader::new(0, u32::MAX - 10, 256, 0, 1, 0);
        assert_eq!(h.end_address(), u64::from(u32::MAX) - 10 + 256);
    }
}
