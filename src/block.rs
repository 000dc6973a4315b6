use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;

use crate::header::{
    BlockHeader, FormatError, MagicOverrides, BLOCK_SIZE, HEADER_SIZE, MAGIC_END_OFFSET,
    MAX_PAYLOAD_SIZE,
};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Payload of {size} bytes does not fit in a block (max {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge { size: usize },
    #[error("Invalid block payload size {size} (must be 1..={MAX_PAYLOAD_SIZE})")]
    InvalidChunkSize { size: usize },
    #[error("{len} bytes starting at {address:#x} run past the end of the address space")]
    AddressOverflow { address: u32, len: usize },
}

/// One UF2 block: a header, up to 476 payload bytes, and the magic numbers
/// it is framed with.
///
/// The payload is stored unpadded; padding to 512 bytes only happens in
/// [`DataBlock::to_bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub header: BlockHeader,
    payload:    Vec<u8>,
    magic:      MagicOverrides,
}

impl DataBlock {
    pub fn new(payload: Vec<u8>, header: BlockHeader) -> Result<Self, EncodeError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(EncodeError::PayloadTooLarge { size: payload.len() });
        }
        Ok(Self { header, payload, magic: MagicOverrides::default() })
    }

    /// Encode with these magic numbers instead of the standard ones.
    pub fn with_magic(mut self, magic: MagicOverrides) -> Self {
        self.magic = magic;
        self
    }

    /// Decode a raw 512-byte block with the standard magic numbers.
    pub fn from_block(raw: &[u8]) -> Result<Self, FormatError> {
        Self::from_block_with_magic(raw, MagicOverrides::default())
    }

    /// Decode a raw 512-byte block, checking START1 against `magic` and
    /// keeping `magic` for re-encoding.  The final magic is not checked.
    pub fn from_block_with_magic(raw: &[u8], magic: MagicOverrides) -> Result<Self, FormatError> {
        let header = BlockHeader::from_block(raw, &magic)?;
        let end = HEADER_SIZE + header.payload_size as usize;
        Ok(Self { header, payload: raw[HEADER_SIZE..end].to_vec(), magic })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn magic(&self) -> MagicOverrides {
        self.magic
    }

    /// `true` when the header's payload size agrees with the payload.
    pub fn is_well_formed(&self) -> bool {
        self.header.payload_size as usize == self.payload.len()
    }

    /// The 512-byte wire record.  The payload-size field is always the
    /// actual payload length, whatever `header.payload_size` says.
    pub fn to_bytes(&self) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        self.header.write_into(&mut out, self.payload.len() as u32, &self.magic);
        out[HEADER_SIZE..HEADER_SIZE + self.payload.len()].copy_from_slice(&self.payload);
        LittleEndian::write_u32(&mut out[MAGIC_END_OFFSET..], self.magic.end());
        out
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}

/// Reports the payload actually carried, not `header.payload_size`; the two
/// only agree once the block has been encoded.
impl fmt::Display for DataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {}/{} ({} bytes @ {:#x})",
            u64::from(self.header.block_number) + 1,
            self.header.total_blocks,
            self.payload.len(),
            self.header.address,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{flags, MAGIC_END, MAGIC_START0, MAGIC_START1};

    fn sample() -> DataBlock {
        let header = BlockHeader::new(flags::FAMILY_ID_PRESENT, 0x1000_2000, 5, 2, 4, 0xe48b_ff56);
        DataBlock::new(b"hello".to_vec(), header).unwrap()
    }

    #[test]
    fn roundtrip_keeps_header_and_payload() {
        let block = sample();
        let decoded = DataBlock::from_block(&block.to_bytes()).unwrap();
        assert_eq!(decoded.header, block.header);
        assert_eq!(decoded.payload(), b"hello");
        assert_eq!(decoded, block);
    }

    #[test]
    fn wire_layout() {
        let raw = sample().to_bytes();
        assert_eq!(LittleEndian::read_u32(&raw[0..]), MAGIC_START0);
        assert_eq!(LittleEndian::read_u32(&raw[4..]), MAGIC_START1);
        assert_eq!(LittleEndian::read_u32(&raw[12..]), 0x1000_2000);
        assert_eq!(&raw[32..37], b"hello");
        assert!(raw[37..MAGIC_END_OFFSET].iter().all(|&b| b == 0));
        assert_eq!(LittleEndian::read_u32(&raw[MAGIC_END_OFFSET..]), MAGIC_END);
    }

    #[test]
    fn payload_size_recomputed_on_encode() {
        let mut block = sample();
        block.header.payload_size = 200;
        assert!(!block.is_well_formed());

        let raw = block.to_bytes();
        assert_eq!(LittleEndian::read_u32(&raw[16..]), 5);
        let decoded = DataBlock::from_block(&raw).unwrap();
        assert_eq!(decoded.header.payload_size, 5);
        assert!(decoded.is_well_formed());
        // encoding does not touch the block itself
        assert_eq!(block.header.payload_size, 200);
    }

    #[test]
    fn encodes_with_overridden_magic() {
        let magic = MagicOverrides::new(Some(0x1111_2222), Some(0x3333_4444));
        let raw = sample().with_magic(magic).to_bytes();
        assert_eq!(LittleEndian::read_u32(&raw[4..]), 0x1111_2222);
        assert_eq!(LittleEndian::read_u32(&raw[MAGIC_END_OFFSET..]), 0x3333_4444);

        assert!(DataBlock::from_block(&raw).is_err());
        let decoded = DataBlock::from_block_with_magic(&raw, magic).unwrap();
        assert_eq!(decoded.magic(), magic);
        assert_eq!(decoded.to_bytes(), raw);
    }

    #[test]
    fn trailing_magic_not_validated() {
        let mut raw = sample().to_bytes();
        raw[MAGIC_END_OFFSET..].copy_from_slice(&[0xFF; 4]);
        assert!(DataBlock::from_block(&raw).is_ok());
    }

    #[test]
    fn full_payload_fits_and_larger_is_rejected() {
        let header = BlockHeader::default();
        let full = DataBlock::new(vec![0xAB; MAX_PAYLOAD_SIZE], header).unwrap();
        let raw = full.to_bytes();
        assert_eq!(LittleEndian::read_u32(&raw[MAGIC_END_OFFSET..]), MAGIC_END);
        assert_eq!(DataBlock::from_block(&raw).unwrap().payload().len(), MAX_PAYLOAD_SIZE);

        let err = DataBlock::new(vec![0; MAX_PAYLOAD_SIZE + 1], header).unwrap_err();
        assert!(matches!(err, EncodeError::PayloadTooLarge { size: 477 }));
    }

    #[test]
    fn display_is_one_based() {
        assert_eq!(sample().to_string(), "block 3/4 (5 bytes @ 0x10002000)");
    }

    #[test]
    fn display_shows_carried_payload_length() {
        let mut block = sample();
        block.header.payload_size = 256;
        assert_eq!(block.to_string(), "block 3/4 (5 bytes @ 0x10002000)");
    }
}
