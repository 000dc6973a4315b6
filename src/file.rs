//! [`Uf2File`]: an ordered, editable list of UF2 blocks.
//!
//! ```no_run
//! use uf2tool::file::{FileOptions, Uf2File};
//!
//! // Build from scratch
//! let mut uf2 = Uf2File::with_options(FileOptions { fill_gaps: true, ..Default::default() });
//! uf2.append_payload(&[0x42; 1000], 0x1000_0000)?;
//! uf2.save("firmware.uf2")?;
//!
//! // Read back
//! let uf2 = Uf2File::open("firmware.uf2")?;
//! assert_eq!(uf2.extract_payload(0x1000_0000, None).len(), 1000);
//! # Ok::<(), uf2tool::file::FileError>(())
//! ```
//!
//! # Normalization
//! Blocks may be appended in any address order and their numbering is only
//! provisional.  Saving a modified file first repairs it: sort by address
//! (when gap filling or resorting is enabled), renumber, materialize gaps
//! (when enabled), renumber again.  A file that was only loaded is written
//! back exactly as read.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::ops::Index;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::block::{DataBlock, EncodeError};
use crate::family::RP2040_FAMILY_ID;
use crate::header::{
    BlockHeader, FormatError, MagicOverrides, BLOCK_SIZE, DEFAULT_BLOCK_PAYLOAD_SIZE,
    MAX_PAYLOAD_SIZE,
};

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FileError {
    #[error("Malformed block at index {index}: {source}")]
    Format {
        index:  usize,
        #[source]
        source: FormatError,
    },
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── FileOptions ──────────────────────────────────────────────────────────────

/// Configuration for a [`Uf2File`].
#[derive(Debug, Clone, Copy)]
pub struct FileOptions {
    /// Family id written into the prototype header of a new file.
    pub family_id:                   u32,
    /// Materialize address gaps as zero-filled blocks on save.
    pub fill_gaps:                   bool,
    /// Sort by address on save even without gap filling.
    pub resort_on_save:              bool,
    /// Copy address, flags and family from the first block read into the
    /// prototype header.
    pub overwrite_prototype_on_read: bool,
    /// Magic numbers used for every block this file reads or produces.
    pub magic:                       MagicOverrides,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            family_id:                   RP2040_FAMILY_ID,
            fill_gaps:                   false,
            resort_on_save:              false,
            overwrite_prototype_on_read: true,
            magic:                       MagicOverrides::default(),
        }
    }
}

// ── Uf2File ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Uf2File {
    path:    Option<PathBuf>,
    header:  BlockHeader,
    blocks:  Vec<DataBlock>,
    options: FileOptions,
    dirty:   bool,
}

impl Default for Uf2File {
    fn default() -> Self {
        Self::new()
    }
}

impl Uf2File {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn new() -> Self {
        Self::with_options(FileOptions::default())
    }

    pub fn with_options(options: FileOptions) -> Self {
        Self {
            path:    None,
            header:  BlockHeader::prototype(options.family_id),
            blocks:  Vec::new(),
            options,
            dirty:   false,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FileError> {
        Self::open_with(path, FileOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: FileOptions) -> Result<Self, FileError> {
        let mut uf2 = Self::with_options(options);
        uf2.load(path)?;
        Ok(uf2)
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Decode every 512-byte block of `reader`, in file order.
    ///
    /// A trailing chunk shorter than a block fails with
    /// [`FormatError::WrongBlockSize`].
    pub fn read_blocks<R: Read>(mut reader: R, magic: MagicOverrides) -> Result<Vec<DataBlock>, FileError> {
        let mut blocks = Vec::new();
        let mut buf = [0u8; BLOCK_SIZE];
        loop {
            let n = read_chunk(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let block = DataBlock::from_block_with_magic(&buf[..n], magic)
                .map_err(|source| FileError::Format { index: blocks.len(), source })?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Replace the contents of this file with the blocks read from `reader`.
    pub fn read_from<R: Read>(&mut self, reader: R) -> Result<(), FileError> {
        let blocks = Self::read_blocks(reader, self.options.magic)?;

        if self.options.overwrite_prototype_on_read {
            if let Some(first) = blocks.first() {
                self.header.address        = first.header.address;
                self.header.flags          = first.header.flags;
                self.header.family_or_size = first.header.family_or_size;
            }
        }
        self.header.total_blocks = blocks.len() as u32;

        debug!("read {} blocks", blocks.len());
        self.blocks = blocks;
        self.dirty  = false;
        Ok(())
    }

    /// Replace the contents of this file with those of the file at `path`.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), FileError> {
        let path = path.as_ref();
        if !std::fs::metadata(path)?.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ).into());
        }
        self.read_from(File::open(path)?)?;
        self.path = Some(path.to_owned());
        Ok(())
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Write every block in its current order, normalizing first if the
    /// block list changed since it was read or last written.
    pub fn write_to<W: Write>(&mut self, mut writer: W) -> Result<(), FileError> {
        self.normalize_if_dirty()?;
        for block in &self.blocks {
            block.write(&mut writer)?;
        }
        writer.flush()?;
        debug!("wrote {} blocks", self.blocks.len());
        Ok(())
    }

    /// Normalization runs before `path` is opened, so a failed save leaves
    /// an existing file untouched.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), FileError> {
        let path = path.as_ref();
        self.normalize_if_dirty()?;
        self.write_to(BufWriter::new(File::create(path)?))?;
        self.path = Some(path.to_owned());
        Ok(())
    }

    fn normalize_if_dirty(&mut self) -> Result<(), EncodeError> {
        if self.dirty {
            self.normalize()?;
            self.dirty = false;
        }
        Ok(())
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    /// Blocks take this file's magic numbers when it has overrides set.
    pub fn append_block(&mut self, block: DataBlock) {
        let block = if self.options.magic.is_default() {
            block
        } else {
            block.with_magic(self.options.magic)
        };
        self.blocks.push(block);
        self.dirty = true;
    }

    /// Split `payload` into blocks of [`DEFAULT_BLOCK_PAYLOAD_SIZE`] bytes
    /// placed from `start_offset` upward.  Returns the number of blocks added.
    pub fn append_payload(&mut self, payload: &[u8], start_offset: u32) -> Result<usize, EncodeError> {
        self.append_payload_chunked(payload, start_offset, DEFAULT_BLOCK_PAYLOAD_SIZE)
    }

    /// Split `payload` into blocks of `block_payload_size` bytes (the last
    /// one may be shorter), each built from a copy of the prototype header.
    ///
    /// Block numbers are provisional until the next normalization.
    pub fn append_payload_chunked(
        &mut self,
        payload:            &[u8],
        start_offset:       u32,
        block_payload_size: usize,
    ) -> Result<usize, EncodeError> {
        if block_payload_size == 0 || block_payload_size > MAX_PAYLOAD_SIZE {
            return Err(EncodeError::InvalidChunkSize { size: block_payload_size });
        }
        if !payload.is_empty()
            && u64::from(start_offset) + payload.len() as u64 - 1 > u64::from(u32::MAX)
        {
            return Err(EncodeError::AddressOverflow { address: start_offset, len: payload.len() });
        }

        let mut cursor = start_offset;
        let mut added = 0;
        for chunk in payload.chunks(block_payload_size) {
            let mut header = self.header;
            header.block_number = self.blocks.len() as u32;
            header.payload_size = chunk.len() as u32;
            header.address      = cursor;
            cursor = cursor.wrapping_add(chunk.len() as u32);

            let block = DataBlock::new(chunk.to_vec(), header)?.with_magic(self.options.magic);
            self.append_block(block);
            added += 1;
        }
        Ok(added)
    }

    // ── Normalization ────────────────────────────────────────────────────────

    /// Stable sort by target address.
    pub fn sort_blocks(&mut self) {
        self.blocks.sort_by_key(|b| b.header.address);
    }

    /// Number every block by its position and set every total to the length.
    pub fn renumber_blocks(&mut self) {
        let total = self.blocks.len() as u32;
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.header.block_number = i as u32;
            block.header.total_blocks = total;
        }
    }

    /// Insert zero-filled blocks wherever a block ends before the next one
    /// starts.  Blocks must already be sorted by address.
    ///
    /// Fillers copy the header of the block before them and have its payload
    /// size, so a gap that is not a multiple of that size ends with a filler
    /// that overlaps the next block.  Returns the number of fillers added.
    pub fn generate_blocks_for_gaps(&mut self) -> Result<usize, EncodeError> {
        if self.blocks.len() < 2 {
            return Ok(0);
        }
        for pair in self.blocks.windows(2) {
            let size = pair[0].header.payload_size as usize;
            if size > MAX_PAYLOAD_SIZE && pair[0].header.end_address() < u64::from(pair[1].header.address) {
                return Err(EncodeError::PayloadTooLarge { size });
            }
        }

        let original = self.blocks.len();
        let mut filled = Vec::with_capacity(original);
        let mut blocks = std::mem::take(&mut self.blocks).into_iter().peekable();

        while let Some(block) = blocks.next() {
            let mut tail = block.header;
            filled.push(block);

            let next_address = match blocks.peek() {
                Some(next) => u64::from(next.header.address),
                None       => break,
            };
            if tail.end_address() >= next_address {
                continue;
            }
            if tail.payload_size == 0 {
                warn!("cannot fill gap after empty block @ {:#x}", tail.address);
                continue;
            }

            info!(
                "empty space {:#x}..{:#x}: {} bytes to pad in {} byte chunks",
                tail.end_address(), next_address,
                next_address - tail.end_address(), tail.payload_size,
            );
            while tail.end_address() < next_address {
                let mut header = tail;
                header.address      = tail.address + tail.payload_size;
                header.block_number = tail.block_number.wrapping_add(1);
                debug!("filler {header}");

                let payload = vec![0u8; tail.payload_size as usize];
                filled.push(DataBlock::new(payload, header)?.with_magic(self.options.magic));
                tail = header;
            }
        }

        self.blocks = filled;
        Ok(self.blocks.len() - original)
    }

    /// Repair ordering and numbering according to the file's options.
    pub fn normalize(&mut self) -> Result<(), EncodeError> {
        if self.options.fill_gaps || self.options.resort_on_save {
            self.sort_blocks();
        }
        self.renumber_blocks();

        if self.options.fill_gaps {
            let added = self.generate_blocks_for_gaps()?;
            if added > 0 {
                info!("added {added} filler blocks");
            }
            self.renumber_blocks();
        }
        Ok(())
    }

    // ── Extraction ───────────────────────────────────────────────────────────

    /// Concatenate, in address order, the payloads of blocks whose address
    /// lies in `offset_start..offset_end` (no upper bound when `None`).
    ///
    /// Blocks are included or excluded whole, and nothing is inserted for
    /// address gaps: call [`generate_blocks_for_gaps`](Self::generate_blocks_for_gaps)
    /// first for a contiguous image.
    pub fn extract_payload(&self, offset_start: u32, offset_end: Option<u32>) -> Vec<u8> {
        let mut sorted: Vec<&DataBlock> = self.blocks.iter().collect();
        sorted.sort_by_key(|b| b.header.address);

        let mut out = Vec::new();
        for block in sorted {
            let addr = block.header.address;
            if addr < offset_start || offset_end.is_some_and(|end| addr >= end) {
                continue;
            }
            out.extend_from_slice(block.payload());
        }
        out
    }

    /// All payload bytes in address order, gaps not accounted for.
    pub fn payload(&self) -> Vec<u8> {
        self.extract_payload(0, None)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DataBlock> {
        self.blocks.get(index)
    }

    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataBlock> {
        self.blocks.iter()
    }

    /// Prototype header used for blocks created by `append_payload`.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }

    pub fn flags(&self) -> u32 {
        self.header.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.header.flags = flags;
    }

    pub fn family_id(&self) -> Option<u32> {
        self.header.family_id()
    }

    pub fn set_family_id(&mut self, family_id: u32) {
        self.header.set_family_id(family_id);
    }

    pub fn start_address(&self) -> u32 {
        self.header.address
    }

    pub fn set_start_address(&mut self, address: u32) {
        self.header.address = address;
    }

    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut FileOptions {
        &mut self.options
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Index<usize> for Uf2File {
    type Output = DataBlock;

    fn index(&self, index: usize) -> &DataBlock {
        &self.blocks[index]
    }
}

impl<'a> IntoIterator for &'a Uf2File {
    type Item     = &'a DataBlock;
    type IntoIter = std::slice::Iter<'a, DataBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

impl fmt::Display for Uf2File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(f, "UF2 file {} ({} blocks)", p.display(), self.len()),
            None    => write!(f, "UF2 file ({} blocks)", self.len()),
        }
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Fill `buf` from `reader`, stopping early only at end of stream.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0)  => break,
            Ok(n)  => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
