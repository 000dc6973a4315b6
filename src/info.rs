//! Diagnostic summary of a UF2 file: address span, payload volume, gaps,
//! families and flags.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::family::Family;
use crate::file::Uf2File;
use crate::header::{flags, BlockHeader};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilySummary {
    pub id:          u32,
    pub name:        Option<&'static str>,
    pub description: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub block_count:     usize,
    /// Lowest block address.
    pub first_address:   Option<u32>,
    /// Highest block address (start of the last block in address order).
    pub last_address:    Option<u32>,
    /// One past the highest byte covered by any block.
    pub end_address:     Option<u64>,
    pub payload_bytes:   u64,
    /// Filler blocks that gap materialization would add.
    pub gap_blocks:      usize,
    pub all_have_family: bool,
    pub families:        Vec<FamilySummary>,
    /// Flag word → number of blocks carrying it.
    pub flags:           BTreeMap<u32, usize>,
}

impl FileSummary {
    pub fn of(file: &Uf2File) -> Self {
        let mut headers: Vec<BlockHeader> = file.iter().map(|b| b.header).collect();
        headers.sort_by_key(|h| h.address);
        let gap_blocks = headers.windows(2).map(|w| filler_count(&w[0], w[1].address)).sum();

        let mut families: BTreeMap<u32, FamilySummary> = BTreeMap::new();
        let mut flag_counts: BTreeMap<u32, usize> = BTreeMap::new();
        let mut all_have_family = true;
        let mut payload_bytes = 0u64;

        for block in file {
            payload_bytes += block.payload().len() as u64;
            *flag_counts.entry(block.header.flags).or_insert(0) += 1;

            match block.header.family_id() {
                Some(id) => {
                    families.entry(id).or_insert_with(|| {
                        let known = Family::by_id(id);
                        FamilySummary {
                            id,
                            name:        known.map(|f| f.name),
                            description: known.map(|f| f.description),
                        }
                    });
                }
                None => all_have_family = false,
            }
        }

        Self {
            block_count:     file.len(),
            first_address:   file.iter().map(|b| b.header.address).min(),
            last_address:    file.iter().map(|b| b.header.address).max(),
            end_address:     file.iter().map(|b| b.header.end_address()).max(),
            payload_bytes,
            gap_blocks,
            all_have_family: all_have_family && !file.is_empty(),
            families:        families.into_values().collect(),
            flags:           flag_counts,
        }
    }

    pub fn has_gaps(&self) -> bool {
        self.gap_blocks > 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Fillers `Uf2File::generate_blocks_for_gaps` inserts after `tail` when
/// the next block starts at `next`.
fn filler_count(tail: &BlockHeader, next: u32) -> usize {
    let (end, next) = (tail.end_address(), u64::from(next));
    if end >= next || tail.payload_size == 0 {
        return 0;
    }
    (next - end).div_ceil(u64::from(tail.payload_size)) as usize
}

impl fmt::Display for FileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some(first), Some(last)) = (self.first_address, self.last_address) else {
            return writeln!(f, "  Contains no blocks");
        };

        writeln!(f, "  Span           {first:#x} - {last:#x} in {} blocks", self.block_count)?;
        writeln!(f, "  Payload        {} bytes", self.payload_bytes)?;
        if self.has_gaps() {
            writeln!(f, "  Gaps           {} blocks needed to fill", self.gap_blocks)?;
        } else {
            writeln!(f, "  Gaps           none")?;
        }

        if self.families.is_empty() {
            writeln!(f, "  Board family   not set")?;
        } else {
            let coverage = if self.all_have_family { "all blocks" } else { "some blocks only" };
            writeln!(f, "  Board family   ({coverage})")?;
            for fam in &self.families {
                match fam.description {
                    Some(desc) => writeln!(f, "    {desc}")?,
                    None       => writeln!(f, "    unknown family {:#010x}", fam.id)?,
                }
            }
        }

        writeln!(f, "  Flags")?;
        for (value, count) in &self.flags {
            writeln!(f, "    {value:#06x} {:<24} {count} blocks", flags::describe(*value))?;
        }
        Ok(())
    }
}
