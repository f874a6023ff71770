//! In-memory filesystem adapter
//!
//! Describes an arbitrary group layout without any on-disk image. Block
//! content is synthesized from the block index unless overridden, and reads
//! can be made to fail for chosen blocks.

use crate::adapter::{FilesystemAdapter, GroupFlags};
use crate::error::{EntropyError, Result};
use std::collections::{HashMap, HashSet};
use std::io;

/// Synthetic block-group layout
#[derive(Debug, Clone)]
pub struct MemoryFilesystem {
    group_count: u64,
    clusters_per_group: u64,
    block_size: usize,
    group_checksums: bool,
    group_flags: Vec<GroupFlags>,
    used: HashSet<u64>,
    capacity: u64,
    contents: HashMap<u64, Vec<u8>>,
    failing: HashSet<u64>,
    reads: u64,
}

impl MemoryFilesystem {
    /// Layout with every block free and capacity matching the groups
    pub fn new(group_count: u64, clusters_per_group: u64, block_size: usize) -> Self {
        MemoryFilesystem {
            group_count,
            clusters_per_group,
            block_size,
            group_checksums: true,
            group_flags: vec![GroupFlags::empty(); group_count as usize],
            used: HashSet::new(),
            capacity: group_count.saturating_mul(clusters_per_group),
            contents: HashMap::new(),
            failing: HashSet::new(),
            reads: 0,
        }
    }

    /// Toggle the group checksum feature
    pub fn with_group_checksums(mut self, enabled: bool) -> Self {
        self.group_checksums = enabled;
        self
    }

    /// Override the device capacity in blocks
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn set_group_flags(&mut self, group: u64, flags: GroupFlags) {
        if let Some(slot) = self.group_flags.get_mut(group as usize) {
            *slot = flags;
        }
    }

    pub fn mark_used(&mut self, blocks: impl IntoIterator<Item = u64>) {
        self.used.extend(blocks);
    }

    /// Store explicit content for a block (truncated or zero-padded)
    pub fn set_content(&mut self, block: u64, data: &[u8]) {
        let mut content = data.to_vec();
        content.resize(self.block_size, 0);
        self.contents.insert(block, content);
    }

    /// Make reads of `block` fail until [`MemoryFilesystem::heal`] is called
    pub fn fail_reads(&mut self, block: u64) {
        self.failing.insert(block);
    }

    pub fn heal(&mut self, block: u64) {
        self.failing.remove(&block);
    }

    /// Number of successful block reads served
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl FilesystemAdapter for MemoryFilesystem {
    fn group_count(&self) -> u64 {
        self.group_count
    }

    fn clusters_per_group(&self) -> u64 {
        self.clusters_per_group
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn has_group_checksums(&self) -> bool {
        self.group_checksums
    }

    fn group_flags(&self, group: u64) -> GroupFlags {
        self.group_flags
            .get(group as usize)
            .copied()
            .unwrap_or_default()
    }

    fn device_block_capacity(&self) -> Result<u64> {
        Ok(self.capacity)
    }

    fn is_block_used(&self, block: u64) -> bool {
        self.used.contains(&block)
    }

    fn read_block(&mut self, block: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size {
            return Err(EntropyError::invalid(format!(
                "buffer is {} bytes, block size is {}",
                buf.len(),
                self.block_size
            )));
        }
        if self.failing.contains(&block) {
            return Err(EntropyError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected read failure at block {}", block),
            )));
        }

        match self.contents.get(&block) {
            Some(content) => buf.copy_from_slice(content),
            None => {
                // Deterministic filler so tests can tell blocks apart
                let seed = block.to_le_bytes();
                for (i, byte) in buf.iter_mut().enumerate() {
                    *byte = seed[i % seed.len()];
                }
            }
        }
        self.reads += 1;
        Ok(())
    }
}
