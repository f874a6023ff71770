//! Forward-only walk over the unallocated blocks of a filesystem
//!
//! Groups are visited in ascending order and blocks in ascending order
//! within each group, so no block index is ever yielded twice.
//!
//! # Uninitialized groups
//!
//! A group whose descriptor carries `BLOCK_UNINIT` is skipped as a whole:
//! none of its blocks are reported as free. The flag says the bitmap was
//! never written, which usually means the blocks were never written either,
//! but on a reformatted or reused device they can still hold old data. The
//! flag is optional at mkfs time, so its absence says nothing about whether
//! a group was ever touched. Callers that need those blocks must read them
//! through the adapter directly.

use crate::adapter::{FilesystemAdapter, GroupFlags};
use crate::error::{EntropyError, Result};
use tracing::{debug, trace, warn};

/// In-group offset of the very first probe; block 0 (boot sector and
/// superblock region) is never reported
pub const FIRST_SCANNED_OFFSET: u64 = 1;

/// Iterator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    Scanning,
    /// Terminal: every later call fails with `OutOfRange`
    Exhausted,
}

/// Stateful cursor over free blocks, bound to one adapter for one session
pub struct FreeBlockIterator<'a, A: FilesystemAdapter + ?Sized> {
    adapter: &'a mut A,
    state: IteratorState,
    group: u64,
    offset: u64,
    resume_offset: u64,
    group_flags: Option<GroupFlags>,
    max_blocks: u64,
}

impl<'a, A: FilesystemAdapter + ?Sized> FreeBlockIterator<'a, A> {
    /// Start a scan session
    ///
    /// # Errors
    ///
    /// Propagates the adapter's failure to report the device capacity.
    pub fn new(adapter: &'a mut A) -> Result<Self> {
        let max_blocks = adapter.device_block_capacity()?;
        debug!(
            groups = adapter.group_count(),
            clusters_per_group = adapter.clusters_per_group(),
            block_size = adapter.block_size(),
            max_blocks,
            "Starting free block scan"
        );

        Ok(FreeBlockIterator {
            adapter,
            state: IteratorState::Scanning,
            group: 0,
            offset: 0,
            resume_offset: FIRST_SCANNED_OFFSET,
            group_flags: None,
            max_blocks,
        })
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    /// Block size every buffer passed to [`FreeBlockIterator::next_block`] must have
    pub fn block_size(&self) -> usize {
        self.adapter.block_size()
    }

    /// Device capacity in blocks, as reported when the session started
    pub fn max_blocks(&self) -> u64 {
        self.max_blocks
    }

    /// Group the cursor currently sits in
    pub fn current_group(&self) -> u64 {
        self.group
    }

    /// Read the next free block into `buf` and return its absolute index
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `buf` is not exactly one block; nothing changes.
    /// - `OutOfRange` once every group is consumed or the device capacity is
    ///   reached. The iterator is then exhausted for good.
    /// - The adapter's read error. The cursor stays on the failed block, so
    ///   the next call retries it.
    pub fn next_block(&mut self, buf: &mut [u8]) -> Result<u64> {
        let block_size = self.adapter.block_size();
        if buf.len() != block_size {
            return Err(EntropyError::invalid(format!(
                "buffer is {} bytes, filesystem block size is {}",
                buf.len(),
                block_size
            )));
        }
        if self.state == IteratorState::Exhausted {
            return Err(EntropyError::OutOfRange);
        }

        let clusters_per_group = self.adapter.clusters_per_group();
        self.offset = self.resume_offset;

        loop {
            if self.group >= self.adapter.group_count() {
                return Err(self.exhaust("all block groups consumed"));
            }

            let flags = self.current_group_flags();
            if flags.contains(GroupFlags::BLOCK_UNINIT) {
                debug!(group = self.group, "Skipping block group with uninitialized bitmap");
                self.advance_group();
                continue;
            }

            while self.offset < clusters_per_group {
                let block = self
                    .group
                    .saturating_mul(clusters_per_group)
                    .saturating_add(self.offset);
                if block >= self.max_blocks {
                    return Err(self.exhaust("device capacity reached"));
                }

                if self.adapter.is_block_used(block) {
                    self.offset += 1;
                    continue;
                }

                if let Err(err) = self.adapter.read_block(block, buf) {
                    warn!(block, error = %err, "Failed to read free block");
                    self.resume_offset = self.offset;
                    return Err(err);
                }

                self.resume_offset = self.offset + 1;
                trace!(block, "Free block");
                return Ok(block);
            }

            self.advance_group();
        }
    }

    /// Drive the scan to completion, handing each free block to `f`
    ///
    /// Returns the number of blocks visited. Normal exhaustion ends the
    /// walk; any other error (from the adapter or from `f`) is returned.
    pub fn for_each_free_block<F>(&mut self, mut f: F) -> Result<u64>
    where
        F: FnMut(u64, &[u8]) -> Result<()>,
    {
        let mut buf = vec![0u8; self.block_size()];
        let mut visited = 0u64;

        loop {
            match self.next_block(&mut buf) {
                Ok(block) => {
                    f(block, &buf)?;
                    visited += 1;
                }
                Err(EntropyError::OutOfRange) => return Ok(visited),
                Err(err) => return Err(err),
            }
        }
    }

    fn current_group_flags(&mut self) -> GroupFlags {
        if let Some(flags) = self.group_flags {
            return flags;
        }

        // Without descriptor checksums the flag word cannot be trusted
        let flags = if self.adapter.has_group_checksums() {
            self.adapter.group_flags(self.group)
        } else {
            GroupFlags::empty()
        };
        self.group_flags = Some(flags);
        flags
    }

    fn advance_group(&mut self) {
        self.group += 1;
        self.offset = 0;
        self.group_flags = None;
    }

    fn exhaust(&mut self, reason: &str) -> EntropyError {
        debug!(group = self.group, offset = self.offset, reason, "Free block scan exhausted");
        self.state = IteratorState::Exhausted;
        EntropyError::OutOfRange
    }
}
