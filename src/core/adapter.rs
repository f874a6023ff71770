//! Filesystem capability consumed by the free-block iterator
//!
//! The iterator never parses on-disk structures itself. Everything it needs
//! about group layout, allocation state and raw block content comes through
//! [`FilesystemAdapter`]. Opening is the implementor's constructor and
//! closing is `Drop`.

use crate::error::Result;

/// Block group descriptor flags (`bg_flags`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupFlags(u16);

impl GroupFlags {
    /// Inode table and bitmap not initialized
    pub const INODE_UNINIT: GroupFlags = GroupFlags(0x0001);
    /// Block bitmap never initialized
    pub const BLOCK_UNINIT: GroupFlags = GroupFlags(0x0002);
    /// Inode table zeroed
    pub const ITABLE_ZEROED: GroupFlags = GroupFlags(0x0004);

    pub const fn empty() -> Self {
        GroupFlags(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        GroupFlags(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: GroupFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for GroupFlags {
    type Output = GroupFlags;

    fn bitor(self, rhs: GroupFlags) -> GroupFlags {
        GroupFlags(self.0 | rhs.0)
    }
}

/// Read-only view of a block-group structured filesystem
pub trait FilesystemAdapter {
    /// Number of block groups
    fn group_count(&self) -> u64;

    /// Clusters (allocation units) per block group
    fn clusters_per_group(&self) -> u64;

    /// Fixed block size in bytes
    fn block_size(&self) -> usize;

    /// Whether group descriptors carry checksums, which is what makes
    /// `bg_flags` trustworthy
    fn has_group_checksums(&self) -> bool;

    /// Flag word of one group descriptor
    fn group_flags(&self, group: u64) -> GroupFlags;

    /// Number of blocks the underlying device can actually address
    fn device_block_capacity(&self) -> Result<u64>;

    /// Whether the allocation bitmap marks `block` as in use
    fn is_block_used(&self, block: u64) -> bool;

    /// Read exactly one block into `buf` (`buf.len() == block_size()`)
    fn read_block(&mut self, block: u64, buf: &mut [u8]) -> Result<()>;
}
