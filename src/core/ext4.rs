//! ext2/ext3/ext4 adapter
//!
//! Reads just enough of the on-disk format to answer the
//! [`FilesystemAdapter`] questions: the superblock, the group descriptor
//! table and the block bitmaps. Nothing is ever written.
//!
//! # Layout
//!
//! ```text
//! byte 1024          superblock (1024 bytes, magic 0xEF53 at +0x38)
//! block fdb + 1      group descriptor table (32 or s_desc_size bytes each)
//! bg_block_bitmap    one bitmap block per initialized group
//! ```
//!
//! Like libext2fs, every initialized group's bitmap is loaded up front so
//! that allocation lookups never touch the device.

use crate::adapter::{FilesystemAdapter, GroupFlags};
use crate::error::{EntropyError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const SUPERBLOCK_SIZE: usize = 1024;
pub const EXT4_MAGIC: u16 = 0xEF53;

pub const INCOMPAT_META_BG: u32 = 0x0010;
pub const INCOMPAT_64BIT: u32 = 0x0080;
pub const RO_COMPAT_GDT_CSUM: u32 = 0x0010;
pub const RO_COMPAT_BIGALLOC: u32 = 0x0200;
pub const RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

const DESC_SIZE: usize = 32;
const DESC_SIZE_64BIT: usize = 64;
/// 64 KiB blocks
const MAX_LOG_BLOCK_SIZE: u32 = 6;

fn le_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn le_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn block_offset(block: u64, block_size: usize) -> Result<u64> {
    block
        .checked_mul(block_size as u64)
        .ok_or_else(|| EntropyError::invalid(format!("block {} is not addressable", block)))
}

/// Superblock fields the adapter depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub blocks_count: u64,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub log_cluster_size: u32,
    pub blocks_per_group: u32,
    pub clusters_per_group: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
    pub desc_size: u16,
}

impl Superblock {
    /// Parse and sanity-check a raw superblock
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(EntropyError::invalid(format!(
                "superblock needs {} bytes, got {}",
                SUPERBLOCK_SIZE,
                buf.len()
            )));
        }

        let magic = le_u16(buf, 0x38);
        if magic != EXT4_MAGIC {
            return Err(EntropyError::invalid(format!(
                "not an ext filesystem (magic {:#06x})",
                magic
            )));
        }

        let feature_incompat = le_u32(buf, 0x60);
        let blocks_hi = if feature_incompat & INCOMPAT_64BIT != 0 {
            le_u32(buf, 0x150) as u64
        } else {
            0
        };

        let sb = Superblock {
            blocks_count: (blocks_hi << 32) | le_u32(buf, 0x04) as u64,
            first_data_block: le_u32(buf, 0x14),
            log_block_size: le_u32(buf, 0x18),
            log_cluster_size: le_u32(buf, 0x1C),
            blocks_per_group: le_u32(buf, 0x20),
            clusters_per_group: le_u32(buf, 0x24),
            feature_incompat,
            feature_ro_compat: le_u32(buf, 0x64),
            desc_size: le_u16(buf, 0xFE),
        };
        sb.validate()?;
        Ok(sb)
    }

    fn validate(&self) -> Result<()> {
        if self.log_block_size > MAX_LOG_BLOCK_SIZE {
            return Err(EntropyError::invalid(format!(
                "unsupported block size exponent {}",
                self.log_block_size
            )));
        }
        if self.blocks_per_group == 0 || self.clusters_per_group == 0 {
            return Err(EntropyError::invalid("superblock declares empty block groups"));
        }
        if self.blocks_count <= self.first_data_block as u64 {
            return Err(EntropyError::invalid(format!(
                "block count {} does not exceed first data block {}",
                self.blocks_count, self.first_data_block
            )));
        }
        if self.is_64bit() && (self.desc_size as usize) < DESC_SIZE {
            return Err(EntropyError::invalid(format!(
                "descriptor size {} too small",
                self.desc_size
            )));
        }
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        1024usize << self.log_block_size
    }

    pub fn is_64bit(&self) -> bool {
        self.feature_incompat & INCOMPAT_64BIT != 0
    }

    pub fn descriptor_size(&self) -> usize {
        if self.is_64bit() {
            self.desc_size as usize
        } else {
            DESC_SIZE
        }
    }

    /// Group descriptors carry checksums (`gdt_csum` or `metadata_csum`)
    pub fn has_group_checksums(&self) -> bool {
        self.feature_ro_compat & (RO_COMPAT_GDT_CSUM | RO_COMPAT_METADATA_CSUM) != 0
    }

    pub fn group_count(&self) -> u64 {
        (self.blocks_count - self.first_data_block as u64).div_ceil(self.blocks_per_group as u64)
    }
}

/// One group descriptor, reduced to what the scan needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupDescriptor {
    pub block_bitmap: u64,
    pub flags: GroupFlags,
}

impl GroupDescriptor {
    pub fn from_bytes(buf: &[u8]) -> Self {
        let lo = le_u32(buf, 0x00) as u64;
        let hi = if buf.len() >= DESC_SIZE_64BIT {
            le_u32(buf, 0x20) as u64
        } else {
            0
        };

        GroupDescriptor {
            block_bitmap: (hi << 32) | lo,
            flags: GroupFlags::from_bits(le_u16(buf, 0x12)),
        }
    }
}

/// Read-only ext filesystem handle
pub struct Ext4Image<R: Read + Seek = File> {
    reader: R,
    superblock: Superblock,
    descriptors: Vec<GroupDescriptor>,
    bitmaps: Vec<Option<Vec<u8>>>,
    capacity: u64,
}

impl Ext4Image<File> {
    /// Open a device or image file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("Opened {:?}", path.as_ref());
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> Ext4Image<R> {
    /// Parse the filesystem metadata behind `reader` and load its bitmaps
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let mut raw = vec![0u8; SUPERBLOCK_SIZE];
        reader.seek(SeekFrom::Start(SUPERBLOCK_OFFSET))?;
        reader.read_exact(&mut raw)?;
        let superblock = Superblock::from_bytes(&raw)?;

        if superblock.feature_ro_compat & RO_COMPAT_BIGALLOC != 0
            || superblock.log_cluster_size != superblock.log_block_size
        {
            return Err(EntropyError::invalid(
                "bigalloc filesystems (cluster size != block size) are not supported",
            ));
        }
        if superblock.feature_incompat & INCOMPAT_META_BG != 0 {
            return Err(EntropyError::invalid(
                "meta_bg descriptor layout is not supported",
            ));
        }

        let block_size = superblock.block_size() as u64;
        let capacity = reader.seek(SeekFrom::End(0))? / block_size;

        let mut image = Ext4Image {
            reader,
            superblock,
            descriptors: Vec::new(),
            bitmaps: Vec::new(),
            capacity,
        };
        image.read_descriptors()?;
        image.read_bitmaps()?;

        debug!(
            block_size,
            blocks = superblock.blocks_count,
            groups = superblock.group_count(),
            clusters_per_group = superblock.clusters_per_group,
            group_checksums = superblock.has_group_checksums(),
            capacity,
            "Loaded ext filesystem metadata"
        );
        Ok(image)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn descriptors(&self) -> &[GroupDescriptor] {
        &self.descriptors
    }

    fn device_bytes(&self) -> u64 {
        self.capacity * self.superblock.block_size() as u64
    }

    fn read_descriptors(&mut self) -> Result<()> {
        let desc_size = self.superblock.descriptor_size();
        let groups = self.superblock.group_count() as usize;
        let table_block = self.superblock.first_data_block as u64 + 1;

        let table_start = table_block * self.superblock.block_size() as u64;
        let table_len = groups
            .checked_mul(desc_size)
            .filter(|&len| {
                table_start.saturating_add(len as u64) <= self.device_bytes()
            })
            .ok_or_else(|| {
                EntropyError::invalid(format!(
                    "descriptor table for {} groups extends past the end of the device",
                    groups
                ))
            })?;

        let mut table = vec![0u8; table_len];
        self.reader.seek(SeekFrom::Start(table_start))?;
        self.reader.read_exact(&mut table)?;

        self.descriptors = table
            .chunks_exact(desc_size)
            .map(GroupDescriptor::from_bytes)
            .collect();
        Ok(())
    }

    fn read_bitmaps(&mut self) -> Result<()> {
        let block_size = self.superblock.block_size();
        let bitmap_bytes = (self.superblock.clusters_per_group as usize).div_ceil(8);
        if bitmap_bytes > block_size {
            return Err(EntropyError::invalid(format!(
                "{} clusters per group do not fit one bitmap block",
                self.superblock.clusters_per_group
            )));
        }

        let checksums = self.superblock.has_group_checksums();
        let mut bitmaps = Vec::with_capacity(self.descriptors.len());
        let mut block = vec![0u8; block_size];

        for (group, desc) in self.descriptors.iter().enumerate() {
            if checksums && desc.flags.contains(GroupFlags::BLOCK_UNINIT) {
                bitmaps.push(None);
                continue;
            }
            if desc.block_bitmap >= self.superblock.blocks_count {
                return Err(EntropyError::invalid(format!(
                    "group {} bitmap at block {} lies outside the filesystem",
                    group, desc.block_bitmap
                )));
            }

            self.reader
                .seek(SeekFrom::Start(block_offset(desc.block_bitmap, block_size)?))?;
            self.reader.read_exact(&mut block)?;
            bitmaps.push(Some(block[..bitmap_bytes].to_vec()));
        }

        self.bitmaps = bitmaps;
        Ok(())
    }
}

impl<R: Read + Seek> FilesystemAdapter for Ext4Image<R> {
    fn group_count(&self) -> u64 {
        self.superblock.group_count()
    }

    fn clusters_per_group(&self) -> u64 {
        self.superblock.clusters_per_group as u64
    }

    fn block_size(&self) -> usize {
        self.superblock.block_size()
    }

    fn has_group_checksums(&self) -> bool {
        self.superblock.has_group_checksums()
    }

    fn group_flags(&self, group: u64) -> GroupFlags {
        self.descriptors
            .get(group as usize)
            .map(|desc| desc.flags)
            .unwrap_or_default()
    }

    fn device_block_capacity(&self) -> Result<u64> {
        Ok(self.capacity)
    }

    fn is_block_used(&self, block: u64) -> bool {
        let first = self.superblock.first_data_block as u64;
        if block < first || block >= self.superblock.blocks_count {
            return true;
        }

        let relative = block - first;
        let per_group = self.superblock.blocks_per_group as u64;
        let group = (relative / per_group) as usize;
        let bit = (relative % per_group) as usize;

        match self.bitmaps.get(group) {
            Some(Some(bitmap)) => bitmap
                .get(bit / 8)
                .map(|byte| byte & (1u8 << (bit % 8)) != 0)
                .unwrap_or(true),
            _ => false,
        }
    }

    fn read_block(&mut self, block: u64, buf: &mut [u8]) -> Result<()> {
        let block_size = self.superblock.block_size();
        if buf.len() != block_size {
            return Err(EntropyError::invalid(format!(
                "buffer is {} bytes, block size is {}",
                buf.len(),
                block_size
            )));
        }

        if block >= self.capacity {
            return Err(EntropyError::OutOfRange);
        }
        self.reader
            .seek(SeekFrom::Start(block_offset(block, block_size)?))?;
        self.reader.read_exact(buf)?;
        Ok(())
    }
}
