//! End-to-end scans of synthetic ext4 images written to disk

use entropy_rs::{
    Algorithm, BinSize, EntropyError, Ext4Image, FilesystemAdapter, FreeBlockIterator,
    FrequencyContext, MetricPlan, OutputFormat, ReportWriter, ScanOptions,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::io::Write;
use tempfile::NamedTempFile;

const BLOCK: usize = 4096;
const RO_COMPAT_GDT_CSUM: u32 = 0x0010;
const INCOMPAT_64BIT: u32 = 0x0080;
const BG_BLOCK_UNINIT: u16 = 0x0002;

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn set_bits(bitmap: &mut [u8], bits: std::ops::Range<usize>) {
    for bit in bits {
        bitmap[bit / 8] |= 1 << (bit % 8);
    }
}

/// Layout of a small 4 KiB-block filesystem
struct ImageSpec {
    blocks: u32,
    per_group: u32,
    incompat: u32,
    ro_compat: u32,
    desc_size: usize,
    /// Per group: bitmap block, flags, used bit range
    groups: Vec<(u32, u16, std::ops::Range<usize>)>,
    /// Bytes actually present on the device
    device_blocks: usize,
}

impl ImageSpec {
    fn render(&self) -> Vec<u8> {
        let mut image = vec![0u8; self.device_blocks * BLOCK];

        let sb = 1024;
        put_u32(&mut image, sb + 0x04, self.blocks);
        put_u32(&mut image, sb + 0x18, 2);
        put_u32(&mut image, sb + 0x1C, 2);
        put_u32(&mut image, sb + 0x20, self.per_group);
        put_u32(&mut image, sb + 0x24, self.per_group);
        put_u16(&mut image, sb + 0x38, 0xEF53);
        put_u32(&mut image, sb + 0x60, self.incompat);
        put_u32(&mut image, sb + 0x64, self.ro_compat);
        put_u16(&mut image, sb + 0xFE, self.desc_size as u16);

        for (group, (bitmap, flags, used)) in self.groups.iter().enumerate() {
            let desc = BLOCK + group * self.desc_size;
            put_u32(&mut image, desc, *bitmap);
            put_u16(&mut image, desc + 0x12, *flags);

            let start = *bitmap as usize * BLOCK;
            set_bits(&mut image[start..start + BLOCK], used.clone());
        }
        image
    }

    fn write(&self, patch: impl FnOnce(&mut Vec<u8>)) -> NamedTempFile {
        let mut image = self.render();
        patch(&mut image);
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&image).unwrap();
        file.flush().unwrap();
        file
    }
}

/// Three groups of 32; group 2 never initialized; device cut at block 60
fn three_group_spec() -> ImageSpec {
    ImageSpec {
        blocks: 96,
        per_group: 32,
        incompat: 0,
        ro_compat: RO_COMPAT_GDT_CSUM,
        desc_size: 32,
        groups: vec![(2, 0, 0..6), (3, 0, 0..4), (4, BG_BLOCK_UNINIT, 0..0)],
        device_blocks: 60,
    }
}

fn free_blocks(fs: &mut Ext4Image) -> Vec<u64> {
    let mut iter = FreeBlockIterator::new(fs).unwrap();
    let mut blocks = Vec::new();
    iter.for_each_free_block(|block, _| {
        blocks.push(block);
        Ok(())
    })
    .unwrap();
    blocks
}

#[test]
fn test_open_reports_geometry() {
    let file = three_group_spec().write(|_| {});
    let fs = Ext4Image::open(file.path()).unwrap();

    assert_eq!(fs.group_count(), 3);
    assert_eq!(fs.clusters_per_group(), 32);
    assert_eq!(fs.block_size(), BLOCK);
    assert!(fs.has_group_checksums());
    assert_eq!(fs.device_block_capacity().unwrap(), 60);
    assert_eq!(fs.descriptors().len(), 3);
}

#[test]
fn test_walk_skips_metadata_uninit_group_and_missing_tail() {
    let file = three_group_spec().write(|_| {});
    let mut fs = Ext4Image::open(file.path()).unwrap();

    let expected: Vec<u64> = (6..32).chain(36..60).collect();
    assert_eq!(free_blocks(&mut fs), expected);
}

#[test]
fn test_without_checksums_uninit_flag_is_ignored() {
    let mut spec = three_group_spec();
    spec.ro_compat = 0;
    spec.device_blocks = 96;
    let file = spec.write(|_| {});
    let mut fs = Ext4Image::open(file.path()).unwrap();

    // Group 2's bitmap is read and found empty
    let expected: Vec<u64> = (6..32).chain(36..96).collect();
    assert_eq!(free_blocks(&mut fs), expected);
}

#[test]
fn test_high_entropy_block_is_found() {
    let mut rng = StdRng::seed_from_u64(7);
    let file = three_group_spec().write(|image| {
        rng.fill_bytes(&mut image[40 * BLOCK..41 * BLOCK]);
    });
    let mut fs = Ext4Image::open(file.path()).unwrap();

    let options = ScanOptions::builder()
        .metrics([Algorithm::Shannon])
        .min_entropy(7.5)
        .build()
        .unwrap();
    let plan = MetricPlan::new(&options).unwrap();
    let mut report = ReportWriter::new(Vec::new(), OutputFormat::Csv, BinSize::default());
    let mut ctx = FrequencyContext::new();

    let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
    let visited = iter
        .for_each_free_block(|block, data| {
            ctx.reset();
            ctx.update(data);
            if let Some(measurements) = plan.evaluate(&ctx)? {
                report.write_unit(Some(block), &measurements)?;
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(visited, 50);
    let out = String::from_utf8(report.into_inner()).unwrap();
    assert!(out.starts_with("40, 7.9"), "unexpected report {:?}", out);
    assert_eq!(out.lines().count(), 1);
}

#[test]
fn test_64bit_descriptors() {
    let spec = ImageSpec {
        blocks: 32,
        per_group: 16,
        incompat: INCOMPAT_64BIT,
        ro_compat: RO_COMPAT_GDT_CSUM,
        desc_size: 64,
        groups: vec![(2, 0, 0..4), (3, 0, 0..2)],
        device_blocks: 32,
    };
    let file = spec.write(|_| {});
    let mut fs = Ext4Image::open(file.path()).unwrap();

    assert_eq!(fs.superblock().descriptor_size(), 64);
    let expected: Vec<u64> = (4..16).chain(18..32).collect();
    assert_eq!(free_blocks(&mut fs), expected);
}

#[test]
fn test_not_an_ext_filesystem() {
    let file = three_group_spec().write(|image| {
        image[1024 + 0x38] = 0;
    });
    assert!(matches!(
        Ext4Image::open(file.path()),
        Err(EntropyError::InvalidArgument(_))
    ));
}

#[test]
fn test_missing_device() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Ext4Image::open(dir.path().join("no-such-device")),
        Err(EntropyError::Io(_))
    ));
}
