//! Free block iterator behavior over synthetic layouts
//!
//! Covers the walk order, capacity clamping, uninitialized groups, read
//! failures and exhaustion, plus proptest invariants over random layouts

use entropy_rs::{
    EntropyError, FilesystemAdapter, FreeBlockIterator, GroupFlags, IteratorState,
    MemoryFilesystem,
};
use proptest::prelude::*;
use std::collections::HashSet;

const BLOCK: usize = 64;

fn collect(fs: &mut MemoryFilesystem) -> Vec<u64> {
    let mut iter = FreeBlockIterator::new(fs).unwrap();
    let mut buf = vec![0u8; BLOCK];
    let mut blocks = Vec::new();
    loop {
        match iter.next_block(&mut buf) {
            Ok(block) => blocks.push(block),
            Err(EntropyError::OutOfRange) => break,
            Err(err) => panic!("unexpected error: {}", err),
        }
    }
    blocks
}

#[test]
fn test_uninit_group_is_skipped() {
    let mut fs = MemoryFilesystem::new(2, 8, BLOCK);
    fs.mark_used([0, 1, 2]);
    fs.set_group_flags(1, GroupFlags::BLOCK_UNINIT);

    assert_eq!(collect(&mut fs), vec![3, 4, 5, 6, 7]);
}

#[test]
fn test_flags_ignored_without_group_checksums() {
    let mut fs = MemoryFilesystem::new(2, 8, BLOCK).with_group_checksums(false);
    fs.mark_used([0, 1, 2]);
    fs.set_group_flags(1, GroupFlags::BLOCK_UNINIT);

    assert_eq!(
        collect(&mut fs),
        vec![3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
    );
}

#[test]
fn test_capacity_clamps_the_walk() {
    let mut fs = MemoryFilesystem::new(2, 8, BLOCK).with_capacity(5);
    assert_eq!(collect(&mut fs), vec![1, 2, 3, 4]);
}

#[test]
fn test_block_zero_is_never_reported() {
    let mut fs = MemoryFilesystem::new(1, 4, BLOCK);
    assert_eq!(collect(&mut fs), vec![1, 2, 3]);
}

#[test]
fn test_first_block_of_later_groups_is_reported() {
    let mut fs = MemoryFilesystem::new(3, 4, BLOCK);
    fs.mark_used([1, 2, 3, 5, 6, 7]);
    assert_eq!(collect(&mut fs), vec![4, 8, 9, 10, 11]);
}

#[test]
fn test_fully_used_device() {
    let mut fs = MemoryFilesystem::new(2, 8, BLOCK);
    fs.mark_used(0..16);

    let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
    let mut buf = vec![0u8; BLOCK];
    assert!(matches!(
        iter.next_block(&mut buf),
        Err(EntropyError::OutOfRange)
    ));
    assert_eq!(iter.state(), IteratorState::Exhausted);
}

#[test]
fn test_exhaustion_is_permanent() {
    let mut fs = MemoryFilesystem::new(1, 4, BLOCK);
    let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
    let mut buf = vec![0u8; BLOCK];

    for expected in 1..4 {
        assert_eq!(iter.next_block(&mut buf).unwrap(), expected);
    }
    for _ in 0..3 {
        assert!(matches!(
            iter.next_block(&mut buf),
            Err(EntropyError::OutOfRange)
        ));
    }
}

#[test]
fn test_buffer_content_matches_block() {
    let mut fs = MemoryFilesystem::new(1, 8, BLOCK);
    fs.mark_used([1, 2]);
    fs.set_content(3, b"free block three");

    let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
    let mut buf = vec![0u8; BLOCK];
    assert_eq!(iter.next_block(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..16], b"free block three");
    assert_eq!(iter.next_block(&mut buf).unwrap(), 4);
    assert_eq!(buf[0], 4);
}

#[test]
fn test_wrong_buffer_size_changes_nothing() {
    let mut fs = MemoryFilesystem::new(1, 8, BLOCK);
    let mut iter = FreeBlockIterator::new(&mut fs).unwrap();

    let mut small = vec![0u8; BLOCK / 2];
    assert!(matches!(
        iter.next_block(&mut small),
        Err(EntropyError::InvalidArgument(_))
    ));
    assert_eq!(iter.state(), IteratorState::Scanning);

    let mut buf = vec![0u8; BLOCK];
    assert_eq!(iter.next_block(&mut buf).unwrap(), 1);
}

#[test]
fn test_read_failure_then_retry() {
    let mut fs = MemoryFilesystem::new(2, 4, BLOCK);
    fs.mark_used([1, 2]);
    fs.fail_reads(5);

    let mut buf = vec![0u8; BLOCK];
    {
        let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
        assert_eq!(iter.next_block(&mut buf).unwrap(), 3);
        assert_eq!(iter.next_block(&mut buf).unwrap(), 4);
        assert!(matches!(iter.next_block(&mut buf), Err(EntropyError::Io(_))));
        assert!(matches!(iter.next_block(&mut buf), Err(EntropyError::Io(_))));
        assert_eq!(iter.state(), IteratorState::Scanning);
    }

    // A fresh session after the device recovers sees every block once
    fs.heal(5);
    assert_eq!(collect(&mut fs), vec![3, 4, 5, 6, 7]);
}

#[test]
fn test_for_each_counts_and_stops_on_callback_error() {
    let mut fs = MemoryFilesystem::new(2, 4, BLOCK);
    let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
    let visited = iter.for_each_free_block(|_, _| Ok(())).unwrap();
    assert_eq!(visited, 7);

    let mut fs = MemoryFilesystem::new(2, 4, BLOCK);
    let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
    let mut seen = Vec::new();
    let result = iter.for_each_free_block(|block, _| {
        if block == 4 {
            return Err(EntropyError::InvalidArgument("stop".into()));
        }
        seen.push(block);
        Ok(())
    });
    assert!(matches!(result, Err(EntropyError::InvalidArgument(_))));
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn test_works_through_trait_object() {
    let mut fs = MemoryFilesystem::new(1, 4, BLOCK);
    fs.mark_used([2]);
    let adapter: &mut dyn FilesystemAdapter = &mut fs;

    let mut iter = FreeBlockIterator::new(adapter).unwrap();
    let mut blocks = Vec::new();
    iter.for_each_free_block(|block, _| {
        blocks.push(block);
        Ok(())
    })
    .unwrap();
    assert_eq!(blocks, vec![1, 3]);
}

fn layout() -> impl Strategy<Value = (u64, u64, Vec<u64>, Vec<bool>, u64)> {
    (1u64..6, 1u64..24).prop_flat_map(|(groups, per_group)| {
        let total = groups * per_group;
        (
            Just(groups),
            Just(per_group),
            prop::collection::vec(0..total, 0..total as usize),
            prop::collection::vec(any::<bool>(), groups as usize),
            0..=total + 4,
        )
    })
}

proptest! {
    #[test]
    fn prop_blocks_are_unique_ascending_and_free(
        (groups, per_group, used, uninit, capacity) in layout()
    ) {
        let mut fs = MemoryFilesystem::new(groups, per_group, BLOCK).with_capacity(capacity);
        fs.mark_used(used.iter().copied());
        for (group, &flag) in uninit.iter().enumerate() {
            if flag {
                fs.set_group_flags(group as u64, GroupFlags::BLOCK_UNINIT);
            }
        }

        let blocks = collect(&mut fs);
        let used: HashSet<u64> = used.into_iter().collect();

        prop_assert!(blocks.windows(2).all(|pair| pair[0] < pair[1]));
        for &block in &blocks {
            prop_assert!(block != 0);
            prop_assert!(block < capacity);
            prop_assert!(!used.contains(&block));
            prop_assert!(!uninit[(block / per_group) as usize]);
        }
    }

    #[test]
    fn prop_walk_finds_every_eligible_block(
        (groups, per_group, used, _uninit, capacity) in layout()
    ) {
        let mut fs = MemoryFilesystem::new(groups, per_group, BLOCK).with_capacity(capacity);
        fs.mark_used(used.iter().copied());

        let used: HashSet<u64> = used.into_iter().collect();
        let limit = capacity.min(groups * per_group);
        let expected: Vec<u64> = (1..limit).filter(|b| !used.contains(b)).collect();

        prop_assert_eq!(collect(&mut fs), expected);
    }
}
