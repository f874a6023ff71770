#![no_main]
use entropy_rs::{Ext4Image, FilesystemAdapter, FreeBlockIterator};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

// Malformed metadata must be rejected with an error, never a panic
fuzz_target!(|data: &[u8]| {
    let mut fs = match Ext4Image::from_reader(Cursor::new(data.to_vec())) {
        Ok(fs) => fs,
        Err(_) => return,
    };

    // Keep huge declared geometries from turning into long walks
    if fs.group_count() > 64 || fs.clusters_per_group() > 65_536 {
        return;
    }

    let mut iter = match FreeBlockIterator::new(&mut fs) {
        Ok(iter) => iter,
        Err(_) => return,
    };
    let max_blocks = iter.max_blocks();
    let mut last = None;
    let _ = iter.for_each_free_block(|block, data| {
        assert!(block < max_blocks);
        assert!(last.map_or(true, |prev| prev < block));
        assert!(!data.is_empty());
        last = Some(block);
        Ok(())
    });
});
