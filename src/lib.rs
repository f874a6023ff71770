//! # entropy-rs - Randomness Metrics for Files and Free Filesystem Blocks
//!
//! `entropy-rs` measures how random a byte stream looks, to flag hidden,
//! encrypted or otherwise anomalous data:
//!
//! - **Shannon entropy** in bits per byte (`0.0..=8.0`)
//! - **Chi-square** goodness-of-fit against a uniform byte distribution
//! - **Byte frequency distribution**, optionally binned
//!
//! Bytes come either from plain files and pipes, or from the *unallocated*
//! blocks of an ext2/3/4 filesystem walked by [`FreeBlockIterator`].
//!
//! ## Quick Start
//!
//! ```rust
//! use entropy_rs::{Algorithm, FrequencyContext, Result};
//!
//! # fn main() -> Result<()> {
//! let mut ctx = FrequencyContext::new();
//! ctx.update(b"hello ");
//! ctx.update(b"world");
//!
//! let entropy = ctx.calculate(Algorithm::Shannon)?.as_scalar().unwrap_or(0.0);
//! assert!(entropy > 2.0 && entropy < 4.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Several Metrics, One Pass
//!
//! ```rust
//! use entropy_rs::{Algorithm, BatchRequest, FrequencyContext, Result};
//!
//! # fn main() -> Result<()> {
//! let request = BatchRequest::new(&[Algorithm::Shannon, Algorithm::ChiSquare])?;
//!
//! let mut ctx = FrequencyContext::new();
//! ctx.update(&(0..=255u8).collect::<Vec<_>>());
//!
//! for record in ctx.batch_calculate(&request) {
//!     let measurement = record.into_measurement()?;
//!     println!("{} = {:?}", measurement.algorithm, measurement.value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Free Block Scan
//!
//! ```rust,no_run
//! use entropy_rs::{Algorithm, Ext4Image, FreeBlockIterator, FrequencyContext, Result};
//!
//! # fn main() -> Result<()> {
//! let mut fs = Ext4Image::open("/dev/sdb1")?;
//! let mut iter = FreeBlockIterator::new(&mut fs)?;
//! let mut ctx = FrequencyContext::new();
//!
//! iter.for_each_free_block(|block, data| {
//!     ctx.reset();
//!     ctx.update(data);
//!     let entropy = ctx.calculate(Algorithm::Shannon)?;
//!     println!("{}, {:?}", block, entropy);
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod report;
pub mod scan;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    adapter, algorithm, batch, engine, error, ext4, frequency, iterator, memory,
};

pub use crate::config::{parse_number, ScanOptions, ScanOptionsBuilder};
pub use crate::core::{
    adapter::{FilesystemAdapter, GroupFlags},
    algorithm::{Algorithm, AlgorithmResult, BinSize, SYMBOLS},
    batch::{BatchRecord, BatchRequest, Measurement, MAX_BATCH_ENTRIES},
    engine::{chi_square, shannon_entropy},
    error::{EntropyError, Result},
    ext4::Ext4Image,
    frequency::FrequencyContext,
    iterator::{FreeBlockIterator, IteratorState},
    memory::MemoryFilesystem,
};
pub use crate::report::{OutputFormat, ReportWriter};
pub use crate::scan::{FileScanner, MetricPlan, ScanSummary};
