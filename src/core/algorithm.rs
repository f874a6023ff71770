//! Algorithm selectors, their results, and the byte-frequency binning transform
//!
//! Every metric is computed from a [`FrequencyContext`](crate::frequency::FrequencyContext)
//! table. Scalar metrics yield an `f64`; the byte frequency distribution
//! hands back the context's own table without copying it.

use crate::error::{EntropyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of distinct byte values
pub const SYMBOLS: usize = 256;

/// Largest bin accepted for byte frequency distribution output
pub const MAX_BIN_SIZE: u8 = 128;

/// Statistical metric selector
///
/// The numeric codes are stable and used by [`Algorithm::from_code`] for
/// callers that carry selectors as plain integers.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Shannon entropy in bits per byte, `[0, 8]`
    #[serde(rename = "entropy")]
    Shannon = 0,
    /// Chi-square statistic against a uniform byte distribution
    #[serde(rename = "chisq")]
    ChiSquare = 1,
    /// Raw 256-entry histogram
    #[serde(rename = "bfd")]
    ByteFrequencyDistribution = 2,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::Shannon,
        Algorithm::ChiSquare,
        Algorithm::ByteFrequencyDistribution,
    ];

    /// Resolve a numeric selector
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlgorithm` for any code outside the known set.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Algorithm::Shannon),
            1 => Ok(Algorithm::ChiSquare),
            2 => Ok(Algorithm::ByteFrequencyDistribution),
            other => Err(EntropyError::UnknownAlgorithm(format!("selector {}", other))),
        }
    }

    /// Numeric selector code
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Name used on the command line and in configuration files
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Shannon => "entropy",
            Algorithm::ChiSquare => "chisq",
            Algorithm::ByteFrequencyDistribution => "bfd",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = EntropyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "entropy" | "shannon" => Ok(Algorithm::Shannon),
            "chisq" | "chi-square" | "chisquare" => Ok(Algorithm::ChiSquare),
            "bfd" => Ok(Algorithm::ByteFrequencyDistribution),
            _ => Err(EntropyError::UnknownAlgorithm(format!(
                "'{}' (valid options: entropy, chisq, bfd)",
                s
            ))),
        }
    }
}

/// Outcome of one metric computation
///
/// `Distribution` borrows the frequency table of the context it was
/// computed from. The borrow checker ties it to that context, so the next
/// `update` cannot run while the result is alive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlgorithmResult<'a> {
    Scalar(f64),
    Distribution(&'a [u64; SYMBOLS]),
}

impl<'a> AlgorithmResult<'a> {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            AlgorithmResult::Scalar(value) => Some(*value),
            AlgorithmResult::Distribution(_) => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&'a [u64; SYMBOLS]> {
        match self {
            AlgorithmResult::Scalar(_) => None,
            AlgorithmResult::Distribution(table) => Some(table),
        }
    }
}

/// Bin width for byte frequency distribution output
///
/// Adjacent byte values are summed in groups of this many. Valid widths
/// are powers of two in `[1, 128]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct BinSize(u8);

impl BinSize {
    /// Validate a bin width
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` unless `size` is a power of two no larger
    /// than 128.
    pub fn new(size: u16) -> Result<Self> {
        if size == 0 || size > MAX_BIN_SIZE as u16 || !size.is_power_of_two() {
            return Err(EntropyError::invalid(format!(
                "bin size {} must be a power of two between 1 and {}",
                size, MAX_BIN_SIZE
            )));
        }
        Ok(BinSize(size as u8))
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// Number of bins produced by [`BinSize::bin`]
    pub fn bin_count(self) -> usize {
        SYMBOLS / self.get()
    }

    /// Sum adjacent counts into `256 / size` bins
    pub fn bin(self, table: &[u64; SYMBOLS]) -> Vec<u64> {
        table
            .chunks_exact(self.get())
            .map(|chunk| chunk.iter().sum())
            .collect()
    }
}

impl Default for BinSize {
    fn default() -> Self {
        BinSize(1)
    }
}

impl TryFrom<u16> for BinSize {
    type Error = EntropyError;

    fn try_from(size: u16) -> Result<Self> {
        BinSize::new(size)
    }
}

impl From<BinSize> for u16 {
    fn from(size: BinSize) -> u16 {
        size.0 as u16
    }
}

impl FromStr for BinSize {
    type Err = EntropyError;

    fn from_str(s: &str) -> Result<Self> {
        let size: u16 = s
            .trim()
            .parse()
            .map_err(|_| EntropyError::invalid(format!("invalid bin size '{}'", s)))?;
        BinSize::new(size)
    }
}
