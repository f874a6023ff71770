//! Scan configuration
//!
//! Options come from the builder, from a TOML file, or both (file first,
//! command line on top). Every path ends in [`ScanOptions::validate`].
//!
//! ```toml
//! block_size = 4096
//! metrics = ["entropy", "chisq"]
//! min_entropy = 7.5
//! format = "csv"
//! ```

use crate::algorithm::{Algorithm, BinSize};
use crate::batch::MAX_BATCH_ENTRIES;
use crate::error::{EntropyError, Result};
use crate::report::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything that shapes one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanOptions {
    /// Report one unit per block of this many bytes; whole stream when unset
    pub block_size: Option<u64>,

    /// Stop after this many bytes
    pub size_limit: Option<u64>,

    /// Bytes to skip before measuring
    pub skip_offset: u64,

    /// Metrics to report, in output order
    pub metrics: Vec<Algorithm>,

    /// Bin width for byte frequency distribution output
    pub bin_size: BinSize,

    /// Suppress units whose Shannon entropy is below this value
    pub min_entropy: Option<f64>,

    /// Suppress units whose chi-square statistic exceeds this value
    pub max_chi_square: Option<f64>,

    pub format: OutputFormat,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            block_size: None,
            size_limit: None,
            skip_offset: 0,
            metrics: vec![Algorithm::Shannon],
            bin_size: BinSize::default(),
            min_entropy: None,
            max_chi_square: None,
            format: OutputFormat::Csv,
        }
    }
}

impl ScanOptions {
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::new()
    }

    /// Parse options from TOML text
    ///
    /// # Errors
    ///
    /// `Config` for malformed TOML or unknown keys, `InvalidArgument` for
    /// values that parse but fail validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: ScanOptions =
            toml::from_str(text).map_err(|e| EntropyError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check every option for consistency
    pub fn validate(&self) -> Result<()> {
        if self.block_size == Some(0) {
            return Err(EntropyError::invalid("block size must be greater than zero"));
        }
        if self.size_limit == Some(0) {
            return Err(EntropyError::invalid("size limit must be greater than zero"));
        }
        if self.metrics.is_empty() {
            return Err(EntropyError::invalid("at least one metric is required"));
        }

        let filter_slots =
            self.min_entropy.is_some() as usize + self.max_chi_square.is_some() as usize;
        if self.metrics.len() + filter_slots > MAX_BATCH_ENTRIES {
            return Err(EntropyError::invalid(format!(
                "too many metrics requested (max {})",
                MAX_BATCH_ENTRIES
            )));
        }

        for (name, threshold) in [
            ("minimum entropy", self.min_entropy),
            ("maximum chi-square", self.max_chi_square),
        ] {
            if let Some(value) = threshold {
                if !value.is_finite() {
                    return Err(EntropyError::invalid(format!(
                        "{} must be a finite number, got {}",
                        name, value
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`ScanOptions`]
#[derive(Debug, Clone, Default)]
pub struct ScanOptionsBuilder {
    options: ScanOptions,
}

impl ScanOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing options, e.g. loaded from a file
    pub fn from_options(options: ScanOptions) -> Self {
        ScanOptionsBuilder { options }
    }

    pub fn block_size(mut self, size: u64) -> Self {
        self.options.block_size = Some(size);
        self
    }

    pub fn size_limit(mut self, limit: u64) -> Self {
        self.options.size_limit = Some(limit);
        self
    }

    pub fn skip_offset(mut self, offset: u64) -> Self {
        self.options.skip_offset = offset;
        self
    }

    /// Replace the metric list
    pub fn metrics(mut self, metrics: impl IntoIterator<Item = Algorithm>) -> Self {
        self.options.metrics = metrics.into_iter().collect();
        self
    }

    pub fn bin_size(mut self, size: BinSize) -> Self {
        self.options.bin_size = size;
        self
    }

    pub fn min_entropy(mut self, threshold: f64) -> Self {
        self.options.min_entropy = Some(threshold);
        self
    }

    pub fn max_chi_square(mut self, threshold: f64) -> Self {
        self.options.max_chi_square = Some(threshold);
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.options.format = format;
        self
    }

    /// Validate and return the options
    pub fn build(self) -> Result<ScanOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Parse a size or offset given as decimal or `0x`-prefixed hex
pub fn parse_number(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|e| EntropyError::invalid(format!("invalid number '{}': {}", text, e)))
}
