//! Batch metric computation over a single scan
//!
//! A [`BatchRequest`] is built once per scan and reused for every window.
//! Each entry is computed independently: an unknown selector or a degenerate
//! window fails only its own record.

use crate::algorithm::{Algorithm, AlgorithmResult};
use crate::error::{EntropyError, Result};
use crate::frequency::FrequencyContext;

/// Upper bound on entries in one request
pub const MAX_BATCH_ENTRIES: usize = 255;

/// Ordered list of selector codes to compute per window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    selectors: Vec<u32>,
}

/// Result of one batch entry
#[derive(Debug)]
pub struct BatchRecord<'a> {
    pub selector: u32,
    pub result: Result<AlgorithmResult<'a>>,
}

/// A successfully computed metric paired with its algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement<'a> {
    pub algorithm: Algorithm,
    pub value: AlgorithmResult<'a>,
}

impl<'a> BatchRecord<'a> {
    /// The resolved algorithm, if the selector was valid
    pub fn algorithm(&self) -> Option<Algorithm> {
        Algorithm::from_code(self.selector).ok()
    }

    /// Unwrap the record, surfacing its error if it failed
    pub fn into_measurement(self) -> Result<Measurement<'a>> {
        let value = self.result?;
        let algorithm = Algorithm::from_code(self.selector)?;
        Ok(Measurement { algorithm, value })
    }
}

impl BatchRequest {
    /// Build a request from known algorithms
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty list or more than 255 entries,
    /// `OutOfMemory` if the entry storage cannot be allocated.
    pub fn new(algorithms: &[Algorithm]) -> Result<Self> {
        let codes: Vec<u32> = algorithms.iter().map(|a| a.code()).collect();
        Self::from_codes(&codes)
    }

    /// Build a request from raw selector codes
    ///
    /// Unknown codes are accepted here and fail at calculation time with
    /// `UnknownAlgorithm`, without affecting sibling entries.
    pub fn from_codes(codes: &[u32]) -> Result<Self> {
        if codes.is_empty() {
            return Err(EntropyError::invalid("batch request needs at least one entry"));
        }
        if codes.len() > MAX_BATCH_ENTRIES {
            return Err(EntropyError::invalid(format!(
                "batch request has {} entries (max {})",
                codes.len(),
                MAX_BATCH_ENTRIES
            )));
        }

        let mut selectors = Vec::new();
        selectors
            .try_reserve_exact(codes.len())
            .map_err(|_| EntropyError::OutOfMemory(codes.len()))?;
        selectors.extend_from_slice(codes);

        Ok(BatchRequest { selectors })
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn selectors(&self) -> &[u32] {
        &self.selectors
    }

    /// Position of the first entry computing `algorithm`
    pub fn position(&self, algorithm: Algorithm) -> Option<usize> {
        self.selectors.iter().position(|&code| code == algorithm.code())
    }
}

impl FrequencyContext {
    /// Compute every entry of `request` against this context
    ///
    /// Records come back in request order. No entry short-circuits another.
    pub fn batch_calculate(&self, request: &BatchRequest) -> Vec<BatchRecord<'_>> {
        request
            .selectors
            .iter()
            .map(|&selector| BatchRecord {
                selector,
                result: self.calculate_code(selector),
            })
            .collect()
    }
}
