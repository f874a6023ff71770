//! Statistical engine: accumulation and metric computation
//!
//! `update` is the only O(n) step; every metric afterwards is O(256) over
//! the table, so any number of metrics can be computed for one scan.

use crate::algorithm::{Algorithm, AlgorithmResult, SYMBOLS};
use crate::error::{EntropyError, Result};
use crate::frequency::FrequencyContext;

impl FrequencyContext {
    /// Count every byte of `buf`
    ///
    /// Chunk boundaries do not matter: feeding a stream in any split yields
    /// the same table. An empty buffer is a no-op.
    pub fn update(&mut self, buf: &[u8]) {
        if buf.is_empty() {
            return;
        }

        let table = self.table_mut();
        for &byte in buf {
            table[byte as usize] += 1;
        }
        self.add_symbols(buf.len() as u64);
    }

    /// Compute one metric over the current table
    ///
    /// # Errors
    ///
    /// Returns `FloatingPoint` when the window is empty or the arithmetic
    /// produces a non-finite value.
    pub fn calculate(&self, algorithm: Algorithm) -> Result<AlgorithmResult<'_>> {
        match algorithm {
            Algorithm::Shannon => shannon_entropy(self.table(), self.symbol_count())
                .map(AlgorithmResult::Scalar),
            Algorithm::ChiSquare => {
                chi_square(self.table(), self.symbol_count()).map(AlgorithmResult::Scalar)
            }
            Algorithm::ByteFrequencyDistribution => {
                Ok(AlgorithmResult::Distribution(self.table()))
            }
        }
    }

    /// Compute a metric from a raw selector code
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlgorithm` for codes outside the known set, otherwise
    /// as [`FrequencyContext::calculate`].
    pub fn calculate_code(&self, code: u32) -> Result<AlgorithmResult<'_>> {
        self.calculate(Algorithm::from_code(code)?)
    }
}

/// Shannon entropy, `-Σ p·log2(p)` over the non-zero counts
pub fn shannon_entropy(table: &[u64; SYMBOLS], symbol_count: u64) -> Result<f64> {
    let fp_error = EntropyError::FloatingPoint {
        algorithm: Algorithm::Shannon,
    };
    if symbol_count == 0 {
        return Err(fp_error);
    }

    let total = symbol_count as f64;
    let entropy = table
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum::<f64>();

    if entropy.is_finite() {
        // -0.0 for a single repeated symbol
        Ok(entropy.abs())
    } else {
        Err(fp_error)
    }
}

/// Chi-square statistic against a uniform distribution over 256 symbols
///
/// With `expected = N / 256` for every symbol,
/// `Σ (o - e)² / e` reduces to `Σ o² / e - N`.
pub fn chi_square(table: &[u64; SYMBOLS], symbol_count: u64) -> Result<f64> {
    let total = symbol_count as f64;
    let expected = total / SYMBOLS as f64;

    let sum_of_squares: f64 = table
        .iter()
        .map(|&count| {
            let observed = count as f64;
            observed * observed
        })
        .sum();
    let statistic = sum_of_squares / expected - total;

    if statistic.is_finite() {
        Ok(statistic)
    } else {
        Err(EntropyError::FloatingPoint {
            algorithm: Algorithm::ChiSquare,
        })
    }
}
