//! Running byte-frequency table

use crate::algorithm::SYMBOLS;

/// Per-byte occurrence counts for one measurement window
///
/// Invariant: the sum of `table` always equals `symbol_count`. Counts are
/// `u64`, so multi-terabyte windows cannot overflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyContext {
    table: [u64; SYMBOLS],
    symbol_count: u64,
}

impl FrequencyContext {
    /// Create a zeroed context
    pub fn new() -> Self {
        FrequencyContext {
            table: [0u64; SYMBOLS],
            symbol_count: 0,
        }
    }

    /// Zero the table for the next measurement window
    pub fn reset(&mut self) {
        self.table = [0u64; SYMBOLS];
        self.symbol_count = 0;
    }

    /// Frequency table indexed by byte value
    pub fn table(&self) -> &[u64; SYMBOLS] {
        &self.table
    }

    /// Total number of bytes accounted for
    pub fn symbol_count(&self) -> u64 {
        self.symbol_count
    }

    pub fn is_empty(&self) -> bool {
        self.symbol_count == 0
    }

    pub(crate) fn table_mut(&mut self) -> &mut [u64; SYMBOLS] {
        &mut self.table
    }

    pub(crate) fn add_symbols(&mut self, count: u64) {
        self.symbol_count += count;
    }
}

impl Default for FrequencyContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_zeroed() {
        let ctx = FrequencyContext::new();
        assert!(ctx.is_empty());
        assert!(ctx.table().iter().all(|&c| c == 0));
    }

    #[test]
    fn test_reset_clears_counts() {
        let mut ctx = FrequencyContext::new();
        ctx.update(b"abcabc");
        assert_eq!(ctx.symbol_count(), 6);

        ctx.reset();
        assert_eq!(ctx, FrequencyContext::default());
    }
}
