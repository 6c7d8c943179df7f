//! Buffer pool configuration.

use strata_common::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_POOL_SIZE, DEFAULT_REPLACER_K, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of page frames in the pool.
    pub pool_size: usize,
    /// Page size in bytes.
    pub page_size: usize,
    /// K for the LRU-K replacement policy.
    pub replacer_k: usize,
}

impl BufferPoolConfig {
    /// Creates a configuration with the specified number of frames.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            page_size: DEFAULT_PAGE_SIZE,
            replacer_k: DEFAULT_REPLACER_K,
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets K for the replacement policy.
    pub fn with_replacer_k(mut self, replacer_k: usize) -> Self {
        self.replacer_k = replacer_k;
        self
    }

    /// Returns the total memory used by the frame array.
    pub fn memory_usage(&self) -> usize {
        self.pool_size * self.page_size
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.pool_size == 0 {
            return Err("pool_size must be > 0");
        }
        if !self.page_size.is_power_of_two() {
            return Err("page_size must be a power of 2");
        }
        if self.page_size < MIN_PAGE_SIZE || self.page_size > MAX_PAGE_SIZE {
            return Err("page_size out of supported range");
        }
        if self.replacer_k == 0 {
            return Err("replacer_k must be >= 1");
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
