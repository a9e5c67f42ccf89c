//! Manager configuration.

use std::time::Duration;

/// Configuration for a [`crate::Manager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// `COUNT` hint for each cursor-scan step.
    pub scan_batch_size: usize,

    /// Default batch size for streaming and bulk helpers.
    pub stream_batch_size: usize,

    /// Lifetime of temporary intersection keys.
    pub intersection_ttl: Duration,

    /// Collection scans yielding more keys than this log a warning.
    pub scan_warning_threshold: usize,

    /// Whether commit stamps documents that expose timestamps.
    pub generate_timestamps: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: 100,
            stream_batch_size: 100,
            intersection_ttl: Duration::from_secs(30),
            scan_warning_threshold: 10_000,
            generate_timestamps: true,
        }
    }
}

impl ManagerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cursor-scan step size.
    #[must_use]
    pub const fn scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    /// Sets the default stream batch size.
    #[must_use]
    pub const fn stream_batch_size(mut self, size: usize) -> Self {
        self.stream_batch_size = size;
        self
    }

    /// Sets the temporary intersection key lifetime.
    #[must_use]
    pub const fn intersection_ttl(mut self, ttl: Duration) -> Self {
        self.intersection_ttl = ttl;
        self
    }

    /// Sets the scan warning threshold.
    #[must_use]
    pub const fn scan_warning_threshold(mut self, threshold: usize) -> Self {
        self.scan_warning_threshold = threshold;
        self
    }

    /// Sets whether commit stamps timestamps.
    #[must_use]
    pub const fn generate_timestamps(mut self, value: bool) -> Self {
        self.generate_timestamps = value;
        self
    }

    /// Intersection TTL in whole seconds, never zero.
    pub(crate) fn intersection_ttl_secs(&self) -> u64 {
        self.intersection_ttl.as_secs().max(1)
    }
}
