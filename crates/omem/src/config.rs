//! Configuration Module - Heap Tuning Parameters
//!
//! Manages all configuration parameters for one object memory instance.
//! Segment size and the large-object threshold decide how objects are laid
//! out; the heap limit and free ratio decide when the heap grows.

use crate::object::header::MIN_OBJECT_SIZE;

/// Default name of the saved-image file inside an image directory
pub const DEFAULT_IMAGE_FILE_NAME: &str = "omem.img";

/// Main configuration for an object memory instance
///
/// # Examples
///
/// ```rust
/// use omem::MemoryConfig;
///
/// // Small heap for an embedded interpreter
/// let config = MemoryConfig {
///     segment_size: 64 * 1024,
///     max_heap_size: 4 * 1024 * 1024,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Size in bytes of a normal segment
    ///
    /// Objects up to `large_object_threshold` are carved out of segments of
    /// this size.
    /// Default: 256KB
    pub segment_size: usize,

    /// Threshold for large objects (bytes, header included)
    ///
    /// Objects above this size get a dedicated large segment which is
    /// released as soon as the object dies.
    /// Default: 32KB
    pub large_object_threshold: usize,

    /// Maximum heap size in bytes
    ///
    /// Hard limit for the sum of all segment sizes. Allocation that would
    /// exceed it after a collection fails with `OutOfMemory`.
    /// Default: 256MB
    pub max_heap_size: usize,

    /// Number of normal segments created at startup
    ///
    /// The first of them is the startup segment and is never released.
    /// Default: 1
    pub initial_segments: usize,

    /// Minimum free fraction of normal segments after a collection
    ///
    /// When a collection leaves less than this fraction free, a new segment
    /// is added before the allocation is retried.
    /// Default: 0.25
    pub expansion_free_ratio: f64,

    /// Initial bucket capacity of a new MapTable (power of two)
    ///
    /// Default: 8
    pub map_table_capacity: usize,

    /// Route memory events to the process-wide logger
    ///
    /// Default: false
    pub verbose: bool,

    /// File name used by `save_image` / `restore_image`
    ///
    /// Default: "omem.img"
    pub image_file_name: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            // Segments
            segment_size: 256 * KB,
            large_object_threshold: 32 * KB,
            max_heap_size: 256 * MB,
            initial_segments: 1,

            // Growth
            expansion_free_ratio: 0.25,
            map_table_capacity: 8,

            // Debug
            verbose: false,
            image_file_name: DEFAULT_IMAGE_FILE_NAME.to_string(),
        }
    }
}

impl MemoryConfig {
    /// Validate configuration
    ///
    /// Checks if all values are in valid ranges.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use omem::MemoryConfig;
    ///
    /// let config = MemoryConfig {
    ///     max_heap_size: 0,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Segment validation
        if self.segment_size < MIN_SEGMENT_SIZE {
            return Err(ConfigError::InvalidSegmentSize(format!(
                "segment_size must be at least {} bytes",
                MIN_SEGMENT_SIZE
            )));
        }

        if self.segment_size % crate::object::header::OBJECT_GRAIN != 0 {
            return Err(ConfigError::InvalidSegmentSize(
                "segment_size must be a multiple of the object grain".to_string(),
            ));
        }

        if self.initial_segments == 0 {
            return Err(ConfigError::InvalidSegmentSize(
                "initial_segments must be > 0".to_string(),
            ));
        }

        // Threshold validation
        if self.large_object_threshold < MIN_OBJECT_SIZE
            || self.large_object_threshold > self.segment_size
        {
            return Err(ConfigError::InvalidThreshold(
                "large_object_threshold must be between the minimum object size and segment_size"
                    .to_string(),
            ));
        }

        // Heap size validation
        if self.max_heap_size == 0 {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_size must be > 0".to_string(),
            ));
        }

        if self.segment_size.saturating_mul(self.initial_segments) > self.max_heap_size {
            return Err(ConfigError::InvalidHeapSize(
                "initial segments cannot exceed max_heap_size".to_string(),
            ));
        }

        // Growth validation
        if !(0.0..=0.9).contains(&self.expansion_free_ratio) {
            return Err(ConfigError::InvalidFreeRatio(
                "expansion_free_ratio must be between 0.0 and 0.9".to_string(),
            ));
        }

        if self.map_table_capacity < 2 || !self.map_table_capacity.is_power_of_two() {
            return Err(ConfigError::InvalidTableCapacity(
                "map_table_capacity must be a power of two >= 2".to_string(),
            ));
        }

        if self.image_file_name.is_empty() {
            return Err(ConfigError::InvalidImageFileName(
                "image_file_name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - OMEM_SEGMENT_SIZE
    /// - OMEM_MAX_HEAP
    /// - OMEM_LARGE_THRESHOLD
    /// - OMEM_VERBOSE
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = env_usize("OMEM_SEGMENT_SIZE") {
            config.segment_size = size;
        }

        if let Some(size) = env_usize("OMEM_MAX_HEAP") {
            config.max_heap_size = size;
        }

        if let Some(size) = env_usize("OMEM_LARGE_THRESHOLD") {
            config.large_object_threshold = size;
        }

        if let Ok(val) = std::env::var("OMEM_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Number of normal segments the heap limit allows
    pub fn max_segments(&self) -> usize {
        self.max_heap_size / self.segment_size
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid heap size: {0}")]
    InvalidHeapSize(String),

    #[error("Invalid segment size: {0}")]
    InvalidSegmentSize(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid free ratio: {0}")]
    InvalidFreeRatio(String),

    #[error("Invalid table capacity: {0}")]
    InvalidTableCapacity(String),

    #[error("Invalid image file name: {0}")]
    InvalidImageFileName(String),
}

// ============================================================================
// CONSTANTS & HELPERS
// ============================================================================

pub(crate) const KB: usize = 1024;
pub(crate) const MB: usize = 1024 * 1024;

/// Smallest accepted segment size
pub const MIN_SEGMENT_SIZE: usize = KB;

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.trim().parse::<usize>().ok()
}
