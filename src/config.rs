//! Builder-validated allocator configuration.

use crate::error::{Result, Status};
use crate::pool::ALLOCATOR_MAX_FREE_UNLIMITED;
use crate::utils::validate_alignment;

/// Configuration for an [`Allocator`](crate::Allocator).
///
/// # Examples
///
/// ```rust
/// use poolcore::AllocatorConfig;
///
/// let config = AllocatorConfig::builder()
///     .max_free(16 * 1024 * 1024)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    max_free: usize,
    mmap_reservation: bool,
    alignment: usize,
}

impl AllocatorConfig {
    /// Starts building a configuration.
    pub fn builder() -> AllocatorConfigBuilder {
        AllocatorConfigBuilder::new()
    }

    /// Retention bound for freed slabs in bytes; `0` means unlimited.
    #[inline]
    pub fn max_free(&self) -> usize {
        self.max_free
    }

    /// Whether slab storage comes from one anonymous address-space
    /// reservation instead of the heap.
    #[inline]
    pub fn mmap_reservation(&self) -> bool {
        self.mmap_reservation
    }

    /// Default alignment pools created over this allocator hand out.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfigBuilder::new().build()
    }
}

/// Builder for [`AllocatorConfig`] with validation.
pub struct AllocatorConfigBuilder {
    max_free: usize,
    mmap_reservation: bool,
    alignment: usize,
}

impl AllocatorConfigBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        AllocatorConfigBuilder {
            max_free: ALLOCATOR_MAX_FREE_UNLIMITED,
            mmap_reservation: false,
            alignment: crate::pool::DEFAULT_ALIGNMENT,
        }
    }

    /// Bounds the bytes retained on the free-slab lists (`0` = unlimited).
    pub fn max_free(mut self, bytes: usize) -> Self {
        self.max_free = bytes;
        self
    }

    /// Backs slab storage with a single 64 GiB address-space reservation.
    pub fn mmap_reservation(mut self, enabled: bool) -> Self {
        self.mmap_reservation = enabled;
        self
    }

    /// Sets the default allocation alignment. Must be a power of two.
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Builds the configuration without validation, using the default
    /// alignment.
    pub fn build(self) -> AllocatorConfig {
        AllocatorConfig {
            max_free: self.max_free,
            mmap_reservation: self.mmap_reservation,
            alignment: crate::pool::DEFAULT_ALIGNMENT.max(self.alignment.next_power_of_two()),
        }
    }

    /// Builds the configuration, validating all parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the alignment is not a power of two.
    pub fn try_build(self) -> Result<AllocatorConfig> {
        validate_alignment(self.alignment)?;
        if self.alignment > crate::pool::BOUNDARY_SIZE {
            return Err(Status::invalid_arg(
                "alignment may not exceed the slab boundary size",
            ));
        }
        Ok(AllocatorConfig {
            max_free: self.max_free,
            mmap_reservation: self.mmap_reservation,
            alignment: self.alignment.max(crate::pool::DEFAULT_ALIGNMENT),
        })
    }
}

impl Default for AllocatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
