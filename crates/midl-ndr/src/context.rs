//! NDR encoding/decoding context
//!
//! The context carries the data representation (byte order) negotiated by the
//! transport together with the resource limits applied to untrusted input.

/// Default ceiling on a single allocation driven by a wire length (16 MiB)
pub const DEFAULT_MAX_ALLOCATION: usize = 16 * 1024 * 1024;

/// Default ceiling on the element count of a single array
pub const DEFAULT_MAX_ELEMENTS: usize = 1024 * 1024;

/// Default ceiling on value nesting (variant in variant, array of variants, ...)
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Resource limits applied while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdrLimits {
    /// Largest byte allocation a single wire length may request
    pub max_allocation: usize,
    /// Largest element count a single conformance word may announce
    pub max_elements: usize,
    /// Deepest nesting of self-referential values
    pub max_depth: usize,
}

impl Default for NdrLimits {
    fn default() -> Self {
        Self {
            max_allocation: DEFAULT_MAX_ALLOCATION,
            max_elements: DEFAULT_MAX_ELEMENTS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// NDR encoding/decoding context
///
/// Tracks the byte order and limits. Cheap to copy; every writer and reader
/// holds its own copy.
#[derive(Debug, Clone, Copy)]
pub struct NdrContext {
    /// Whether to use little-endian byte order
    pub little_endian: bool,
    /// Decode limits
    pub limits: NdrLimits,
}

impl NdrContext {
    /// Create a new NDR context with little-endian byte order (default)
    pub fn new() -> Self {
        Self {
            little_endian: true,
            limits: NdrLimits::default(),
        }
    }

    /// Create a context with big-endian byte order
    pub fn big_endian() -> Self {
        Self {
            little_endian: false,
            ..Self::new()
        }
    }

    /// Create a context with specified byte order
    pub fn with_byte_order(little_endian: bool) -> Self {
        Self {
            little_endian,
            ..Self::new()
        }
    }

    /// Replace the decode limits
    pub fn with_limits(mut self, limits: NdrLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the maximum nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.limits.max_depth = max_depth;
        self
    }

    /// Set the maximum single allocation
    pub fn with_max_allocation(mut self, max_allocation: usize) -> Self {
        self.limits.max_allocation = max_allocation;
        self
    }

    /// Calculate padding needed to align to the given boundary
    #[inline]
    pub fn align_padding(position: usize, alignment: usize) -> usize {
        if alignment <= 1 {
            return 0;
        }
        debug_assert!(alignment.is_power_of_two());
        let remainder = position & (alignment - 1);
        if remainder == 0 {
            0
        } else {
            alignment - remainder
        }
    }
}

impl Default for NdrContext {
    fn default() -> Self {
        Self::new()
    }
}
