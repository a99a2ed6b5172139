//! # Warden ID Generator
//!
//! Collision-free ID allocation shared by many concurrent producers.
//!
//! Each [`SegmentAllocator`] checks out a segment of `interval` values from
//! a persistent counter node under the counter's distributed mutex and
//! issues them locally. Segments of different allocators never overlap, so
//! IDs are unique across processes. Values are rendered in base 62 by
//! [`SymbolCodec`], left-padded to a fixed width by default.
//!
//! ## Modules
//!
//! - [`allocator`]: checkout protocol and local issuing
//! - [`segment`]: segment bounds arithmetic
//! - [`symbols`]: base-62 alphabet and codec
//! - [`config`]: [`IdGeneratorConfig`] and [`CheckoutTimeoutPolicy`]

pub mod allocator;
pub mod config;
pub mod errors;
pub mod segment;
pub mod symbols;

pub use allocator::{AllocatorStats, SegmentAllocator};
pub use config::{CheckoutTimeoutPolicy, IdGeneratorConfig};
pub use errors::{IdGenError, IdGenResult};
pub use segment::Segment;
pub use symbols::{SymbolCodec, DEFAULT_ID_LENGTH, RADIX, SYMBOLS};
