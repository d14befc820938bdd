//! Memory-mapped interval stores for temporal annotation data.
//!
//! This library provides read-optimized, write-once stores mapping ids to
//! interval collections, designed for workloads where millions of half-open
//! time ranges are scanned, intersected, and aggregated with minimal
//! copying.
//!
//! # Features
//!
//! - **Zero-copy reads**: stores are memory-mapped and decoded in place;
//!   only a small per-id index lives on the heap
//! - **Two layouts**: [`IntervalSetMapping`] holds disjoint sorted interval
//!   sets, [`IntervalListMapping`] holds overlapping payload-tagged lists
//! - **Composable views**: payload projections, unions, subsets, and
//!   intersections all expose one [`IntervalSetView`] trait
//!
//! # Example
//!
//! ```rust,no_run
//! use intervalset::{Interval, IntervalSetMapping, IntervalSetWriter};
//!
//! let mut writer = IntervalSetWriter::create("annotations.bin").unwrap();
//! writer.write(7, &[Interval::new(0, 10), Interval::new(20, 30)]).unwrap();
//! writer.finish().unwrap();
//!
//! let map = IntervalSetMapping::open("annotations.bin").unwrap();
//! assert!(map.is_contained(7, 25, false).unwrap());
//! ```

pub mod error;
pub mod interval;
pub mod listmap;
mod mmap;
pub mod setmap;
pub mod views;
pub mod writer;

// Re-export commonly used types
pub use error::{Result, StoreError};
pub use interval::{deoverlap, Interval, PayloadEntry, PayloadFilter};
pub use listmap::IntervalListMapping;
pub use setmap::IntervalSetMapping;
pub use views::{
    IntersectionView, IntervalSetView, ListProjection, SubsetView, UnionProjection,
};
pub use writer::{IntervalListWriter, IntervalSetWriter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Result, StoreError};
    pub use crate::interval::{Interval, PayloadEntry, PayloadFilter};
    pub use crate::listmap::IntervalListMapping;
    pub use crate::setmap::IntervalSetMapping;
    pub use crate::views::{
        IntersectionView, IntervalSetView, ListProjection, SubsetView, UnionProjection,
    };
    pub use crate::writer::{IntervalListWriter, IntervalSetWriter};
}
