//! # mapsched - Map-Schedule Enumeration for Dataflow Fragments
//!
//! Explores the legal rewrites of a perfectly nested map fragment:
//! - Map-nest extraction from the dataflow graph
//! - A catalog of rewrites (permutation, tiling, fission/fusion, local
//!   storage, scheduling, vectorization), each with its legality check
//! - Deterministic, resumable enumeration of rewrite combinations
//!
//! ## Architecture
//!
//! ```text
//! Fragment → Extract Nest → Permute → Tile + Expand → Stage + Collapse → Schedule → Vectorize → Validate
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use mapsched::prelude::*;
//!
//! let fragment = Kernel::Matmul.build(64)?;
//! for candidate in map_schedule_enumerator(fragment, None)?.take(5) {
//!     println!("{}  {}", candidate.coordinate, candidate.description);
//! }
//! ```

#![warn(clippy::all)]

pub mod ir;
pub mod analysis;
pub mod transform;
pub mod autotuning;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::ir::{
        Affine, DataDescriptor, Fragment, Kernel, Map, MapId, NestBuilder, Node, NodeId, Range,
        Reduction, ScheduleType,
    };
    pub use crate::analysis::{extract_nest, MapLevel, MapNest};
    pub use crate::transform::{Rewrite, Transform};
    pub use crate::autotuning::{
        map_schedule_enumerator, Candidate, Checkpoint, Coordinate, EnumeratorConfig,
        MapScheduleEnumerator, Outcome, Rejection, Stage,
    };
    pub use crate::utils::errors::*;
}

use utils::errors::MapSchedResult;

/// Load a fragment from its JSON form.
pub fn load_fragment(json: &str) -> MapSchedResult<ir::Fragment> {
    ir::Fragment::from_json(json)
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_load_fragment_round_trip() {
        let fragment = ir::kernels::stencil(8).unwrap();
        let loaded = load_fragment(&fragment.to_json().unwrap()).unwrap();
        assert_eq!(loaded, fragment);
    }
}
