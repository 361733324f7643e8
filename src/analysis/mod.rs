//! Analysis passes over dataflow fragments.

pub mod levels;

pub use levels::{extract_nest, MapLevel, MapNest};
