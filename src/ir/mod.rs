//! Dataflow fragment model.
//!
//! This module defines the graph the enumerator rewrites:
//! - Expressions: affine indices and iteration ranges
//! - Fragment: nodes, maps, memlets and the editing primitives
//! - Validation: structural checks run on every candidate
//! - Builder and kernels: perfectly nested fragments for tests and the CLI

pub mod expr;
pub mod fragment;
pub mod builder;
pub mod kernels;
mod validate;

pub use expr::{Affine, Range, Footprint, index_footprint, param_footprint};
pub use fragment::*;
pub use builder::NestBuilder;
pub use kernels::Kernel;
