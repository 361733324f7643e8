//! Map-Schedule Enumeration
//!
//! Explores every combination of rewrites of a perfect map nest and yields
//! the ones that validate.
//!
//! # Search dimensions
//!
//! - **Permutation**: parameter order within each level
//! - **Tiling**: power-of-two tile size per level
//! - **Local storage**: staging buffers between adjacent levels
//! - **Parallelization**: sequential or multicore with a collapse degree
//! - **Vectorization**: vector width of the innermost level
//!
//! # Example
//!
//! ```ignore
//! use mapsched::autotuning::{EnumeratorConfig, MapScheduleEnumerator};
//! use mapsched::ir::kernels;
//!
//! let config = EnumeratorConfig::quick();
//! let enumerator = MapScheduleEnumerator::new(kernels::matmul(64)?, config)?;
//! for candidate in enumerator.take(10) {
//!     println!("{}  {}", candidate.coordinate, candidate.description);
//! }
//! ```

mod apply;
mod choices;
mod config;
mod cursor;
mod results;
mod search;
pub mod space;

pub use apply::{
    apply_local_storage, apply_parallelization, apply_permutation, apply_tiling, apply_vectorization,
    collapse_all, expand_all,
};
pub use choices::{LocalStorage, Parallelization, Permutation, Tiling};
pub use config::EnumeratorConfig;
pub use cursor::{Coordinate, Dimension};
pub use results::{Candidate, Checkpoint};
pub use search::{MapScheduleEnumerator, Outcome, Outcomes, Rejection, SearchStats, SpaceSize, Stage};

use crate::ir::Fragment;
use crate::utils::errors::MapSchedResult;

/// Enumerate `fragment` with the default configuration, starting at
/// `resume` (inclusive) when given.
pub fn map_schedule_enumerator(fragment: Fragment, resume: Option<Coordinate>) -> MapSchedResult<MapScheduleEnumerator> {
    let enumerator = MapScheduleEnumerator::new(fragment, EnumeratorConfig::default())?;
    Ok(match resume {
        Some(coordinate) => enumerator.resume_from(coordinate),
        None => enumerator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::kernels;
    use crate::utils::errors::MapSchedError;

    #[test]
    fn test_entry_point_resumes() {
        let f = kernels::scale(16).unwrap();
        let all: Vec<Coordinate> = map_schedule_enumerator(f.clone(), None).unwrap().map(|c| c.coordinate).collect();
        let from = all[all.len() / 2];
        let tail: Vec<Coordinate> = map_schedule_enumerator(f, Some(from)).unwrap().map(|c| c.coordinate).collect();
        assert_eq!(tail, all[all.len() / 2..].to_vec());
    }

    #[test]
    fn test_malformed_input() {
        let empty = Fragment::new("empty");
        assert!(matches!(map_schedule_enumerator(empty, None), Err(MapSchedError::Nest(_))));
    }
}
