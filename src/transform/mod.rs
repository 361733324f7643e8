//! Map-nest rewrites.
//!
//! Every rewrite carries its target map(s) and options, checks its own
//! legality and edits the fragment in place. [`Rewrite`] closes the set so
//! callers can dispatch over the whole catalog uniformly.

pub mod permutation;
pub mod tiling;
pub mod expansion;
pub mod fusion;
pub mod local_storage;
pub mod schedule;
pub mod vectorization;

pub use permutation::DimShuffle;
pub use tiling::MapTiling;
pub use expansion::MapExpansion;
pub use fusion::MapCollapse;
pub use local_storage::{InLocalStorage, OutLocalStorage, AccumulateTransient};
pub use schedule::MapSchedule;
pub use vectorization::Vectorization;

use crate::ir::{Fragment, MapId};
use crate::utils::errors::TransformResult;

/// Rewrite pass trait.
pub trait Transform {
    /// Check legality, explaining why the rewrite does not apply.
    fn check(&self, fragment: &Fragment) -> TransformResult<()>;

    /// Edit the fragment in place. Returns the maps identifying the result.
    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>>;

    /// Get transformation name.
    fn name(&self) -> &str;

    fn can_apply(&self, fragment: &Fragment) -> bool {
        self.check(fragment).is_ok()
    }
}

/// The rewrite catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    DimShuffle(DimShuffle),
    Tiling(MapTiling),
    Expansion(MapExpansion),
    Collapse(MapCollapse),
    InLocalStorage(InLocalStorage),
    OutLocalStorage(OutLocalStorage),
    AccumulateTransient(AccumulateTransient),
    Schedule(MapSchedule),
    Vectorization(Vectorization),
}

macro_rules! dispatch {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            Rewrite::DimShuffle($t) => $body,
            Rewrite::Tiling($t) => $body,
            Rewrite::Expansion($t) => $body,
            Rewrite::Collapse($t) => $body,
            Rewrite::InLocalStorage($t) => $body,
            Rewrite::OutLocalStorage($t) => $body,
            Rewrite::AccumulateTransient($t) => $body,
            Rewrite::Schedule($t) => $body,
            Rewrite::Vectorization($t) => $body,
        }
    };
}

impl Transform for Rewrite {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        dispatch!(self, t => t.check(fragment))
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        dispatch!(self, t => t.apply(fragment))
    }

    fn name(&self) -> &str {
        dispatch!(self, t => t.name())
    }
}

macro_rules! impl_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for Rewrite {
            fn from(r: $ty) -> Self {
                Rewrite::$variant(r)
            }
        })*
    };
}

impl_from!(
    DimShuffle(DimShuffle),
    Tiling(MapTiling),
    Expansion(MapExpansion),
    Collapse(MapCollapse),
    InLocalStorage(InLocalStorage),
    OutLocalStorage(OutLocalStorage),
    AccumulateTransient(AccumulateTransient),
    Schedule(MapSchedule),
    Vectorization(Vectorization),
);

/// Apply `rewrite` if legal, returning `Ok(None)` when it does not apply.
pub fn apply_if_legal(rewrite: &Rewrite, fragment: &mut Fragment) -> TransformResult<Option<Vec<MapId>>> {
    if rewrite.can_apply(fragment) {
        rewrite.apply(fragment).map(Some)
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract_nest;
    use crate::ir::{kernels, ScheduleType};

    #[test]
    fn test_uniform_dispatch() {
        let mut f = kernels::matmul(8).unwrap();
        let nest = extract_nest(&f).unwrap();
        let outer = nest.outermost().map;

        let rewrites: Vec<Rewrite> = vec![
            DimShuffle::new(outer, vec!["j".into(), "i".into()]).into(),
            MapSchedule::new(outer, ScheduleType::CpuMulticore, 2).into(),
        ];
        for r in &rewrites {
            assert!(r.can_apply(&f), "{} should apply", r.name());
            r.apply(&mut f).unwrap();
        }
        let map = f.map(outer).unwrap();
        assert_eq!(map.params, vec!["j".to_string(), "i".to_string()]);
        assert_eq!(map.collapse, 2);
        f.validate().unwrap();
    }

    #[test]
    fn test_apply_if_legal_skips() {
        let mut f = kernels::scale(8).unwrap();
        let nest = extract_nest(&f).unwrap();
        let expand: Rewrite = MapExpansion::new(nest.outermost().map).into();
        assert_eq!(expand.name(), "MapExpansion");
        assert_eq!(apply_if_legal(&expand, &mut f).unwrap(), None);
    }
}
