//! Vectorization of the innermost map.
//!
//! The last parameter of the map advances by the vector width and every
//! access becomes a contiguous vector of that many elements. This requires
//! the parameter to appear only in the last index of each access, with a
//! unit coefficient, and a uniform trip count divisible by the width.

use crate::ir::{Fragment, MapId, Node, NodeId};
use crate::transform::Transform;
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// Vectorization transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vectorization {
    pub map: MapId,
    /// Vector width; 1 leaves the map untouched
    pub width: u32,
}

impl Vectorization {
    pub fn new(map: MapId, width: u32) -> Self {
        Self { map, width }
    }

    fn reject(&self, message: String) -> TransformError {
        TransformError::not_applicable(self.name(), message)
    }
}

impl Transform for Vectorization {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        let map = fragment.require_map(self.map)?;
        match self.width {
            0 => {
                return Err(TransformError::new(
                    TransformErrorKind::ContractViolation,
                    self.name(),
                    "vector width 0",
                ));
            }
            1 => return Ok(()),
            _ => {}
        }
        if let Some(width) = map.vector_width {
            return Err(self.reject(format!("map '{}' is already vectorized with width {}", map.label, width)));
        }

        let (entry, _) = fragment.scope_nodes(self.map)?;
        let scope = fragment.scope_parents()?;
        let inside = |node: NodeId| scope.get(&node).copied().flatten() == Some(entry);
        let nested = fragment.nodes()
            .any(|(id, n)| matches!(n, Node::MapEntry { .. }) && inside(id));
        if nested {
            return Err(self.reject(format!("map '{}' is not innermost", map.label)));
        }

        let param = &map.params[map.params.len() - 1];
        let range = &map.ranges[map.ranges.len() - 1];
        if range.step() != 1 {
            return Err(self.reject(format!("'{}' has stride {}", param, range.step())));
        }
        let ranges = fragment.param_ranges();
        let trips = range.trip_count(|p| ranges.get(p))
            .ok_or_else(|| self.reject(format!("'{}' has no uniform trip count", param)))?;
        if trips % i64::from(self.width) != 0 {
            return Err(self.reject(format!("trip count {} not divisible by {}", trips, self.width)));
        }

        let tasklets: Vec<_> = fragment.nodes()
            .filter(|(id, n)| matches!(n, Node::Tasklet { .. }) && inside(*id))
            .map(|(id, _)| id)
            .collect();
        for e in fragment.edges() {
            if !tasklets.contains(&e.src) && !tasklets.contains(&e.dst) {
                continue;
            }
            let Some(subset) = &e.memlet.subset else { continue };
            let Some((last, leading)) = subset.split_last() else { continue };
            if leading.iter().any(|index| index.depends_on(param)) {
                return Err(self.reject(format!("'{}' indexes a leading dimension of '{}'", param, e.memlet.data)));
            }
            if !matches!(last.coefficient(param), 0 | 1) {
                return Err(self.reject(format!("'{}' accesses '{}' with stride {}", param, e.memlet.data, last.coefficient(param))));
            }
        }
        Ok(())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        self.check(fragment)?;
        if self.width == 1 {
            return Ok(vec![self.map]);
        }
        if let Some(map) = fragment.map_mut(self.map) {
            let last = map.ranges.len() - 1;
            map.ranges[last] = map.ranges[last].strided(i64::from(self.width));
            map.vector_width = Some(self.width);
        }
        Ok(vec![self.map])
    }

    fn name(&self) -> &str {
        "Vectorization"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract_nest;
    use crate::ir::{kernels, Range};
    use crate::transform::{DimShuffle, MapTiling};

    #[test]
    fn test_vectorize_scale() {
        let mut f = kernels::scale(64).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        Vectorization::new(map, 4).apply(&mut f).unwrap();

        let m = f.map(map).unwrap();
        assert_eq!(m.vector_width, Some(4));
        assert_eq!(m.ranges[0], Range::Span { start: 0, end: 64, step: 4 });
        f.validate().unwrap();

        assert!(!Vectorization::new(map, 2).can_apply(&f));
    }

    #[test]
    fn test_width_one_is_noop() {
        let mut f = kernels::scale(7).unwrap();
        let before = f.clone();
        let map = extract_nest(&f).unwrap().outermost().map;
        Vectorization::new(map, 1).apply(&mut f).unwrap();
        assert_eq!(f, before);
    }

    #[test]
    fn test_non_divisible_trip_count() {
        let f = kernels::scale(7).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        let err = Vectorization::new(map, 2).check(&f).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::NotApplicable);
        assert!(err.message.contains("not divisible"));
    }

    #[test]
    fn test_only_innermost() {
        let f = kernels::matmul(8).unwrap();
        let outer = extract_nest(&f).unwrap().outermost().map;
        let err = Vectorization::new(outer, 2).check(&f).unwrap_err();
        assert!(err.message.contains("not innermost"));
    }

    #[test]
    fn test_leading_dimension_rejected() {
        // After the shuffle the last parameter `i` indexes rows of A and B.
        let mut f = kernels::stencil(10).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        DimShuffle::new(map, vec!["j".into(), "i".into()]).apply(&mut f).unwrap();
        let err = Vectorization::new(map, 2).check(&f).unwrap_err();
        assert!(err.message.contains("leading dimension"));
    }

    #[test]
    fn test_vectorize_inside_tile() {
        let mut f = kernels::scale(64).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        MapTiling::new(map, vec![8]).apply(&mut f).unwrap();
        Vectorization::new(map, 4).apply(&mut f).unwrap();
        f.validate().unwrap();

        let mut ragged = kernels::scale(60).unwrap();
        let map = extract_nest(&ragged).unwrap().outermost().map;
        MapTiling::new(map, vec![8]).apply(&mut ragged).unwrap();
        assert!(!Vectorization::new(map, 4).can_apply(&ragged));
    }
}
