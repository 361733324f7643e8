//! Dimension permutation.
//!
//! Reorders the parameters (and their ranges) of one map:
//! ```text
//! map i, j in [0:N, 0:M]        map j, i in [0:M, 0:N]
//!   C[i, j] = ...          =>     C[i, j] = ...
//! ```
//! Index expressions are untouched; only the iteration order changes.

use crate::ir::{Fragment, MapId};
use crate::transform::Transform;
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// Reorder the parameters of a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimShuffle {
    /// Target map
    pub map: MapId,
    /// New parameter order; must be a permutation of the current one
    pub params: Vec<String>,
}

impl DimShuffle {
    pub fn new(map: MapId, params: Vec<String>) -> Self {
        Self { map, params }
    }

    /// Position of each new parameter in the current order.
    fn positions(&self, current: &[String]) -> Option<Vec<usize>> {
        if current.len() != self.params.len() {
            return None;
        }
        let mut taken = vec![false; current.len()];
        let mut positions = Vec::with_capacity(current.len());
        for p in &self.params {
            let pos = current.iter().position(|q| q == p)?;
            if std::mem::replace(&mut taken[pos], true) {
                return None;
            }
            positions.push(pos);
        }
        Some(positions)
    }
}

impl Transform for DimShuffle {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        let map = fragment.require_map(self.map)?;
        if self.positions(&map.params).is_none() {
            return Err(TransformError::new(
                TransformErrorKind::ContractViolation,
                self.name(),
                format!("{:?} is not a permutation of {:?}", self.params, map.params),
            ));
        }
        Ok(())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        self.check(fragment)?;
        let map = fragment.require_map(self.map)?;
        let positions = self.positions(&map.params).unwrap_or_default();
        let ranges = positions.iter().map(|&i| map.ranges[i].clone()).collect();

        if let Some(map) = fragment.map_mut(self.map) {
            map.params = self.params.clone();
            map.ranges = ranges;
        }
        Ok(vec![self.map])
    }

    fn name(&self) -> &str {
        "DimShuffle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract_nest;
    use crate::ir::{kernels, Range};

    #[test]
    fn test_shuffle_moves_ranges() {
        let mut f = kernels::stencil(8).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        DimShuffle::new(map, vec!["j".into(), "i".into()]).apply(&mut f).unwrap();

        let m = f.map(map).unwrap();
        assert_eq!(m.params, vec!["j".to_string(), "i".to_string()]);
        assert_eq!(m.ranges, vec![Range::span(1, 7), Range::span(0, 8)]);
        f.validate().unwrap();
    }

    #[test]
    fn test_identity_shuffle_is_noop() {
        let mut f = kernels::matmul(4).unwrap();
        let before = f.clone();
        let map = extract_nest(&f).unwrap().outermost().map;
        DimShuffle::new(map, vec!["i".into(), "j".into()]).apply(&mut f).unwrap();
        assert_eq!(f, before);
    }

    #[test]
    fn test_contract_violation() {
        let mut f = kernels::matmul(4).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;

        for bad in [vec!["i"], vec!["i", "k"], vec!["i", "i"]] {
            let shuffle = DimShuffle::new(map, bad.into_iter().map(String::from).collect());
            assert!(!shuffle.can_apply(&f));
            let err = shuffle.apply(&mut f).unwrap_err();
            assert_eq!(err.kind, TransformErrorKind::ContractViolation);
        }
    }
}
