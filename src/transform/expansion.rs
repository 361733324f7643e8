//! Map expansion (fission of a multi-parameter map).
//!
//! ```text
//! map i, j, k:             map i:
//!   body            =>       map j:
//!                              map k:
//!                                body
//! ```
//! Every resulting level remembers the map it was split from, so that a
//! later collapse can restore the original grouping.

use crate::ir::{Fragment, Map, MapId};
use crate::transform::Transform;
use crate::utils::errors::{TransformError, TransformResult};

/// Split a map into one single-parameter map per parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapExpansion {
    pub map: MapId,
}

impl MapExpansion {
    pub fn new(map: MapId) -> Self {
        Self { map }
    }
}

impl Transform for MapExpansion {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        let map = fragment.require_map(self.map)?;
        if map.params.len() < 2 {
            return Err(TransformError::not_applicable(
                self.name(),
                format!("map '{}' has a single parameter", map.label),
            ));
        }
        Ok(())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        self.check(fragment)?;
        let original = fragment.require_map(self.map)?.clone();
        let group = original.fission_group.unwrap_or(self.map);
        let last = original.params.len() - 1;

        // The original map keeps the innermost parameter; the outermost
        // level inherits its label.
        if let Some(map) = fragment.map_mut(self.map) {
            map.label = format!("{}_{}", original.label, last);
            map.params = vec![original.params[last].clone()];
            map.ranges = vec![original.ranges[last].clone()];
            map.collapse = 1;
            map.fission_group = Some(group);
        }

        let mut maps = vec![self.map];
        for (i, (param, range)) in original.params.iter().zip(&original.ranges).enumerate().take(last).rev() {
            let label = if i == 0 { original.label.clone() } else { format!("{}_{}", original.label, i) };
            let mut level = Map::new(label, vec![param.clone()], vec![range.clone()]);
            level.schedule = original.schedule;
            level.fission_group = Some(group);
            let outer = fragment.insert_enclosing_map(maps[0], level)?;
            maps.insert(0, outer);
        }
        Ok(maps)
    }

    fn name(&self) -> &str {
        "MapExpansion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract_nest;
    use crate::ir::kernels;

    #[test]
    fn test_expand_matmul_outer_level() {
        let mut f = kernels::matmul(8).unwrap();
        let outer = extract_nest(&f).unwrap().outermost().map;
        let maps = MapExpansion::new(outer).apply(&mut f).unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[1], outer);

        let nest = extract_nest(&f).unwrap();
        let params: Vec<Vec<String>> = nest.params();
        assert_eq!(params, vec![vec!["i".to_string()], vec!["j".to_string()], vec!["k".to_string()]]);
        assert_eq!(nest.inputs, vec!["A", "B"]);
        for m in &maps {
            assert_eq!(f.map(*m).unwrap().fission_group, Some(outer));
        }
        f.validate().unwrap();
    }

    #[test]
    fn test_single_parameter_not_applicable() {
        let f = kernels::scale(8).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        assert!(!MapExpansion::new(map).can_apply(&f));
    }
}
