//! Map tiling (strip-mining).
//!
//! Tiling splits a map into an outer map over tiles and the original map
//! restricted to one tile, improving cache locality.
//!
//! Example:
//! ```text
//! map i, j in [0:N, 0:M]:
//!   A[i, j] = ...
//! ```
//! becomes (tile sizes Ti, Tj):
//! ```text
//! map tile_i, tile_j in [0:N:Ti, 0:M:Tj]:
//!   map i, j in [tile_i:min(tile_i + Ti, N), tile_j:min(tile_j + Tj, M)]:
//!     A[i, j] = ...
//! ```
//! Parameters with tile size 1 are left alone and get no tile parameter.

use crate::ir::{Fragment, Map, MapId, Range};
use crate::transform::Transform;
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// Map tiling transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTiling {
    /// Target map
    pub map: MapId,
    /// Tile size for each parameter of the map, in order (1 = not tiled)
    pub tile_sizes: Vec<i64>,
}

impl MapTiling {
    /// Create a new tiling transformation with specified tile sizes.
    pub fn new(map: MapId, tile_sizes: Vec<i64>) -> Self {
        Self { map, tile_sizes }
    }

    /// `tile_<param>`, suffixed until it clashes with no existing parameter.
    fn tile_param(fragment: &Fragment, param: &str, reserved: &[String]) -> String {
        let base = format!("tile_{}", param);
        let free = |name: &String| !fragment.has_param(name) && !reserved.contains(name);
        std::iter::once(base.clone())
            .chain((1..).map(|i| format!("{}_{}", base, i)))
            .find(free)
            .unwrap_or(base)
    }
}

impl Transform for MapTiling {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        let map = fragment.require_map(self.map)?;
        if self.tile_sizes.len() != map.params.len() {
            return Err(TransformError::new(
                TransformErrorKind::ContractViolation,
                self.name(),
                format!("{} tile sizes for {} parameters", self.tile_sizes.len(), map.params.len()),
            ));
        }
        if let Some(size) = self.tile_sizes.iter().find(|&&s| s < 1) {
            return Err(TransformError::new(
                TransformErrorKind::ContractViolation,
                self.name(),
                format!("tile size {} is not positive", size),
            ));
        }
        if self.tile_sizes.iter().all(|&s| s == 1) {
            return Err(TransformError::not_applicable(self.name(), "all tile sizes are 1"));
        }

        for ((param, range), &size) in map.params.iter().zip(&map.ranges).zip(&self.tile_sizes) {
            if size == 1 {
                continue;
            }
            match range {
                Range::Tile { .. } => {
                    return Err(TransformError::not_applicable(
                        self.name(),
                        format!("'{}' already iterates over a tile", param),
                    ));
                }
                Range::Span { step, .. } if *step != 1 => {
                    return Err(TransformError::not_applicable(
                        self.name(),
                        format!("'{}' has stride {}", param, step),
                    ));
                }
                Range::Span { .. } => {}
            }
        }
        Ok(())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        self.check(fragment)?;
        let inner = fragment.require_map(self.map)?.clone();

        let mut outer_params = Vec::new();
        let mut outer_ranges = Vec::new();
        let mut inner_ranges = Vec::with_capacity(inner.ranges.len());

        for ((param, range), &size) in inner.params.iter().zip(&inner.ranges).zip(&self.tile_sizes) {
            let (start, end) = match range {
                Range::Span { start, end, .. } if size > 1 => (*start, *end),
                _ => {
                    inner_ranges.push(range.clone());
                    continue;
                }
            };
            let tile = Self::tile_param(fragment, param, &outer_params);
            outer_ranges.push(Range::Span { start, end, step: size });
            inner_ranges.push(Range::Tile { outer: tile.clone(), size, end, step: 1 });
            outer_params.push(tile);
        }

        let outer = fragment.insert_enclosing_map(
            self.map,
            Map::new(format!("{}_tiles", inner.label), outer_params, outer_ranges),
        )?;
        if let Some(map) = fragment.map_mut(self.map) {
            map.ranges = inner_ranges;
        }

        log::trace!("tiled {} with sizes {:?} under {}", self.map, self.tile_sizes, outer);
        Ok(vec![outer, self.map])
    }

    fn name(&self) -> &str {
        "MapTiling"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract_nest;
    use crate::ir::{kernels, NestBuilder};

    #[test]
    fn test_tiling_adds_level() {
        let mut f = kernels::matmul(64).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        let maps = MapTiling::new(map, vec![32, 1]).apply(&mut f).unwrap();

        let nest = extract_nest(&f).unwrap();
        assert_eq!(nest.depth(), 3);
        assert_eq!(nest.maps(), vec![maps[0], maps[1], nest.innermost().map]);
        assert_eq!(nest.outermost().params, vec!["tile_i".to_string()]);

        let tiled = f.map(map).unwrap();
        assert_eq!(tiled.ranges[0], Range::Tile { outer: "tile_i".into(), size: 32, end: 64, step: 1 });
        assert_eq!(tiled.ranges[1], Range::span(0, 64));
        f.validate().unwrap();
    }

    #[test]
    fn test_trivial_tiling_not_applicable() {
        let f = kernels::matmul(16).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        let tiling = MapTiling::new(map, vec![1, 1]);
        let err = tiling.check(&f).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::NotApplicable);
    }

    #[test]
    fn test_cannot_retile_a_tile() {
        let mut f = kernels::scale(16).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        MapTiling::new(map, vec![4]).apply(&mut f).unwrap();

        let again = MapTiling::new(map, vec![2]);
        assert!(!again.can_apply(&f));
    }

    #[test]
    fn test_tile_param_names_are_unique() {
        let mut f = NestBuilder::new("clash")
            .array("A", vec![4, 16])
            .level(&[("tile_i", Range::span(0, 4))])
            .level(&[("i", Range::span(0, 16))])
            .read("A", "a", "tile_i, i")
            .write("A", "b", "tile_i, i", None)
            .tasklet("inc", "b = a + 1")
            .build()
            .unwrap();
        let inner = extract_nest(&f).unwrap().innermost().map;
        MapTiling::new(inner, vec![4]).apply(&mut f).unwrap();

        let nest = extract_nest(&f).unwrap();
        assert_eq!(nest.params()[1], vec!["tile_i_1".to_string()]);
        f.validate().unwrap();
    }
}
