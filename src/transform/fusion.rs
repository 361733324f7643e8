//! Map collapse (fusion of two directly nested maps).

use crate::ir::{Fragment, MapId};
use crate::transform::Transform;
use crate::utils::errors::{TransformError, TransformResult};

/// Fuse `inner` into `outer`, appending its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapCollapse {
    pub outer: MapId,
    pub inner: MapId,
}

impl MapCollapse {
    pub fn new(outer: MapId, inner: MapId) -> Self {
        Self { outer, inner }
    }
}

impl Transform for MapCollapse {
    /// Legal when the two scopes touch only each other and no inner range
    /// depends on an outer parameter.
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        let (outer_entry, outer_exit) = fragment.scope_nodes(self.outer)?;
        let (inner_entry, inner_exit) = fragment.scope_nodes(self.inner)?;

        let entry_feeds_inner = fragment.out_edges(outer_entry).all(|e| e.dst == inner_entry)
            && fragment.in_edges(inner_entry).all(|e| e.src == outer_entry)
            && fragment.out_edges(outer_entry).next().is_some();
        if !entry_feeds_inner {
            return Err(TransformError::not_applicable(
                self.name(),
                format!("entry of {} does not lead only into {}", self.outer, self.inner),
            ));
        }
        let exit_feeds_outer = fragment.out_edges(inner_exit).all(|e| e.dst == outer_exit)
            && fragment.in_edges(outer_exit).all(|e| e.src == inner_exit);
        if !exit_feeds_outer {
            return Err(TransformError::not_applicable(
                self.name(),
                format!("exit of {} does not lead only into {}", self.inner, self.outer),
            ));
        }

        let outer = fragment.require_map(self.outer)?;
        let inner = fragment.require_map(self.inner)?;
        for (param, range) in inner.params.iter().zip(&inner.ranges) {
            if let Some(p) = outer.params.iter().find(|p| range.depends_on(p)) {
                return Err(TransformError::not_applicable(
                    self.name(),
                    format!("range of '{}' depends on '{}'", param, p),
                ));
            }
        }
        Ok(())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        self.check(fragment)?;
        fragment.merge_inner_map(self.outer, self.inner)?;
        Ok(vec![self.outer])
    }

    fn name(&self) -> &str {
        "MapCollapse"
    }
}
