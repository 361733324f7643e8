//! Map-level extraction.
//!
//! Recovers the chain of nested maps of a fragment together with the
//! non-scalar containers that flow in and out of the outermost level. The
//! chain is rebuilt from the graph on every call; callers must re-extract
//! after each structural edit.

use crate::ir::{Fragment, MapId, Node, NodeId};
use crate::utils::errors::{NestError, NestErrorKind};
use std::collections::{BTreeMap, BTreeSet};

/// One level of a perfect map nest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLevel {
    pub map: MapId,
    pub entry: NodeId,
    pub exit: NodeId,
    pub params: Vec<String>,
}

/// A perfect nest, outermost level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapNest {
    pub levels: Vec<MapLevel>,
    /// Non-scalar containers read at the outermost entry, sorted
    pub inputs: Vec<String>,
    /// Non-scalar containers written at the outermost exit, sorted
    pub outputs: Vec<String>,
}

impl MapNest {
    /// Number of levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Parameters of every level, outermost first.
    pub fn params(&self) -> Vec<Vec<String>> {
        self.levels.iter().map(|l| l.params.clone()).collect()
    }

    pub fn outermost(&self) -> &MapLevel {
        &self.levels[0]
    }

    pub fn innermost(&self) -> &MapLevel {
        &self.levels[self.levels.len() - 1]
    }

    /// Maps of every level, outermost first.
    pub fn maps(&self) -> Vec<MapId> {
        self.levels.iter().map(|l| l.map).collect()
    }
}

/// Extract the nest of `fragment`.
pub fn extract_nest(fragment: &Fragment) -> Result<MapNest, NestError> {
    let scope = fragment.scope_parents()?;

    let mut roots = Vec::new();
    let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for (id, node) in fragment.nodes() {
        if !matches!(node, Node::MapEntry { .. }) {
            continue;
        }
        match scope.get(&id).copied().flatten() {
            None => roots.push(id),
            Some(parent) => children.entry(parent).or_default().push(id),
        }
    }

    let root = match roots.as_slice() {
        [] => return Err(NestError::new(NestErrorKind::NoRoot, format!("fragment '{}' has no top-level map", fragment.name))),
        [root] => *root,
        _ => return Err(NestError::new(NestErrorKind::Branching, format!("fragment '{}' has {} top-level maps", fragment.name, roots.len()))),
    };

    let mut levels = Vec::new();
    let mut current = Some(root);
    while let Some(entry) = current {
        let Some(Node::MapEntry { map }) = fragment.node(entry) else {
            return Err(NestError::new(NestErrorKind::NoRoot, format!("{} is not a map entry", entry)));
        };
        let params = fragment.map(*map)
            .map(|m| m.params.clone())
            .ok_or_else(|| NestError::new(NestErrorKind::MissingExit, format!("map {} was removed", map)))?;
        let exit = fragment.exit_node(*map)
            .ok_or_else(|| NestError::new(NestErrorKind::MissingExit, format!("map {} has no exit node", map)))?;
        levels.push(MapLevel { map: *map, entry, exit, params });

        current = match children.get(&entry).map(Vec::as_slice) {
            None | Some([]) => None,
            Some([child]) => Some(*child),
            Some(nested) => return Err(NestError::new(
                NestErrorKind::Branching,
                format!("map {} encloses {} maps", map, nested.len()),
            )),
        };
    }

    let outermost = &levels[0];
    let is_array = |data: &str| fragment.array(data).map_or(false, |d| !d.is_scalar());
    let is_access = |node: NodeId| matches!(fragment.node(node), Some(Node::Access { .. }));

    let inputs: BTreeSet<String> = fragment.in_edges(outermost.entry)
        .filter(|e| is_access(e.src) && is_array(&e.memlet.data))
        .map(|e| e.memlet.data.clone())
        .collect();
    let outputs: BTreeSet<String> = fragment.out_edges(outermost.exit)
        .filter(|e| is_access(e.dst) && is_array(&e.memlet.data))
        .map(|e| e.memlet.data.clone())
        .collect();

    Ok(MapNest {
        levels,
        inputs: inputs.into_iter().collect(),
        outputs: outputs.into_iter().collect(),
    })
}
