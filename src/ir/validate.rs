//! Structural validation of fragments.
//!
//! Every candidate produced by the enumerator passes through
//! [`Fragment::validate`]. The checks only look at structure (node and edge
//! consistency, scoping, ranges, connectors); they say nothing about
//! performance.

use super::expr::Range;
use super::fragment::{Fragment, Map, Node, NodeId};
use crate::utils::errors::{ValidationError, ValidationErrorKind};
use std::collections::{BTreeMap, BTreeSet};

impl Fragment {
    /// Run all structural checks, stopping at the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.check_edges()?;
        self.check_data()?;
        self.check_scopes()?;
        let scope = self.scope_parents().map_err(|e| {
            ValidationError::new(ValidationErrorKind::Cycle, e.message)
        })?;
        self.check_maps(&scope)?;
        self.check_connectors()?;
        self.check_subsets(&scope)?;
        self.check_transients()?;
        Ok(())
    }

    /// Shape checks on map parameters and strides only.
    ///
    /// These hold for any fragment the rewrites can work on, so the
    /// enumerator runs them even when full validation is turned off.
    pub fn validate_ranges(&self) -> Result<(), ValidationError> {
        for (id, map) in self.maps() {
            Self::check_shape(map).map_err(|e| e.at_map(id))?;
        }
        Ok(())
    }

    fn check_shape(map: &Map) -> Result<(), ValidationError> {
        if map.params.is_empty() || map.params.len() != map.ranges.len() {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidRange,
                format!("map '{}' needs one range per parameter", map.label),
            ));
        }
        for (param, range) in map.params.iter().zip(&map.ranges) {
            let malformed = match range {
                Range::Span { step, .. } => *step <= 0,
                Range::Tile { size, step, .. } => *step <= 0 || *size <= 0,
            };
            if malformed {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidRange,
                    format!("'{}' has non-positive stride or size in {}", param, range),
                ));
            }
        }
        Ok(())
    }

    fn check_edges(&self) -> Result<(), ValidationError> {
        for e in self.edges() {
            for id in [e.src, e.dst] {
                if self.node(id).is_none() {
                    return Err(ValidationError::new(
                        ValidationErrorKind::DanglingEdge,
                        format!("edge carrying '{}' references a removed node", e.memlet.data),
                    ).at_node(id));
                }
            }
        }
        Ok(())
    }

    fn check_data(&self) -> Result<(), ValidationError> {
        for (id, node) in self.nodes() {
            if let Node::Access { data } = node {
                if self.array(data).is_none() {
                    return Err(ValidationError::new(
                        ValidationErrorKind::UndefinedData,
                        format!("access node for undeclared container '{}'", data),
                    ).at_node(id));
                }
            }
        }
        for e in self.edges() {
            if self.array(&e.memlet.data).is_none() {
                return Err(ValidationError::new(
                    ValidationErrorKind::UndefinedData,
                    format!("memlet references undeclared container '{}'", e.memlet.data),
                ).at_node(e.src));
            }
        }
        Ok(())
    }

    /// Every map has exactly one entry and one exit; every scope node refers
    /// to a live map.
    fn check_scopes(&self) -> Result<(), ValidationError> {
        let mut entries: BTreeMap<_, usize> = BTreeMap::new();
        let mut exits: BTreeMap<_, usize> = BTreeMap::new();
        for (id, node) in self.nodes() {
            let (map, counter) = match node {
                Node::MapEntry { map } => (*map, &mut entries),
                Node::MapExit { map } => (*map, &mut exits),
                _ => continue,
            };
            if self.map(map).is_none() {
                return Err(ValidationError::new(
                    ValidationErrorKind::UnpairedScope,
                    "scope node of a removed map",
                ).at_node(id).at_map(map));
            }
            *counter.entry(map).or_insert(0) += 1;
        }
        for (id, _) in self.maps() {
            let pair = (entries.get(&id).copied(), exits.get(&id).copied());
            if pair != (Some(1), Some(1)) {
                return Err(ValidationError::new(
                    ValidationErrorKind::UnpairedScope,
                    "map must have exactly one entry and one exit",
                ).at_map(id));
            }
        }
        Ok(())
    }

    fn check_maps(&self, scope: &BTreeMap<NodeId, Option<NodeId>>) -> Result<(), ValidationError> {
        let ranges = self.param_ranges();
        let mut seen = BTreeSet::new();

        for (id, map) in self.maps() {
            Self::check_shape(map).map_err(|e| e.at_map(id))?;
            for p in &map.params {
                if !seen.insert(p.as_str()) {
                    return Err(ValidationError::new(
                        ValidationErrorKind::DuplicateParam,
                        format!("parameter '{}' declared twice", p),
                    ).at_map(id));
                }
            }

            let entry = self.entry_node(id);
            let enclosing = entry
                .map(|e| self.enclosing_params(e, scope))
                .unwrap_or_default();
            for (p, r) in map.params.iter().zip(&map.ranges) {
                self.check_range(p, r, &enclosing).map_err(|e| e.at_map(id))?;
            }

            if map.collapse == 0 || map.collapse > map.params.len() {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidCollapse,
                    format!("collapse {} out of 1..={}", map.collapse, map.params.len()),
                ).at_map(id));
            }

            if let Some(width) = map.vector_width {
                let last = &map.ranges[map.ranges.len() - 1];
                let uniform = last.trip_count(|q| ranges.get(q)).is_some();
                if width < 2 || last.step() != i64::from(width) || !uniform {
                    return Err(ValidationError::new(
                        ValidationErrorKind::InvalidVectorWidth,
                        format!("vector width {} does not match range {}", width, last),
                    ).at_map(id));
                }
            }
        }
        Ok(())
    }

    fn check_range(&self, param: &str, range: &Range, enclosing: &BTreeSet<String>) -> Result<(), ValidationError> {
        let malformed = |msg: String| Err(ValidationError::new(ValidationErrorKind::InvalidRange, msg));
        match range {
            Range::Span { start, end, .. } => {
                if end <= start {
                    return malformed(format!("'{}' has empty range {}", param, range));
                }
            }
            Range::Tile { outer, .. } => {
                if !enclosing.contains(outer) {
                    return Err(ValidationError::new(
                        ValidationErrorKind::UnboundParam,
                        format!("range of '{}' uses '{}' outside its scope", param, outer),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Map connectors come in `IN_x`/`OUT_x` pairs.
    fn check_connectors(&self) -> Result<(), ValidationError> {
        for (id, node) in self.nodes() {
            if !matches!(node, Node::MapEntry { .. } | Node::MapExit { .. }) {
                continue;
            }
            let ins: BTreeSet<&str> = self.in_edges(id)
                .filter_map(|e| e.dst_conn.as_deref()?.strip_prefix("IN_"))
                .collect();
            let outs: BTreeSet<&str> = self.out_edges(id)
                .filter_map(|e| e.src_conn.as_deref()?.strip_prefix("OUT_"))
                .collect();
            if let Some(conn) = ins.symmetric_difference(&outs).next() {
                return Err(ValidationError::new(
                    ValidationErrorKind::UnmatchedConnector,
                    format!("connector '{}' has no counterpart", conn),
                ).at_node(id));
            }
        }
        Ok(())
    }

    /// Element subsets match the container rank and only use parameters in
    /// scope of the tasklet.
    fn check_subsets(&self, scope: &BTreeMap<NodeId, Option<NodeId>>) -> Result<(), ValidationError> {
        for e in self.edges() {
            let Some(subset) = &e.memlet.subset else { continue };
            let Some(desc) = self.array(&e.memlet.data) else { continue };
            if subset.len() != desc.rank() {
                return Err(ValidationError::new(
                    ValidationErrorKind::RankMismatch,
                    format!("'{}' has rank {} but is indexed with {} dimensions", e.memlet.data, desc.rank(), subset.len()),
                ).at_node(e.src));
            }

            let tasklet = if matches!(self.node(e.dst), Some(Node::Tasklet { .. })) { e.dst } else { e.src };
            let visible = self.enclosing_params(tasklet, scope);
            for index in subset {
                if let Some(p) = index.params().find(|p| !visible.contains(*p)) {
                    return Err(ValidationError::new(
                        ValidationErrorKind::UnboundParam,
                        format!("index of '{}' uses '{}' outside its scope", e.memlet.data, p),
                    ).at_node(tasklet));
                }
            }
        }
        Ok(())
    }

    /// A transient that is read must also be written somewhere.
    fn check_transients(&self) -> Result<(), ValidationError> {
        let mut read = BTreeSet::new();
        let mut written = BTreeSet::new();
        for (id, node) in self.nodes() {
            if let Node::Access { data } = node {
                if self.out_edges(id).next().is_some() {
                    read.insert(data.as_str());
                }
                if self.in_edges(id).next().is_some() {
                    written.insert(data.as_str());
                }
            }
        }
        for (name, desc) in self.arrays() {
            if desc.transient && read.contains(name) && !written.contains(name) {
                return Err(ValidationError::new(
                    ValidationErrorKind::UninitializedTransient,
                    format!("transient '{}' is read but never written", name),
                ));
            }
        }
        Ok(())
    }

    fn enclosing_params(&self, node: NodeId, scope: &BTreeMap<NodeId, Option<NodeId>>) -> BTreeSet<String> {
        let mut params = BTreeSet::new();
        let mut current = scope.get(&node).copied().flatten();
        while let Some(entry) = current {
            if let Some(Node::MapEntry { map }) = self.node(entry) {
                if let Some(m) = self.map(*map) {
                    params.extend(m.params.iter().cloned());
                }
            }
            current = scope.get(&entry).copied().flatten();
        }
        params
    }
}
