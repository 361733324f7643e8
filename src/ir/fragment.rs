//! Dataflow fragments.
//!
//! A fragment is one control region: an arena of nodes (access nodes, map
//! entries and exits, tasklets) connected by edges that carry memlets.
//! Maps are stored in their own table and referenced by both their entry and
//! exit node. Connectors on map nodes follow the `IN_<data>` / `OUT_<data>`
//! convention, so the path of a container through a nest can be followed
//! level by level.
//!
//! ```text
//! A ──IN_A──▶ [entry i,j] ──OUT_A→IN_A──▶ [entry k] ──OUT_A──▶ (tasklet)
//! (tasklet) ──IN_C──▶ [exit k] ──OUT_C→IN_C──▶ [exit i,j] ──OUT_C──▶ C
//! ```

use super::expr::{Affine, Range};
use crate::utils::errors::{IrError, IrErrorKind, NestError, NestErrorKind, MapSchedResult};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Index of a node in the fragment arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self { Self(id) }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Index of a map in the fragment's map table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId(pub u64);

impl MapId {
    pub fn new(id: u64) -> Self { Self(id) }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Reference to a data container
    Access { data: String },
    /// Start of a map scope
    MapEntry { map: MapId },
    /// End of a map scope
    MapExit { map: MapId },
    /// Computation; its connectors name its inputs and outputs
    Tasklet { label: String, code: String },
}

/// Schedule of a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScheduleType {
    /// Left to the code generator
    #[default]
    Default,
    /// Plain sequential loop
    Sequential,
    /// Multicore parallel loop
    CpuMulticore,
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleType::Default => write!(f, "default"),
            ScheduleType::Sequential => write!(f, "sequential"),
            ScheduleType::CpuMulticore => write!(f, "cpu_multicore"),
        }
    }
}

/// Write-conflict resolution for accumulating outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reduction {
    Sum,
    Product,
    Min,
    Max,
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Sum => write!(f, "sum"),
            Reduction::Product => write!(f, "product"),
            Reduction::Min => write!(f, "min"),
            Reduction::Max => write!(f, "max"),
        }
    }
}

/// A parametric loop scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    pub label: String,
    /// Iteration parameters, outermost first
    pub params: Vec<String>,
    /// One range per parameter
    pub ranges: Vec<Range>,
    pub schedule: ScheduleType,
    /// Number of leading parameters collapsed into one parallel region
    pub collapse: usize,
    /// Vector width of the last parameter, once vectorized
    pub vector_width: Option<u32>,
    /// Original map this level was split from by expansion
    #[serde(default)]
    pub fission_group: Option<MapId>,
}

impl Map {
    pub fn new(label: impl Into<String>, params: Vec<String>, ranges: Vec<Range>) -> Self {
        Self {
            label: label.into(),
            params,
            ranges,
            schedule: ScheduleType::Default,
            collapse: 1,
            vector_width: None,
            fission_group: None,
        }
    }

    /// Range of `param`, if it belongs to this map.
    pub fn range_of(&self, param: &str) -> Option<&Range> {
        self.params.iter()
            .position(|p| p == param)
            .map(|i| &self.ranges[i])
    }
}

/// Data movement along an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memlet {
    /// Container being moved
    pub data: String,
    /// Accessed element; only edges adjacent to tasklets carry indices
    #[serde(default)]
    pub subset: Option<Vec<Affine>>,
    /// Write-conflict resolution
    #[serde(default)]
    pub wcr: Option<Reduction>,
}

impl Memlet {
    /// Memlet moving a whole container (boundary edges).
    pub fn whole(data: impl Into<String>) -> Self {
        Self { data: data.into(), subset: None, wcr: None }
    }

    /// Memlet accessing one element.
    pub fn element(data: impl Into<String>, subset: Vec<Affine>) -> Self {
        Self { data: data.into(), subset: Some(subset), wcr: None }
    }

    pub fn with_wcr(mut self, wcr: Option<Reduction>) -> Self {
        self.wcr = wcr;
        self
    }
}

/// A dataflow edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub src: NodeId,
    pub src_conn: Option<String>,
    pub dst: NodeId,
    pub dst_conn: Option<String>,
    pub memlet: Memlet,
}

/// Scalar or array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    Scalar,
    Array,
}

/// Description of a data container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDescriptor {
    pub kind: DataKind,
    /// Extent of each dimension (empty for scalars)
    pub shape: Vec<i64>,
    /// Whether the container is local to the fragment
    pub transient: bool,
    /// Reduction used to initialize and combine an accumulation buffer
    #[serde(default)]
    pub accumulate: Option<Reduction>,
}

impl DataDescriptor {
    pub fn array(shape: Vec<i64>) -> Self {
        Self { kind: DataKind::Array, shape, transient: false, accumulate: None }
    }

    pub fn scalar() -> Self {
        Self { kind: DataKind::Scalar, shape: Vec::new(), transient: false, accumulate: None }
    }

    pub fn transient(shape: Vec<i64>) -> Self {
        Self { kind: DataKind::Array, shape, transient: true, accumulate: None }
    }

    pub fn is_scalar(&self) -> bool {
        self.kind == DataKind::Scalar
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Direction of a connector path through a nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// From a map entry towards the tasklets
    Down,
    /// From a map exit towards the tasklets
    Up,
}

/// Input connector name for `data` on a map node.
pub fn in_conn(data: &str) -> String {
    format!("IN_{}", data)
}

/// Output connector name for `data` on a map node.
pub fn out_conn(data: &str) -> String {
    format!("OUT_{}", data)
}

/// A self-contained dataflow region.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    arrays: BTreeMap<String, DataDescriptor>,
    nodes: Vec<Option<Node>>,
    maps: Vec<Option<Map>>,
    edges: Vec<Edge>,
}

impl Fragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Load a fragment from its JSON form.
    pub fn from_json(json: &str) -> MapSchedResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the fragment to pretty-printed JSON.
    pub fn to_json(&self) -> MapSchedResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // ---- data containers ----

    pub fn add_array(&mut self, name: &str, desc: DataDescriptor) -> Result<(), IrError> {
        if self.arrays.contains_key(name) {
            return Err(IrError::new(IrErrorKind::DuplicateData, format!("container '{}' already exists", name)));
        }
        self.arrays.insert(name.to_string(), desc);
        Ok(())
    }

    pub fn array(&self, name: &str) -> Option<&DataDescriptor> {
        self.arrays.get(name)
    }

    pub fn arrays(&self) -> impl Iterator<Item = (&str, &DataDescriptor)> {
        self.arrays.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `base`, or `base_1`, `base_2`, ... if taken.
    pub fn unique_array_name(&self, base: &str) -> String {
        if !self.arrays.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|name| !self.arrays.contains_key(name))
            .unwrap_or_else(|| base.to_string())
    }

    // ---- nodes ----

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(Some(node));
        NodeId::new(self.nodes.len() as u64 - 1)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(|n| n.as_ref())
    }

    /// Remove a node together with its incident edges.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, IrError> {
        let slot = self.nodes.get_mut(id.0 as usize)
            .and_then(|n| n.take())
            .ok_or_else(|| IrError::new(IrErrorKind::UnknownNode, format!("node {} does not exist", id)))?;
        self.edges.retain(|e| e.src != id && e.dst != id);
        Ok(slot)
    }

    /// Live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId::new(i as u64), n)))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    // ---- maps ----

    /// Add a map with fresh entry and exit nodes.
    pub fn add_map(&mut self, map: Map) -> (MapId, NodeId, NodeId) {
        self.maps.push(Some(map));
        let id = MapId::new(self.maps.len() as u64 - 1);
        let entry = self.add_node(Node::MapEntry { map: id });
        let exit = self.add_node(Node::MapExit { map: id });
        (id, entry, exit)
    }

    pub fn map(&self, id: MapId) -> Option<&Map> {
        self.maps.get(id.0 as usize).and_then(|m| m.as_ref())
    }

    pub fn map_mut(&mut self, id: MapId) -> Option<&mut Map> {
        self.maps.get_mut(id.0 as usize).and_then(|m| m.as_mut())
    }

    /// Map by id, or an [`IrError`] naming it.
    pub fn require_map(&self, id: MapId) -> Result<&Map, IrError> {
        self.map(id).ok_or_else(|| IrError::new(IrErrorKind::UnknownMap, format!("map {} does not exist", id)))
    }

    pub fn maps(&self) -> impl Iterator<Item = (MapId, &Map)> {
        self.maps.iter().enumerate()
            .filter_map(|(i, m)| m.as_ref().map(|m| (MapId::new(i as u64), m)))
    }

    pub fn maps_mut(&mut self) -> impl Iterator<Item = (MapId, &mut Map)> {
        self.maps.iter_mut().enumerate()
            .filter_map(|(i, m)| m.as_mut().map(|m| (MapId::new(i as u64), m)))
    }

    pub fn entry_node(&self, map: MapId) -> Option<NodeId> {
        self.nodes().find(|(_, n)| matches!(n, Node::MapEntry { map: m } if *m == map)).map(|(id, _)| id)
    }

    pub fn exit_node(&self, map: MapId) -> Option<NodeId> {
        self.nodes().find(|(_, n)| matches!(n, Node::MapExit { map: m } if *m == map)).map(|(id, _)| id)
    }

    /// Entry and exit nodes of `map`.
    pub fn scope_nodes(&self, map: MapId) -> Result<(NodeId, NodeId), IrError> {
        let missing = || IrError::new(IrErrorKind::UnknownMap, format!("map {} has no entry/exit pair", map));
        let entry = self.entry_node(map).ok_or_else(missing)?;
        let exit = self.exit_node(map).ok_or_else(missing)?;
        Ok((entry, exit))
    }

    /// Every parameter of every map with its range. Parameters are unique
    /// within a valid fragment.
    pub fn param_ranges(&self) -> BTreeMap<String, Range> {
        self.maps()
            .flat_map(|(_, m)| m.params.iter().cloned().zip(m.ranges.iter().cloned()))
            .collect()
    }

    /// Whether any map already uses `param`.
    pub fn has_param(&self, param: &str) -> bool {
        self.maps().any(|(_, m)| m.params.iter().any(|p| p == param))
    }

    // ---- edges ----

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut Vec<Edge> {
        &mut self.edges
    }

    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.dst == node)
    }

    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.src == node)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Detach and return the edge `src -> dst` carrying `data`.
    pub fn take_edge(&mut self, src: NodeId, dst: NodeId, data: &str) -> Result<Edge, IrError> {
        let pos = self.edges.iter()
            .position(|e| e.src == src && e.dst == dst && e.memlet.data == data)
            .ok_or_else(|| IrError::new(
                IrErrorKind::UnknownData,
                format!("no edge {} -> {} carries '{}'", src, dst, data),
            ))?;
        Ok(self.edges.remove(pos))
    }

    /// Indices of the edges on the connector path of `data` starting at map
    /// node `start`: downward from an entry to the tasklets, or upward from
    /// an exit to the tasklets.
    pub fn path_edges(&self, start: NodeId, data: &str, flow: Flow) -> Vec<usize> {
        let (out_name, in_name) = (out_conn(data), in_conn(data));
        let mut found = Vec::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for (idx, e) in self.edges.iter().enumerate() {
                let next = match flow {
                    Flow::Down if e.src == node && e.src_conn.as_deref() == Some(out_name.as_str()) => e.dst,
                    Flow::Up if e.dst == node && e.dst_conn.as_deref() == Some(in_name.as_str()) => e.src,
                    _ => continue,
                };
                found.push(idx);
                if matches!(self.node(next), Some(Node::MapEntry { .. } | Node::MapExit { .. })) {
                    stack.push(next);
                }
            }
        }
        found
    }

    /// Rename `from` to `to` along its connector path from `start`, shifting
    /// element subsets by `-origin`.
    pub fn retarget_path(&mut self, start: NodeId, from: &str, to: &str, flow: Flow, origin: &[Affine]) -> usize {
        let path = self.path_edges(start, from, flow);
        for &idx in &path {
            let (src, dst) = (self.edges[idx].src, self.edges[idx].dst);
            let src_is_map = matches!(self.node(src), Some(Node::MapEntry { .. } | Node::MapExit { .. }));
            let dst_is_map = matches!(self.node(dst), Some(Node::MapEntry { .. } | Node::MapExit { .. }));

            let e = &mut self.edges[idx];
            if src_is_map {
                e.src_conn = Some(out_conn(to));
            }
            if dst_is_map {
                e.dst_conn = Some(in_conn(to));
            }
            e.memlet.data = to.to_string();
            if let Some(subset) = e.memlet.subset.as_mut() {
                for (index, base) in subset.iter_mut().zip(origin) {
                    *index = index.sub(base);
                }
            }
        }
        path.len()
    }

    // ---- structural editing ----

    /// Wrap a new map immediately around `inner`. Every edge entering
    /// `inner`'s entry now enters the new entry and is bridged through to
    /// the old one; exits are rewired symmetrically.
    pub fn insert_enclosing_map(&mut self, inner: MapId, map: Map) -> Result<MapId, IrError> {
        let (entry, exit) = self.scope_nodes(inner)?;
        let (outer, outer_entry, outer_exit) = self.add_map(map);

        for e in self.edges.iter_mut() {
            if e.dst == entry {
                e.dst = outer_entry;
            }
            if e.src == exit {
                e.src = outer_exit;
            }
        }

        let mut bridges = Vec::new();
        for e in self.in_edges(outer_entry) {
            if let Some(conn) = e.dst_conn.as_deref().and_then(|c| c.strip_prefix("IN_")) {
                bridges.push(Edge {
                    src: outer_entry,
                    src_conn: Some(out_conn(conn)),
                    dst: entry,
                    dst_conn: Some(in_conn(conn)),
                    memlet: Memlet::whole(e.memlet.data.clone()),
                });
            }
        }
        for e in self.out_edges(outer_exit) {
            if let Some(conn) = e.src_conn.as_deref().and_then(|c| c.strip_prefix("OUT_")) {
                bridges.push(Edge {
                    src: exit,
                    src_conn: Some(out_conn(conn)),
                    dst: outer_exit,
                    dst_conn: Some(in_conn(conn)),
                    memlet: Memlet::whole(e.memlet.data.clone()).with_wcr(e.memlet.wcr),
                });
            }
        }
        self.edges.extend(bridges);
        Ok(outer)
    }

    /// Fold `inner` into `outer`: the bridging edges disappear, `inner`'s
    /// parameters are appended to `outer`'s and `inner` is removed.
    pub fn merge_inner_map(&mut self, outer: MapId, inner: MapId) -> Result<(), IrError> {
        let (outer_entry, outer_exit) = self.scope_nodes(outer)?;
        let (inner_entry, inner_exit) = self.scope_nodes(inner)?;

        self.edges.retain(|e| {
            !(e.src == outer_entry && e.dst == inner_entry) && !(e.src == inner_exit && e.dst == outer_exit)
        });
        for e in self.edges.iter_mut() {
            if e.src == inner_entry {
                e.src = outer_entry;
            }
            if e.dst == inner_exit {
                e.dst = outer_exit;
            }
        }
        self.remove_node(inner_entry)?;
        self.remove_node(inner_exit)?;

        let inner_map = self.maps.get_mut(inner.0 as usize)
            .and_then(|m| m.take())
            .ok_or_else(|| IrError::new(IrErrorKind::UnknownMap, format!("map {} does not exist", inner)))?;
        let outer_map = self.map_mut(outer)
            .ok_or_else(|| IrError::new(IrErrorKind::UnknownMap, format!("map {} does not exist", outer)))?;
        outer_map.params.extend(inner_map.params);
        outer_map.ranges.extend(inner_map.ranges);
        Ok(())
    }

    // ---- scope analysis ----

    /// Kahn's algorithm, smallest ready id first.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, NestError> {
        let mut indegree: BTreeMap<NodeId, usize> = self.nodes().map(|(id, _)| (id, 0)).collect();
        for e in &self.edges {
            if let Some(d) = indegree.get_mut(&e.dst) {
                *d += 1;
            }
        }
        let mut ready: BTreeSet<NodeId> = indegree.iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(indegree.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for e in self.out_edges(id) {
                if let Some(d) = indegree.get_mut(&e.dst) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(e.dst);
                    }
                }
            }
        }

        if order.len() != indegree.len() {
            return Err(NestError::new(NestErrorKind::Cyclic, format!("fragment '{}' contains a cycle", self.name)));
        }
        Ok(order)
    }

    /// Innermost enclosing map entry of every node (`None` at top level).
    /// A map's own entry and exit belong to the enclosing scope.
    pub fn scope_parents(&self) -> Result<BTreeMap<NodeId, Option<NodeId>>, NestError> {
        let mut scope: BTreeMap<NodeId, Option<NodeId>> = BTreeMap::new();
        for id in self.topological_order()? {
            let parent = match self.node(id) {
                Some(Node::MapExit { map }) => self.entry_node(*map)
                    .and_then(|entry| scope.get(&entry).copied().flatten()),
                _ => match self.in_edges(id).next().map(|e| e.src) {
                    None => None,
                    Some(pred) => match self.node(pred) {
                        Some(Node::MapEntry { .. }) => Some(pred),
                        _ => scope.get(&pred).copied().flatten(),
                    },
                },
            };
            scope.insert(id, parent);
        }
        Ok(scope)
    }

    /// Map entries enclosing `node`, innermost first.
    pub fn enclosing_entries(&self, node: NodeId) -> Result<Vec<NodeId>, NestError> {
        let scope = self.scope_parents()?;
        let mut chain = Vec::new();
        let mut current = scope.get(&node).copied().flatten();
        while let Some(entry) = current {
            chain.push(entry);
            current = scope.get(&entry).copied().flatten();
        }
        Ok(chain)
    }

    /// Parameters of every map enclosing `node`.
    pub fn params_in_scope(&self, node: NodeId) -> Result<BTreeSet<String>, NestError> {
        let mut params = BTreeSet::new();
        for entry in self.enclosing_entries(node)? {
            if let Some(Node::MapEntry { map }) = self.node(entry) {
                if let Some(m) = self.map(*map) {
                    params.extend(m.params.iter().cloned());
                }
            }
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level() -> (Fragment, MapId, MapId) {
        let mut f = Fragment::new("t");
        f.add_array("A", DataDescriptor::array(vec![8])).unwrap();
        f.add_array("B", DataDescriptor::array(vec![8])).unwrap();
        let a = f.add_node(Node::Access { data: "A".into() });
        let b = f.add_node(Node::Access { data: "B".into() });
        let (m, entry, exit) = f.add_map(Map::new("m", vec!["i".into()], vec![Range::span(0, 8)]));
        let t = f.add_node(Node::Tasklet { label: "copy".into(), code: "b = a".into() });
        f.add_edge(Edge { src: a, src_conn: None, dst: entry, dst_conn: Some(in_conn("A")), memlet: Memlet::whole("A") });
        f.add_edge(Edge {
            src: entry, src_conn: Some(out_conn("A")), dst: t, dst_conn: Some("a".into()),
            memlet: Memlet::element("A", vec![Affine::param("i")]),
        });
        f.add_edge(Edge {
            src: t, src_conn: Some("b".into()), dst: exit, dst_conn: Some(in_conn("B")),
            memlet: Memlet::element("B", vec![Affine::param("i")]),
        });
        f.add_edge(Edge { src: exit, src_conn: Some(out_conn("B")), dst: b, dst_conn: None, memlet: Memlet::whole("B") });
        let outer = f.insert_enclosing_map(m, Map::new("o", vec!["j".into()], vec![Range::span(0, 2)])).unwrap();
        (f, outer, m)
    }

    #[test]
    fn test_insert_enclosing_map() {
        let (f, outer, inner) = two_level();
        let (oe, ox) = f.scope_nodes(outer).unwrap();
        let (ie, ix) = f.scope_nodes(inner).unwrap();

        assert_eq!(f.out_edges(oe).count(), 1);
        assert!(f.out_edges(oe).all(|e| e.dst == ie));
        assert!(f.in_edges(ox).all(|e| e.src == ix));
        assert_eq!(f.edge_count(), 6);

        let scope = f.scope_parents().unwrap();
        assert_eq!(scope[&oe], None);
        assert_eq!(scope[&ie], Some(oe));
        assert_eq!(scope[&ix], Some(oe));
        assert_eq!(scope[&ox], None);
    }

    #[test]
    fn test_merge_inner_map() {
        let (mut f, outer, inner) = two_level();
        f.merge_inner_map(outer, inner).unwrap();
        assert!(f.map(inner).is_none());
        assert_eq!(f.map(outer).unwrap().params, vec!["j".to_string(), "i".to_string()]);
        assert_eq!(f.edge_count(), 4);
        assert_eq!(f.node_count(), 5);
    }

    #[test]
    fn test_retarget_path() {
        let (mut f, outer, inner) = two_level();
        let (oe, _) = f.scope_nodes(outer).unwrap();
        let (ie, ix) = f.scope_nodes(inner).unwrap();

        assert_eq!(f.path_edges(oe, "A", Flow::Down).len(), 2);
        assert_eq!(f.path_edges(ix, "B", Flow::Up).len(), 1);

        let touched = f.retarget_path(ie, "A", "T", Flow::Down, &[Affine::param("j")]);
        assert_eq!(touched, 1);
        let edge = f.out_edges(ie).next().unwrap();
        assert_eq!(edge.src_conn.as_deref(), Some("OUT_T"));
        assert_eq!(edge.dst_conn.as_deref(), Some("a"));
        assert_eq!(edge.memlet.subset, Some(vec!["i - j".parse().unwrap()]));
    }

    #[test]
    fn test_take_edge() {
        let (mut f, outer, inner) = two_level();
        let (oe, _) = f.scope_nodes(outer).unwrap();
        let (ie, _) = f.scope_nodes(inner).unwrap();
        let edge = f.take_edge(oe, ie, "A").unwrap();
        assert_eq!(edge.src_conn.as_deref(), Some("OUT_A"));
        assert!(f.take_edge(oe, ie, "A").is_err());
    }

    #[test]
    fn test_params_in_scope() {
        let (f, _, _) = two_level();
        let tasklet = f.nodes()
            .find(|(_, n)| matches!(n, Node::Tasklet { .. }))
            .map(|(id, _)| id)
            .unwrap();
        let params = f.params_in_scope(tasklet).unwrap();
        assert!(params.contains("i") && params.contains("j"));
    }

    #[test]
    fn test_unique_array_name() {
        let (mut f, _, _) = two_level();
        assert_eq!(f.unique_array_name("trans_A"), "trans_A");
        f.add_array("trans_A", DataDescriptor::transient(vec![1])).unwrap();
        assert_eq!(f.unique_array_name("trans_A"), "trans_A_1");
        assert!(f.add_array("A", DataDescriptor::scalar()).is_err());
    }

    #[test]
    fn test_json_roundtrip_preserves_tombstones() {
        let (mut f, outer, inner) = two_level();
        f.merge_inner_map(outer, inner).unwrap();
        let json = f.to_json().unwrap();
        let back = Fragment::from_json(&json).unwrap();
        assert_eq!(back, f);
    }
}
