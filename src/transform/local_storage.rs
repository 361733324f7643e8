//! Local storage: staging buffers between two nested maps.
//!
//! For an input, the container is copied into a transient once per outer
//! iteration and the inner scope reads the transient:
//! ```text
//! A -> [outer] --A--> [inner] -> A[i, k]
//! A -> [outer] --A--> (trans_A) --trans_A--> [inner] -> trans_A[i - tile_i, k]
//! ```
//! Outputs are staged symmetrically at the exits. A written output with
//! write-conflict resolution cannot be staged by a plain copy; it gets an
//! accumulation buffer instead, initialized to the reduction identity and
//! combined into the container with the same reduction.
//!
//! The buffer shape is the footprint of all accesses inside the inner scope
//! with the outer parameters held fixed; indices are rebased to its origin.

use crate::ir::{
    index_footprint, Affine, DataDescriptor, Edge, Flow, Fragment, MapId, Memlet, Node, NodeId, Reduction,
    in_conn, out_conn,
};
use crate::transform::Transform;
use crate::utils::errors::{TransformError, TransformResult};
use std::collections::BTreeSet;

/// Rectangular region covered by a set of accesses.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Window {
    origin: Vec<Affine>,
    shape: Vec<i64>,
}

/// Union of the footprints of `subsets`, if it is a box with a constant
/// extent in every dimension.
fn window(fragment: &Fragment, subsets: &[Vec<Affine>], fixed: &BTreeSet<String>) -> Option<Window> {
    let ranges = fragment.param_ranges();
    let rank = subsets.first()?.len();
    let mut origin = Vec::with_capacity(rank);
    let mut shape = Vec::with_capacity(rank);

    for d in 0..rank {
        let footprints = subsets.iter()
            .map(|s| index_footprint(s.get(d)?, fixed, &ranges))
            .collect::<Option<Vec<_>>>()?;
        let reference = footprints[0].base.clone();
        let (mut lo, mut hi) = (i64::MAX, i64::MIN);
        for fp in &footprints {
            let shift = fp.base.sub(&reference).as_constant()?;
            lo = lo.min(shift);
            hi = hi.max(shift + fp.width);
        }
        origin.push(reference.offset(lo));
        shape.push(hi - lo + 1);
    }
    Some(Window { origin, shape })
}

/// Which side of the inner scope a buffer sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Input,
    Output,
}

/// Shared legality and editing logic of the three staging rewrites.
struct Staging<'a> {
    name: &'a str,
    outer: MapId,
    inner: MapId,
    array: &'a str,
    side: Side,
}

impl Staging<'_> {
    fn not_applicable(&self, message: String) -> TransformError {
        TransformError::not_applicable(self.name, message)
    }

    /// The scope nodes the buffer goes between: (upstream, downstream).
    fn endpoints(&self, fragment: &Fragment) -> TransformResult<(NodeId, NodeId)> {
        let (outer_entry, outer_exit) = fragment.scope_nodes(self.outer)?;
        let (inner_entry, inner_exit) = fragment.scope_nodes(self.inner)?;
        Ok(match self.side {
            Side::Input => (outer_entry, inner_entry),
            Side::Output => (inner_exit, outer_exit),
        })
    }

    /// The inner scope node the connector path of the array starts from.
    fn path_start(&self, endpoints: (NodeId, NodeId)) -> NodeId {
        match self.side {
            Side::Input => endpoints.1,
            Side::Output => endpoints.0,
        }
    }

    fn flow(&self) -> Flow {
        match self.side {
            Side::Input => Flow::Down,
            Side::Output => Flow::Up,
        }
    }

    /// Check the common preconditions and compute the buffer window.
    fn plan(&self, fragment: &Fragment) -> TransformResult<Window> {
        match fragment.array(self.array) {
            None => return Err(self.not_applicable(format!("unknown container '{}'", self.array))),
            Some(desc) if desc.is_scalar() => {
                return Err(self.not_applicable(format!("'{}' is a scalar", self.array)));
            }
            Some(_) => {}
        }

        let (src, dst) = self.endpoints(fragment)?;
        let direct = fragment.out_edges(src).any(|e| {
            e.dst == dst
                && e.memlet.data == self.array
                && e.src_conn.as_deref() == Some(out_conn(self.array).as_str())
        });
        if !direct {
            return Err(self.not_applicable(format!(
                "'{}' does not flow directly between {} and {}",
                self.array, self.outer, self.inner
            )));
        }

        let start = self.path_start((src, dst));
        let subsets: Vec<Vec<Affine>> = fragment.path_edges(start, self.array, self.flow())
            .into_iter()
            .filter_map(|idx| fragment.edges()[idx].memlet.subset.clone())
            .collect();
        let fixed = fragment.params_in_scope(start)?;
        window(fragment, &subsets, &fixed).ok_or_else(|| {
            self.not_applicable(format!("accesses to '{}' do not span a rectangular window", self.array))
        })
    }

    /// Write-conflict resolution used anywhere on the array's path below the
    /// outer scope.
    fn reduction(&self, fragment: &Fragment) -> TransformResult<Option<Reduction>> {
        let (src, dst) = self.endpoints(fragment)?;
        let start = self.path_start((src, dst));
        let bridge = fragment.out_edges(src)
            .filter(|e| e.dst == dst && e.memlet.data == self.array)
            .map(|e| e.memlet.wcr);
        let path = fragment.path_edges(start, self.array, self.flow())
            .into_iter()
            .map(|idx| fragment.edges()[idx].memlet.wcr);
        Ok(bridge.chain(path).flatten().next())
    }

    /// Insert the buffer and retarget the inner scope to it.
    fn insert(&self, fragment: &mut Fragment, window: Window, accumulate: Option<Reduction>) -> TransformResult<String> {
        let (src, dst) = self.endpoints(fragment)?;
        let start = self.path_start((src, dst));

        let buffer = fragment.unique_array_name(&format!("trans_{}", self.array));
        let mut desc = DataDescriptor::transient(window.shape);
        desc.accumulate = accumulate;
        fragment.add_array(&buffer, desc)?;

        let bridge = fragment.take_edge(src, dst, self.array)?;
        let access = fragment.add_node(Node::Access { data: buffer.clone() });
        match self.side {
            Side::Input => {
                fragment.add_edge(Edge { dst: access, dst_conn: None, ..bridge });
                fragment.add_edge(Edge {
                    src: access, src_conn: None, dst, dst_conn: Some(in_conn(&buffer)),
                    memlet: Memlet::whole(buffer.clone()),
                });
            }
            Side::Output => {
                fragment.add_edge(Edge {
                    src, src_conn: Some(out_conn(&buffer)), dst: access, dst_conn: None,
                    memlet: Memlet::whole(buffer.clone()).with_wcr(accumulate),
                });
                fragment.add_edge(Edge { src: access, src_conn: None, ..bridge });
            }
        }

        fragment.retarget_path(start, self.array, &buffer, self.flow(), &window.origin);
        log::trace!("{}: staged '{}' in '{}' between {} and {}", self.name, self.array, buffer, self.outer, self.inner);
        Ok(buffer)
    }
}

/// Stage an input container between two nested map entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InLocalStorage {
    pub outer: MapId,
    pub inner: MapId,
    pub array: String,
}

impl InLocalStorage {
    pub fn new(outer: MapId, inner: MapId, array: &str) -> Self {
        Self { outer, inner, array: array.to_string() }
    }

    fn staging(&self) -> Staging<'_> {
        Staging { name: self.name(), outer: self.outer, inner: self.inner, array: &self.array, side: Side::Input }
    }
}

impl Transform for InLocalStorage {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        self.staging().plan(fragment).map(|_| ())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        let staging = self.staging();
        let window = staging.plan(fragment)?;
        staging.insert(fragment, window, None)?;
        Ok(vec![self.outer, self.inner])
    }

    fn name(&self) -> &str {
        "InLocalStorage"
    }
}

/// Stage an output container between two nested map exits. Only applies to
/// outputs written without write-conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutLocalStorage {
    pub outer: MapId,
    pub inner: MapId,
    pub array: String,
}

impl OutLocalStorage {
    pub fn new(outer: MapId, inner: MapId, array: &str) -> Self {
        Self { outer, inner, array: array.to_string() }
    }

    fn staging(&self) -> Staging<'_> {
        Staging { name: self.name(), outer: self.outer, inner: self.inner, array: &self.array, side: Side::Output }
    }
}

impl Transform for OutLocalStorage {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        let staging = self.staging();
        staging.plan(fragment)?;
        if let Some(wcr) = staging.reduction(fragment)? {
            return Err(staging.not_applicable(format!("'{}' is written with {} resolution", self.array, wcr)));
        }
        Ok(())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        self.check(fragment)?;
        let staging = self.staging();
        let window = staging.plan(fragment)?;
        staging.insert(fragment, window, None)?;
        Ok(vec![self.outer, self.inner])
    }

    fn name(&self) -> &str {
        "OutLocalStorage"
    }
}

/// Accumulate a reduced output in a buffer between two nested map exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulateTransient {
    pub outer: MapId,
    pub inner: MapId,
    pub array: String,
}

impl AccumulateTransient {
    pub fn new(outer: MapId, inner: MapId, array: &str) -> Self {
        Self { outer, inner, array: array.to_string() }
    }

    fn staging(&self) -> Staging<'_> {
        Staging { name: self.name(), outer: self.outer, inner: self.inner, array: &self.array, side: Side::Output }
    }
}

impl Transform for AccumulateTransient {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        let staging = self.staging();
        staging.plan(fragment)?;
        if staging.reduction(fragment)?.is_none() {
            return Err(staging.not_applicable(format!("'{}' is written without resolution", self.array)));
        }
        Ok(())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        let staging = self.staging();
        let window = staging.plan(fragment)?;
        let wcr = staging.reduction(fragment)?
            .ok_or_else(|| staging.not_applicable(format!("'{}' is written without resolution", self.array)))?;
        staging.insert(fragment, window, Some(wcr))?;
        Ok(vec![self.outer, self.inner])
    }

    fn name(&self) -> &str {
        "AccumulateTransient"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract_nest;
    use crate::ir::kernels;
    use crate::transform::{MapExpansion, MapTiling};

    fn expanded_matmul(n: i64) -> (Fragment, Vec<MapId>) {
        let mut f = kernels::matmul(n).unwrap();
        let outer = extract_nest(&f).unwrap().outermost().map;
        MapExpansion::new(outer).apply(&mut f).unwrap();
        let maps = extract_nest(&f).unwrap().maps();
        (f, maps)
    }

    fn buffer_shape(f: &Fragment, name: &str) -> Vec<i64> {
        f.array(name).unwrap().shape.clone()
    }

    #[test]
    fn test_in_local_storage_rebases_indices() {
        let (mut f, maps) = expanded_matmul(16);
        // A[i, k] with i fixed: one row of A.
        InLocalStorage::new(maps[0], maps[1], "A").apply(&mut f).unwrap();
        assert_eq!(buffer_shape(&f, "trans_A"), vec![1, 16]);

        let read = f.edges().iter()
            .find(|e| e.memlet.data == "trans_A" && e.memlet.subset.is_some())
            .unwrap();
        assert_eq!(read.memlet.subset, Some(vec![Affine::constant(0), Affine::param("k")]));
        assert_eq!(read.dst_conn.as_deref(), Some("a"));
        f.validate().unwrap();

        // The nest is unchanged but the levels no longer touch directly.
        assert_eq!(extract_nest(&f).unwrap().depth(), 3);
    }

    #[test]
    fn test_in_local_storage_over_tiles() {
        let mut f = kernels::scale(64).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        let maps = MapTiling::new(map, vec![8]).apply(&mut f).unwrap();

        InLocalStorage::new(maps[0], maps[1], "A").apply(&mut f).unwrap();
        assert_eq!(buffer_shape(&f, "trans_A"), vec![8]);
        let read = f.edges().iter()
            .find(|e| e.memlet.data == "trans_A" && e.memlet.subset.is_some())
            .unwrap();
        assert_eq!(read.memlet.subset, Some(vec!["i - tile_i".parse().unwrap()]));
        f.validate().unwrap();
    }

    #[test]
    fn test_stencil_window_covers_halo() {
        let mut f = kernels::stencil(10).unwrap();
        let outer = extract_nest(&f).unwrap().outermost().map;
        let maps = MapExpansion::new(outer).apply(&mut f).unwrap();

        InLocalStorage::new(maps[0], maps[1], "A").apply(&mut f).unwrap();
        // j in 1..9 reads j - 1 ..= j + 1: columns 0..=9.
        assert_eq!(buffer_shape(&f, "trans_A"), vec![1, 10]);
        f.validate().unwrap();
    }

    #[test]
    fn test_out_local_storage_requires_plain_writes() {
        let (f, maps) = expanded_matmul(8);
        let out = OutLocalStorage::new(maps[1], maps[2], "C");
        let err = out.check(&f).unwrap_err();
        assert!(err.message.contains("sum"));

        let acc = AccumulateTransient::new(maps[1], maps[2], "C");
        assert!(acc.can_apply(&f));
    }

    #[test]
    fn test_accumulate_transient() {
        let (mut f, maps) = expanded_matmul(8);
        AccumulateTransient::new(maps[1], maps[2], "C").apply(&mut f).unwrap();

        let desc = f.array("trans_C").unwrap();
        assert!(desc.transient);
        assert_eq!(desc.accumulate, Some(Reduction::Sum));
        assert_eq!(desc.shape, vec![1, 1]);

        let (_, outer_exit) = f.scope_nodes(maps[1]).unwrap();
        let into_c = f.in_edges(outer_exit).next().unwrap();
        assert_eq!(into_c.memlet.data, "C");
        assert_eq!(into_c.memlet.wcr, Some(Reduction::Sum));
        f.validate().unwrap();
    }

    #[test]
    fn test_out_local_storage() {
        let mut f = kernels::scale(32).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        let maps = MapTiling::new(map, vec![4]).apply(&mut f).unwrap();

        assert!(!AccumulateTransient::new(maps[0], maps[1], "B").can_apply(&f));
        OutLocalStorage::new(maps[0], maps[1], "B").apply(&mut f).unwrap();
        assert_eq!(buffer_shape(&f, "trans_B"), vec![4]);
        f.validate().unwrap();
    }

    #[test]
    fn test_staging_twice_is_not_applicable() {
        let (mut f, maps) = expanded_matmul(8);
        InLocalStorage::new(maps[0], maps[1], "B").apply(&mut f).unwrap();
        // The path of B now enters the inner level through the buffer.
        assert!(!InLocalStorage::new(maps[0], maps[1], "B").can_apply(&f));
        // Another array at the same point still works.
        InLocalStorage::new(maps[0], maps[1], "A").apply(&mut f).unwrap();
        f.validate().unwrap();
    }

    #[test]
    fn test_scalar_is_rejected() {
        let mut f = kernels::scale(32).unwrap();
        let map = extract_nest(&f).unwrap().outermost().map;
        let maps = MapTiling::new(map, vec![4]).apply(&mut f).unwrap();
        let err = InLocalStorage::new(maps[0], maps[1], "alpha").check(&f).unwrap_err();
        assert!(err.message.contains("scalar"));
    }
}
