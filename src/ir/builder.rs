//! Builder for perfectly nested map kernels.
//!
//! ```ignore
//! let f = NestBuilder::new("scale")
//!     .array("A", vec![64])
//!     .array("B", vec![64])
//!     .level(&[("i", Range::span(0, 64))])
//!     .read("A", "a", "i")
//!     .write("B", "b", "i", None)
//!     .tasklet("mul", "b = 2 * a")
//!     .build()?;
//! ```

use super::expr::{Affine, Range};
use super::fragment::{in_conn, out_conn, DataDescriptor, Edge, Fragment, Map, Memlet, Node, NodeId, Reduction};
use crate::utils::errors::{IrError, IrErrorKind};
use std::collections::BTreeMap;

/// One tasklet access: container, tasklet connector and element indices.
#[derive(Debug, Clone)]
struct Access {
    data: String,
    conn: String,
    subset: Vec<Affine>,
    wcr: Option<Reduction>,
}

/// Builds a fragment holding one chain of maps around a single tasklet.
#[derive(Debug, Clone, Default)]
pub struct NestBuilder {
    name: String,
    arrays: Vec<(String, DataDescriptor)>,
    levels: Vec<Vec<(String, Range)>>,
    reads: Vec<Access>,
    writes: Vec<Access>,
    tasklet: Option<(String, String)>,
    errors: Vec<String>,
}

impl NestBuilder {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    /// Declare an array container.
    pub fn array(mut self, name: &str, shape: Vec<i64>) -> Self {
        self.arrays.push((name.to_string(), DataDescriptor::array(shape)));
        self
    }

    /// Declare a scalar container.
    pub fn scalar(mut self, name: &str) -> Self {
        self.arrays.push((name.to_string(), DataDescriptor::scalar()));
        self
    }

    /// Append a map level inside the previous one.
    pub fn level(mut self, params: &[(&str, Range)]) -> Self {
        self.levels.push(params.iter().map(|(p, r)| (p.to_string(), r.clone())).collect());
        self
    }

    /// Tasklet input. `indices` is a comma-separated list of affine
    /// expressions; empty for scalars.
    pub fn read(mut self, data: &str, conn: &str, indices: &str) -> Self {
        match parse_indices(indices) {
            Ok(subset) => self.reads.push(Access { data: data.into(), conn: conn.into(), subset, wcr: None }),
            Err(e) => self.errors.push(e.message),
        }
        self
    }

    /// Tasklet output, optionally accumulated with `wcr`.
    pub fn write(mut self, data: &str, conn: &str, indices: &str, wcr: Option<Reduction>) -> Self {
        match parse_indices(indices) {
            Ok(subset) => self.writes.push(Access { data: data.into(), conn: conn.into(), subset, wcr }),
            Err(e) => self.errors.push(e.message),
        }
        self
    }

    pub fn tasklet(mut self, label: &str, code: &str) -> Self {
        self.tasklet = Some((label.to_string(), code.to_string()));
        self
    }

    pub fn build(self) -> Result<Fragment, IrError> {
        let invalid = |msg: String| IrError::new(IrErrorKind::InvalidKernel, msg);
        if let Some(msg) = self.errors.first() {
            return Err(invalid(msg.clone()));
        }
        if self.levels.is_empty() {
            return Err(invalid(format!("kernel '{}' has no map level", self.name)));
        }
        if self.reads.is_empty() || self.writes.is_empty() {
            return Err(invalid(format!("kernel '{}' needs at least one input and one output", self.name)));
        }
        let (label, code) = self.tasklet
            .ok_or_else(|| invalid(format!("kernel '{}' has no tasklet", self.name)))?;

        let mut f = Fragment::new(self.name.clone());
        for (name, desc) in self.arrays {
            f.add_array(&name, desc)?;
        }
        for access in self.reads.iter().chain(&self.writes) {
            if f.array(&access.data).is_none() {
                return Err(IrError::new(IrErrorKind::UnknownData, format!("container '{}' is not declared", access.data)));
            }
        }

        // Containers in first-use order, one path per container.
        let mut inputs: Vec<&str> = Vec::new();
        for r in &self.reads {
            if !inputs.contains(&r.data.as_str()) {
                inputs.push(&r.data);
            }
        }
        let mut outputs: BTreeMap<&str, Option<Reduction>> = BTreeMap::new();
        for w in &self.writes {
            outputs.entry(&w.data).or_insert(w.wcr);
        }

        let sources: Vec<NodeId> = inputs.iter()
            .map(|d| f.add_node(Node::Access { data: d.to_string() }))
            .collect();

        let mut scopes = Vec::with_capacity(self.levels.len());
        for (depth, level) in self.levels.iter().enumerate() {
            let (params, ranges) = level.iter().cloned().unzip();
            let (_, entry, exit) = f.add_map(Map::new(format!("{}_{}", self.name, depth), params, ranges));
            scopes.push((entry, exit));
        }
        let tasklet = f.add_node(Node::Tasklet { label, code });
        let sinks: Vec<NodeId> = outputs.keys()
            .map(|d| f.add_node(Node::Access { data: d.to_string() }))
            .collect();

        // Inputs: access -> entry_0 -> ... -> entry_n -> tasklet
        for (data, &source) in inputs.iter().zip(&sources) {
            let mut prev = (source, None);
            for &(entry, _) in &scopes {
                f.add_edge(Edge {
                    src: prev.0, src_conn: prev.1, dst: entry, dst_conn: Some(in_conn(data)),
                    memlet: Memlet::whole(*data),
                });
                prev = (entry, Some(out_conn(data)));
            }
            for r in self.reads.iter().filter(|r| r.data == *data) {
                f.add_edge(Edge {
                    src: prev.0, src_conn: prev.1.clone(), dst: tasklet, dst_conn: Some(r.conn.clone()),
                    memlet: Memlet::element(data.to_string(), r.subset.clone()),
                });
            }
        }

        // Outputs: tasklet -> exit_n -> ... -> exit_0 -> access
        for ((data, wcr), &sink) in outputs.iter().zip(&sinks) {
            let innermost = scopes[scopes.len() - 1].1;
            for w in self.writes.iter().filter(|w| w.data == *data) {
                f.add_edge(Edge {
                    src: tasklet, src_conn: Some(w.conn.clone()), dst: innermost, dst_conn: Some(in_conn(data)),
                    memlet: Memlet::element(data.to_string(), w.subset.clone()).with_wcr(w.wcr),
                });
            }
            let exits: Vec<NodeId> = scopes.iter().rev().map(|&(_, exit)| exit).collect();
            for pair in exits.windows(2) {
                f.add_edge(Edge {
                    src: pair[0], src_conn: Some(out_conn(data)), dst: pair[1], dst_conn: Some(in_conn(data)),
                    memlet: Memlet::whole(*data).with_wcr(*wcr),
                });
            }
            f.add_edge(Edge {
                src: scopes[0].1, src_conn: Some(out_conn(data)), dst: sink, dst_conn: None,
                memlet: Memlet::whole(*data).with_wcr(*wcr),
            });
        }

        Ok(f)
    }
}

fn parse_indices(indices: &str) -> Result<Vec<Affine>, IrError> {
    if indices.trim().is_empty() {
        return Ok(Vec::new());
    }
    indices.split(',').map(|s| s.parse()).collect()
}
