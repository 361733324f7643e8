//! Error types for the map-schedule enumerator.
//!
//! This module defines all error types used throughout the crate,
//! organized by the phase that produces them.

use thiserror::Error;
use crate::ir::{MapId, NodeId};
use std::fmt;

/// Top-level error type for the enumerator.
#[derive(Error, Debug)]
pub enum MapSchedError {
    /// Error while building or editing a fragment
    #[error("IR error: {0}")]
    Ir(#[from] IrError),

    /// Error while extracting the map nest
    #[error("Nest extraction error: {0}")]
    Nest(#[from] NestError),

    /// Error while applying a rewrite
    #[error("Transformation error: {0}")]
    Transform(#[from] TransformError),

    /// Structural validation failed
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid enumerator configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error while constructing or editing a fragment.
#[derive(Error, Debug, Clone)]
pub struct IrError {
    /// The error message
    pub message: String,
    /// The kind of IR error
    pub kind: IrErrorKind,
}

impl IrError {
    pub fn new(kind: IrErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrErrorKind {
    /// Referenced node does not exist
    UnknownNode,
    /// Referenced map does not exist
    UnknownMap,
    /// Referenced data container does not exist
    UnknownData,
    /// A container with this name already exists
    DuplicateData,
    /// Builder was given an inconsistent kernel description
    InvalidKernel,
}

/// Error while extracting the map nest of a fragment.
#[derive(Error, Debug, Clone)]
pub struct NestError {
    /// The error message
    pub message: String,
    /// The kind of nest error
    pub kind: NestErrorKind,
}

impl NestError {
    pub fn new(kind: NestErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for NestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestErrorKind {
    /// No map entry without a parent scope
    NoRoot,
    /// A map entry without a matching exit node
    MissingExit,
    /// Two maps share the same parent
    Branching,
    /// Scope analysis failed (cycle in the graph)
    Cyclic,
}

/// Error during a rewrite.
#[derive(Error, Debug, Clone)]
pub struct TransformError {
    /// The error message
    pub message: String,
    /// The kind of transformation error
    pub kind: TransformErrorKind,
    /// The transformation that failed
    pub transform: String,
}

impl TransformError {
    pub fn new(kind: TransformErrorKind, transform: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            transform: transform.to_string(),
        }
    }

    /// Shorthand for a rewrite whose legality check failed.
    pub fn not_applicable(transform: &str, message: impl Into<String>) -> Self {
        Self::new(TransformErrorKind::NotApplicable, transform, message)
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.transform)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// Legality check failed
    NotApplicable,
    /// Parameters of the rewrite do not match the target map
    ContractViolation,
    /// The nest could not be extracted while applying a rewrite family
    NestUnavailable,
    /// Graph editing primitive failed
    Ir,
}

impl From<IrError> for TransformError {
    fn from(err: IrError) -> Self {
        Self::new(TransformErrorKind::Ir, "graph edit", err.message)
    }
}

impl From<NestError> for TransformError {
    fn from(err: NestError) -> Self {
        Self::new(TransformErrorKind::NestUnavailable, "nest extraction", err.message)
    }
}

/// Structural validation failure.
#[derive(Error, Debug, Clone)]
pub struct ValidationError {
    /// The error message
    pub message: String,
    /// The kind of validation failure
    pub kind: ValidationErrorKind,
    /// Offending node, if any
    pub node: Option<NodeId>,
    /// Offending map, if any
    pub map: Option<MapId>,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            node: None,
            map: None,
        }
    }

    pub fn at_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn at_map(mut self, map: MapId) -> Self {
        self.map = Some(map);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(node) = self.node {
            write!(f, " (at {})", node)?;
        }
        if let Some(map) = self.map {
            write!(f, " (map {})", map)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Edge endpoint does not exist
    DanglingEdge,
    /// Memlet or access node references an undeclared container
    UndefinedData,
    /// Map entry and exit nodes are not paired
    UnpairedScope,
    /// Map parameter declared twice
    DuplicateParam,
    /// Range or index references a parameter that is not in scope
    UnboundParam,
    /// Range is empty or has a non-positive stride
    InvalidRange,
    /// Collapse degree out of bounds
    InvalidCollapse,
    /// Vector width inconsistent with the map's range
    InvalidVectorWidth,
    /// Map connector without a counterpart
    UnmatchedConnector,
    /// The graph contains a cycle
    Cycle,
    /// Index rank does not match the container's rank
    RankMismatch,
    /// Transient read without ever being written
    UninitializedTransient,
}

/// Result type using MapSchedError.
pub type MapSchedResult<T> = Result<T, MapSchedError>;

/// Result type for rewrites.
pub type TransformResult<T> = Result<T, TransformError>;
