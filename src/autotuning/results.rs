//! Enumeration results and checkpoints

use super::cursor::Coordinate;
use super::search::SearchStats;
use crate::ir::Fragment;
use crate::utils::errors::MapSchedResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A rewritten fragment that passed validation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// The rewritten fragment
    pub fragment: Fragment,
    /// Position in the search space
    pub coordinate: Coordinate,
    /// `perm#tiling#local_storage#parallelization#width`
    pub description: String,
}

impl Candidate {
    /// File name for writing this candidate, unique per coordinate.
    ///
    /// Characters of the fragment name other than ASCII letters, digits,
    /// `-` and `_` become `_`, so the name never leaves its directory.
    pub fn file_name(&self) -> String {
        let stem: String = self.fragment.name
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        let c = self.coordinate.0;
        format!("{}_{}_{}_{}_{}_{}.json", stem, c[0], c[1], c[2], c[3], c[4])
    }
}

/// Persisted search progress
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last yielded coordinate
    pub coordinate: Coordinate,
    /// Counters at that point
    pub stats: SearchStats,
}

impl Checkpoint {
    /// Write as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> MapSchedResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read a checkpoint written by [`Checkpoint::save`]
    pub fn load(path: impl AsRef<Path>) -> MapSchedResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
