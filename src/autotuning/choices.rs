//! Rewrite choices, one type per search dimension.
//!
//! The `Display` forms are joined with `#` into a candidate description.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter order of every level, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permutation(pub Vec<Vec<String>>);

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for level in &self.0 {
            write!(f, "[{}]", level.join(","))?;
        }
        Ok(())
    }
}

/// Tile size per parameter name; absent parameters are untiled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tiling(pub BTreeMap<String, i64>);

impl Tiling {
    pub fn size_of(&self, param: &str) -> i64 {
        self.0.get(param).copied().unwrap_or(1)
    }

    /// True when no parameter is actually tiled.
    pub fn is_trivial(&self) -> bool {
        self.0.values().all(|&s| s == 1)
    }
}

impl fmt::Display for Tiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(p, s)| format!("{}:{}", p, s)).collect();
        write!(f, "{{{}}}", parts.join(","))
    }
}

/// Staging flags per container; flag `i` stages between levels `i` and `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalStorage {
    pub inputs: BTreeMap<String, Vec<bool>>,
    pub outputs: BTreeMap<String, Vec<bool>>,
}

impl LocalStorage {
    /// True when no staging buffer is requested.
    pub fn is_empty(&self) -> bool {
        self.inputs.values().chain(self.outputs.values()).flatten().all(|&f| !f)
    }
}

fn write_flags(f: &mut fmt::Formatter<'_>, flags: &BTreeMap<String, Vec<bool>>) -> fmt::Result {
    let parts: Vec<String> = flags
        .iter()
        .map(|(array, bits)| {
            let bits: String = bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
            format!("{}:{}", array, bits)
        })
        .collect();
    write!(f, "{{{}}}", parts.join(","))
}

impl fmt::Display for LocalStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in")?;
        write_flags(f, &self.inputs)?;
        write!(f, "out")?;
        write_flags(f, &self.outputs)
    }
}

/// Strategy per level: 0 runs sequentially, `k` runs multicore with collapse `k`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parallelization(pub Vec<usize>);

impl fmt::Display for Parallelization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", parts.join(","))
    }
}
