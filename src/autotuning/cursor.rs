//! Search coordinates and the per-dimension cursor state.

use crate::ir::Fragment;
use crate::utils::errors::MapSchedError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five search dimensions, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Permutation,
    Tiling,
    LocalStorage,
    Parallelization,
    Vectorization,
}

impl Dimension {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Absolute index of the chosen element in each dimension's list.
///
/// Coordinates order lexicographically, which is the order the enumerator
/// visits them in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate(pub [usize; 5]);

impl Coordinate {
    pub const ZERO: Coordinate = Coordinate([0; 5]);

    pub fn new(permutation: usize, tiling: usize, local_storage: usize, parallelization: usize, width: usize) -> Self {
        Self([permutation, tiling, local_storage, parallelization, width])
    }

    pub fn get(&self, dim: Dimension) -> usize {
        self.0[dim.index()]
    }

    /// The coordinate directly after this one in the innermost dimension.
    ///
    /// The result may point past the end of the width list; resuming from it
    /// carries into the next parallelization.
    pub fn successor(&self) -> Self {
        let mut next = *self;
        next.0[4] += 1;
        next
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e] = self.0;
        write!(f, "{},{},{},{},{}", a, b, c, d, e)
    }
}

impl FromStr for Coordinate {
    type Err = MapSchedError;

    /// Parse `"0,1,0,2,1"`; surrounding brackets and spaces are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MapSchedError::InvalidConfig(format!("invalid coordinate '{}'", s));
        let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
        let values = inner
            .split(',')
            .map(|part| part.trim().parse::<usize>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let values: [usize; 5] = values.try_into().map_err(|_| invalid())?;
        Ok(Coordinate(values))
    }
}

/// Cursor over one dimension's choice list.
///
/// `fragment` holds the result of applying the current choice, shared by the
/// whole subtree below it.
#[derive(Debug, Clone)]
pub(crate) struct Level<T> {
    pub choices: Vec<T>,
    pub index: usize,
    pub fragment: Option<Fragment>,
}

impl<T> Level<T> {
    pub fn new() -> Self {
        Self { choices: Vec::new(), index: 0, fragment: None }
    }

    /// Install a fresh list, starting at `start`.
    pub fn reset(&mut self, choices: Vec<T>, start: usize) {
        self.choices = choices;
        self.index = start;
        self.fragment = None;
    }

    pub fn current(&self) -> Option<&T> {
        self.choices.get(self.index)
    }

    pub fn exhausted(&self) -> bool {
        self.index >= self.choices.len()
    }

    pub fn advance(&mut self) {
        self.index += 1;
        self.fragment = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_parse_display() {
        let c: Coordinate = "0,1,0,2,1".parse().unwrap();
        assert_eq!(c, Coordinate::new(0, 1, 0, 2, 1));
        assert_eq!(c.to_string(), "0,1,0,2,1");
        assert_eq!("[3, 0, 0, 0, 4]".parse::<Coordinate>().unwrap(), Coordinate::new(3, 0, 0, 0, 4));

        assert!("1,2,3".parse::<Coordinate>().is_err());
        assert!("a,0,0,0,0".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_coordinate_order() {
        let a = Coordinate::new(0, 2, 9, 9, 9);
        let b = Coordinate::new(1, 0, 0, 0, 0);
        assert!(a < b);
        assert!(a < a.successor());
        assert_eq!(a.get(Dimension::Tiling), 2);
    }

    #[test]
    fn test_level_cursor() {
        let mut level: Level<u32> = Level::new();
        assert!(level.exhausted());
        level.reset(vec![1, 2, 4], 1);
        assert_eq!(level.current(), Some(&2));
        level.advance();
        level.advance();
        assert!(level.exhausted());
    }

    #[test]
    fn test_coordinate_json() {
        let c = Coordinate::new(1, 0, 3, 0, 2);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "[1,0,3,0,2]");
        assert_eq!(serde_json::from_str::<Coordinate>(&json).unwrap(), c);
    }
}
