//! The map-schedule enumerator.
//!
//! A depth-first walk over five nested choice lists. Each level keeps the
//! fragment produced by its current choice, so a subtree clones from its
//! parent instead of replaying the whole chain. The cursor advances like an
//! odometer: the innermost index moves first and exhausted levels carry into
//! their parent.

use super::apply;
use super::choices::{LocalStorage, Parallelization, Permutation, Tiling};
use super::config::EnumeratorConfig;
use super::cursor::{Coordinate, Dimension, Level};
use super::results::{Candidate, Checkpoint};
use super::space;
use crate::analysis::extract_nest;
use crate::ir::Fragment;
use crate::utils::errors::MapSchedResult;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a combination was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Permutation,
    Tiling,
    Expansion,
    LocalStorage,
    Fusion,
    Parallelization,
    Vectorization,
    Validation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Permutation => "permutation",
            Stage::Tiling => "tiling",
            Stage::Expansion => "expansion",
            Stage::LocalStorage => "local storage",
            Stage::Fusion => "fusion",
            Stage::Parallelization => "parallelization",
            Stage::Vectorization => "vectorization",
            Stage::Validation => "validation",
        };
        write!(f, "{}", name)
    }
}

/// A dropped combination.
///
/// For a failure above the vectorization dimension the whole subtree is
/// dropped and the inner positions of `coordinate` are 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub stage: Stage,
    pub coordinate: Coordinate,
    pub reason: String,
}

/// Result of visiting one combination.
#[derive(Debug, Clone)]
pub enum Outcome {
    Valid(Candidate),
    Rejected(Rejection),
}

/// Counters kept while enumerating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Candidates yielded
    pub yielded: usize,
    /// Rejections per stage
    pub rejected: BTreeMap<Stage, usize>,
}

impl SearchStats {
    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Raw list sizes of the dimensions that do not depend on earlier choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceSize {
    pub permutations: usize,
    pub tilings: usize,
    pub vectorizations: usize,
}

type StepResult = Result<(), (Stage, String)>;

/// Lazy enumerator over all rewrite combinations of a fragment.
pub struct MapScheduleEnumerator {
    config: EnumeratorConfig,
    base: Fragment,
    /// Staging candidates, taken from the untransformed nest
    inputs: Vec<String>,
    outputs: Vec<String>,
    depth: usize,
    permutations: Level<Permutation>,
    tilings: Level<Tiling>,
    placements: Level<LocalStorage>,
    parallelizations: Level<Parallelization>,
    widths: Level<u32>,
    /// Start offsets for the first descent into each inner dimension
    resume: [Option<usize>; 5],
    stats: SearchStats,
    last: Option<Coordinate>,
    finished: bool,
}

impl MapScheduleEnumerator {
    /// Prepare an enumeration of `fragment`.
    ///
    /// Fails before any combination is visited when the configuration is
    /// invalid, the fragment does not validate, or it has no perfect nest.
    /// Map ranges are checked even with `validate_input` off.
    pub fn new(fragment: Fragment, config: EnumeratorConfig) -> MapSchedResult<Self> {
        config.validate()?;
        if config.validate_input {
            fragment.validate()?;
        } else {
            fragment.validate_ranges()?;
        }
        let nest = extract_nest(&fragment)?;

        let mut permutations = Level::new();
        permutations.reset(space::permutations(&nest.params()), 0);
        info!(
            "Enumerating '{}': {} levels, inputs {:?}, outputs {:?}",
            fragment.name,
            nest.depth(),
            nest.inputs,
            nest.outputs
        );

        Ok(Self {
            config,
            base: fragment,
            inputs: nest.inputs,
            outputs: nest.outputs,
            depth: 0,
            permutations,
            tilings: Level::new(),
            placements: Level::new(),
            parallelizations: Level::new(),
            widths: Level::new(),
            resume: [None; 5],
            stats: SearchStats::default(),
            last: None,
            finished: false,
        })
    }

    /// Restart at `coordinate`, inclusive.
    ///
    /// Positions past the end of a list carry into the enclosing dimension,
    /// so any coordinate is accepted.
    pub fn resume_from(mut self, coordinate: Coordinate) -> Self {
        info!("Resuming from {}", coordinate);
        self.depth = 0;
        self.finished = false;
        self.permutations.index = coordinate.0[0];
        self.permutations.fragment = None;
        self.resume = [None, Some(coordinate.0[1]), Some(coordinate.0[2]), Some(coordinate.0[3]), Some(coordinate.0[4])];
        self
    }

    /// Restart strictly after a yielded `coordinate`.
    pub fn resume_after(self, coordinate: Coordinate) -> Self {
        self.resume_from(coordinate.successor())
    }

    pub fn config(&self) -> &EnumeratorConfig {
        &self.config
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Last yielded coordinate with the counters so far.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.last.map(|coordinate| Checkpoint { coordinate, stats: self.stats.clone() })
    }

    pub fn space_size(&self) -> SpaceSize {
        SpaceSize {
            permutations: self.permutations.choices.len(),
            tilings: self.config.tile_sizes().len().pow(self.permutations.choices.first().map_or(0, |p| p.0.len()) as u32),
            vectorizations: self.config.vector_widths.len(),
        }
    }

    /// Iterate over every combination, valid or not.
    pub fn outcomes(&mut self) -> Outcomes<'_> {
        Outcomes { inner: self }
    }

    /// Visit the next combination.
    pub fn next_outcome(&mut self) -> Option<Outcome> {
        loop {
            if self.exhausted(self.depth) {
                if self.depth == 0 {
                    if !self.finished {
                        self.finished = true;
                        info!(
                            "Enumeration finished: {} candidates, {} rejected",
                            self.stats.yielded,
                            self.stats.total_rejected()
                        );
                    }
                    return None;
                }
                self.depth -= 1;
                self.advance(self.depth);
                continue;
            }

            let coordinate = self.coordinate(self.depth);
            if self.depth < 4 {
                match self.descend(self.depth) {
                    Ok(()) => self.depth += 1,
                    Err((stage, reason)) => {
                        self.advance(self.depth);
                        return Some(self.reject(stage, coordinate, reason));
                    }
                }
                continue;
            }

            let result = self.finish();
            let description = self.description();
            self.widths.advance();
            return Some(match result {
                Ok(fragment) => {
                    self.stats.yielded += 1;
                    self.last = Some(coordinate);
                    debug!("Candidate {} {}", coordinate, description);
                    Outcome::Valid(Candidate { fragment, coordinate, description })
                }
                Err((stage, reason)) => self.reject(stage, coordinate, reason),
            });
        }
    }

    fn reject(&mut self, stage: Stage, coordinate: Coordinate, reason: String) -> Outcome {
        trace!("Rejected {} at {}: {}", coordinate, stage, reason);
        *self.stats.rejected.entry(stage).or_insert(0) += 1;
        Outcome::Rejected(Rejection { stage, coordinate, reason })
    }

    /// Current position, with every dimension below `dim` reported as 0.
    fn coordinate(&self, dim: usize) -> Coordinate {
        let indices = [
            self.permutations.index,
            self.tilings.index,
            self.placements.index,
            self.parallelizations.index,
            self.widths.index,
        ];
        let mut coordinate = Coordinate::ZERO;
        coordinate.0[..=dim].copy_from_slice(&indices[..=dim]);
        coordinate
    }

    fn exhausted(&self, dim: usize) -> bool {
        match dim {
            0 => self.permutations.exhausted(),
            1 => self.tilings.exhausted(),
            2 => self.placements.exhausted(),
            3 => self.parallelizations.exhausted(),
            _ => self.widths.exhausted(),
        }
    }

    /// Move past the current choice of `dim`. Pending resume offsets below
    /// it belong to the abandoned subtree.
    fn advance(&mut self, dim: usize) {
        for pending in self.resume.iter_mut().skip(dim + 1) {
            *pending = None;
        }
        match dim {
            0 => self.permutations.advance(),
            1 => self.tilings.advance(),
            2 => self.placements.advance(),
            3 => self.parallelizations.advance(),
            _ => self.widths.advance(),
        }
    }

    fn start(&mut self, dim: Dimension) -> usize {
        self.resume[dim.index()].take().unwrap_or(0)
    }

    /// Apply the current choice of `dim` and open the list of `dim + 1`.
    fn descend(&mut self, dim: usize) -> StepResult {
        match dim {
            0 => {
                let Some(permutation) = self.permutations.current() else { return Ok(()) };
                let mut fragment = self.base.clone();
                apply::apply_permutation(&mut fragment, permutation)
                    .map_err(|e| (Stage::Permutation, e.to_string()))?;
                let tilings = space::tilings(&permutation.0, &self.config.tile_sizes());
                self.permutations.fragment = Some(fragment);
                let start = self.start(Dimension::Tiling);
                self.tilings.reset(tilings, start);
            }
            1 => {
                let (Some(parent), Some(tiling)) = (&self.permutations.fragment, self.tilings.current()) else {
                    return Ok(());
                };
                let mut fragment = parent.clone();
                apply::apply_tiling(&mut fragment, tiling).map_err(|e| (Stage::Tiling, e.to_string()))?;
                apply::expand_all(&mut fragment).map_err(|e| (Stage::Expansion, e.to_string()))?;
                let nest = extract_nest(&fragment).map_err(|e| (Stage::Expansion, e.to_string()))?;
                let placements = space::local_storages(nest.depth(), &self.inputs, &self.outputs);
                self.tilings.fragment = Some(fragment);
                let start = self.start(Dimension::LocalStorage);
                self.placements.reset(placements, start);
            }
            2 => {
                let (Some(parent), Some(placement)) = (&self.tilings.fragment, self.placements.current()) else {
                    return Ok(());
                };
                let mut fragment = parent.clone();
                apply::apply_local_storage(&mut fragment, placement)
                    .map_err(|e| (Stage::LocalStorage, e.to_string()))?;
                apply::collapse_all(&mut fragment).map_err(|e| (Stage::Fusion, e.to_string()))?;
                let nest = extract_nest(&fragment).map_err(|e| (Stage::Fusion, e.to_string()))?;
                let parallelizations = space::parallelizations(&nest.params());
                self.placements.fragment = Some(fragment);
                let start = self.start(Dimension::Parallelization);
                self.parallelizations.reset(parallelizations, start);
            }
            _ => {
                let (Some(parent), Some(parallelization)) =
                    (&self.placements.fragment, self.parallelizations.current())
                else {
                    return Ok(());
                };
                let mut fragment = parent.clone();
                apply::apply_parallelization(&mut fragment, parallelization)
                    .map_err(|e| (Stage::Parallelization, e.to_string()))?;
                let widths = space::vectorizations(&self.config.vector_widths);
                self.parallelizations.fragment = Some(fragment);
                let start = self.start(Dimension::Vectorization);
                self.widths.reset(widths, start);
            }
        }
        Ok(())
    }

    /// Vectorize and validate the current leaf.
    fn finish(&self) -> Result<Fragment, (Stage, String)> {
        let (Some(parent), Some(&width)) = (&self.parallelizations.fragment, self.widths.current()) else {
            return Err((Stage::Vectorization, "no scheduled fragment".to_string()));
        };
        let mut fragment = parent.clone();
        apply::apply_vectorization(&mut fragment, width).map_err(|e| (Stage::Vectorization, e.to_string()))?;
        fragment.validate().map_err(|e| (Stage::Validation, e.to_string()))?;
        Ok(fragment)
    }

    fn description(&self) -> String {
        fn show<T: fmt::Display>(level: &Level<T>) -> String {
            level.current().map(|c| c.to_string()).unwrap_or_default()
        }
        format!(
            "{}#{}#{}#{}#{}",
            show(&self.permutations),
            show(&self.tilings),
            show(&self.placements),
            show(&self.parallelizations),
            show(&self.widths)
        )
    }
}

impl Iterator for MapScheduleEnumerator {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        while let Some(outcome) = self.next_outcome() {
            if let Outcome::Valid(candidate) = outcome {
                return Some(candidate);
            }
        }
        None
    }
}

/// Iterator over every [`Outcome`].
pub struct Outcomes<'a> {
    inner: &'a mut MapScheduleEnumerator,
}

impl Iterator for Outcomes<'_> {
    type Item = Outcome;

    fn next(&mut self) -> Option<Outcome> {
        self.inner.next_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::kernels;

    fn small() -> EnumeratorConfig {
        EnumeratorConfig::new().tile_exponents(0, 1).vector_widths(vec![1, 2])
    }

    #[test]
    fn test_scale_count() {
        let f = kernels::scale(64).unwrap();
        let candidates: Vec<Candidate> = MapScheduleEnumerator::new(f, small()).unwrap().collect();
        // untiled: 2 schedules x 2 widths; tiled: 4 placements x 3 schedules x 2 widths
        assert_eq!(candidates.len(), 28);
        assert_eq!(candidates[0].coordinate, Coordinate::ZERO);
        assert_eq!(candidates[0].description, "[i]#{i:1}#in{}out{}#[0]#1");
    }

    #[test]
    fn test_rejections_reported() {
        let f = kernels::scale(7).unwrap();
        let config = EnumeratorConfig::new().tile_exponents(0, 0).vector_widths(vec![1, 2]);
        let mut enumerator = MapScheduleEnumerator::new(f, config).unwrap();
        let outcomes: Vec<Outcome> = enumerator.outcomes().collect();
        assert_eq!(outcomes.len(), 4);

        let rejected: Vec<&Rejection> = outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Rejected(r) => Some(r),
                Outcome::Valid(_) => None,
            })
            .collect();
        assert_eq!(rejected.len(), 2);
        assert!(rejected.iter().all(|r| r.stage == Stage::Vectorization));
        assert_eq!(rejected[0].coordinate, Coordinate::new(0, 0, 0, 0, 1));
        assert_eq!(enumerator.stats().yielded, 2);
        assert_eq!(enumerator.stats().rejected.get(&Stage::Vectorization), Some(&2));
    }

    #[test]
    fn test_resume_after_last() {
        let f = kernels::scale(64).unwrap();
        let all: Vec<Coordinate> = MapScheduleEnumerator::new(f.clone(), small()).unwrap().map(|c| c.coordinate).collect();
        let last = *all.last().unwrap();
        let rest = MapScheduleEnumerator::new(f, small()).unwrap().resume_after(last).count();
        assert_eq!(rest, 0);
    }

    #[test]
    fn test_exhausted_enumerator_stays_finished() {
        let f = kernels::scale(64).unwrap();
        let mut enumerator = MapScheduleEnumerator::new(f, small()).unwrap();
        assert_eq!(enumerator.by_ref().count(), 28);
        assert!(enumerator.finished);
        assert!(enumerator.next().is_none());
        assert!(enumerator.next_outcome().is_none());
        assert_eq!(enumerator.stats().yielded, 28);

        let enumerator = enumerator.resume_from(Coordinate::ZERO);
        assert!(!enumerator.finished);
        assert_eq!(enumerator.count(), 28);
    }

    #[test]
    fn test_checkpoint_tracks_last() {
        let f = kernels::scale(64).unwrap();
        let mut enumerator = MapScheduleEnumerator::new(f, small()).unwrap();
        assert!(enumerator.checkpoint().is_none());
        let first = enumerator.next().unwrap();
        let second = enumerator.next().unwrap();
        let checkpoint = enumerator.checkpoint().unwrap();
        assert_eq!(checkpoint.coordinate, second.coordinate);
        assert!(first.coordinate < second.coordinate);
        assert_eq!(checkpoint.stats.yielded, 2);
    }

    #[test]
    fn test_space_size() {
        let f = kernels::matmul(16).unwrap();
        let enumerator = MapScheduleEnumerator::new(f, EnumeratorConfig::default()).unwrap();
        let size = enumerator.space_size();
        assert_eq!(size.permutations, 2);
        assert_eq!(size.tilings, 81);
        assert_eq!(size.vectorizations, 5);
    }
}
