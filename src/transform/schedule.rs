//! Schedule assignment.

use crate::ir::{Fragment, MapId, ScheduleType};
use crate::transform::Transform;
use crate::utils::errors::{TransformError, TransformResult};

/// Assign a schedule and collapse degree to a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSchedule {
    pub map: MapId,
    pub schedule: ScheduleType,
    /// Number of leading parameters run as one parallel region
    pub collapse: usize,
}

impl MapSchedule {
    pub fn new(map: MapId, schedule: ScheduleType, collapse: usize) -> Self {
        Self { map, schedule, collapse }
    }

    /// Plain sequential loop.
    pub fn sequential(map: MapId) -> Self {
        Self::new(map, ScheduleType::Sequential, 1)
    }

    /// Multicore loop over the first `collapse` parameters.
    pub fn multicore(map: MapId, collapse: usize) -> Self {
        Self::new(map, ScheduleType::CpuMulticore, collapse)
    }
}

impl Transform for MapSchedule {
    fn check(&self, fragment: &Fragment) -> TransformResult<()> {
        let map = fragment.require_map(self.map)?;
        if self.collapse == 0 || self.collapse > map.params.len() {
            return Err(TransformError::not_applicable(
                self.name(),
                format!("collapse {} for a map with {} parameters", self.collapse, map.params.len()),
            ));
        }
        Ok(())
    }

    fn apply(&self, fragment: &mut Fragment) -> TransformResult<Vec<MapId>> {
        self.check(fragment)?;
        if let Some(map) = fragment.map_mut(self.map) {
            map.schedule = self.schedule;
            map.collapse = self.collapse;
        }
        Ok(vec![self.map])
    }

    fn name(&self) -> &str {
        "MapSchedule"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract_nest;
    use crate::ir::kernels;

    #[test]
    fn test_schedule_new() {
        let mut f = kernels::matmul(8).unwrap();
        let nest = extract_nest(&f).unwrap();
        MapSchedule::multicore(nest.outermost().map, 2).apply(&mut f).unwrap();
        MapSchedule::sequential(nest.innermost().map).apply(&mut f).unwrap();

        let outer = f.map(nest.outermost().map).unwrap();
        assert_eq!((outer.schedule, outer.collapse), (ScheduleType::CpuMulticore, 2));
        let inner = f.map(nest.innermost().map).unwrap();
        assert_eq!((inner.schedule, inner.collapse), (ScheduleType::Sequential, 1));
    }

    #[test]
    fn test_collapse_out_of_range() {
        let f = kernels::matmul(8).unwrap();
        let inner = extract_nest(&f).unwrap().innermost().map;
        assert!(!MapSchedule::multicore(inner, 2).can_apply(&f));
        assert!(!MapSchedule::multicore(inner, 0).can_apply(&f));
    }
}
