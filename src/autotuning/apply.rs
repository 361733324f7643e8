//! Applying one choice of each family to a fragment.
//!
//! Every helper re-extracts the nest from the fragment it is handed and
//! drives the rewrite catalog through [`Rewrite`].

use super::choices::{LocalStorage, Parallelization, Permutation, Tiling};
use crate::analysis::extract_nest;
use crate::ir::{Fragment, MapId};
use crate::transform::{
    apply_if_legal, AccumulateTransient, DimShuffle, InLocalStorage, MapCollapse, MapExpansion, MapSchedule,
    MapTiling, OutLocalStorage, Rewrite, Transform, Vectorization,
};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

fn contract(family: &str, message: String) -> TransformError {
    TransformError::new(TransformErrorKind::ContractViolation, family, message)
}

fn run(fragment: &mut Fragment, rewrite: Rewrite) -> TransformResult<Vec<MapId>> {
    rewrite.apply(fragment)
}

/// Reorder the parameters of every level.
pub fn apply_permutation(fragment: &mut Fragment, permutation: &Permutation) -> TransformResult<()> {
    let nest = extract_nest(fragment)?;
    if nest.depth() != permutation.0.len() {
        return Err(contract(
            "permutation",
            format!("{} orders for a nest of depth {}", permutation.0.len(), nest.depth()),
        ));
    }
    for (level, order) in nest.levels.iter().zip(&permutation.0) {
        run(fragment, DimShuffle::new(level.map, order.clone()).into())?;
    }
    Ok(())
}

/// Tile every level with at least one size above 1.
pub fn apply_tiling(fragment: &mut Fragment, tiling: &Tiling) -> TransformResult<()> {
    let nest = extract_nest(fragment)?;
    for level in &nest.levels {
        let sizes: Vec<i64> = level.params.iter().map(|p| tiling.size_of(p)).collect();
        if sizes.iter().all(|&s| s == 1) {
            continue;
        }
        run(fragment, MapTiling::new(level.map, sizes).into())?;
    }
    Ok(())
}

/// Split every multi-parameter level into single-parameter levels.
pub fn expand_all(fragment: &mut Fragment) -> TransformResult<()> {
    let nest = extract_nest(fragment)?;
    for level in nest.levels.iter().filter(|l| l.params.len() > 1) {
        run(fragment, MapExpansion::new(level.map).into())?;
    }
    Ok(())
}

/// Insertion points whose flag is set.
fn set_points(flags: &[bool]) -> Vec<usize> {
    flags.iter().enumerate().filter(|(_, &set)| set).map(|(i, _)| i).collect()
}

/// Insert the staging buffers of `placement`.
///
/// Outputs take out-local-storage when legal and an accumulation transient
/// otherwise; when neither applies the placement fails.
pub fn apply_local_storage(fragment: &mut Fragment, placement: &LocalStorage) -> TransformResult<()> {
    let maps = extract_nest(fragment)?.maps();
    let pair = |point: usize| -> TransformResult<(MapId, MapId)> {
        match (maps.get(point), maps.get(point + 1)) {
            (Some(&outer), Some(&inner)) => Ok((outer, inner)),
            _ => Err(contract(
                "local storage",
                format!("insertion point {} in a nest of depth {}", point, maps.len()),
            )),
        }
    };
    for (array, flags) in &placement.inputs {
        for point in set_points(flags) {
            let (outer, inner) = pair(point)?;
            run(fragment, InLocalStorage::new(outer, inner, array).into())?;
        }
    }
    for (array, flags) in &placement.outputs {
        for point in set_points(flags) {
            let (outer, inner) = pair(point)?;
            let out: Rewrite = OutLocalStorage::new(outer, inner, array).into();
            if apply_if_legal(&out, fragment)?.is_some() {
                continue;
            }
            let accumulate: Rewrite = AccumulateTransient::new(outer, inner, array).into();
            if apply_if_legal(&accumulate, fragment)?.is_none() {
                return Err(TransformError::not_applicable(
                    "local storage",
                    format!("no output staging applies to '{}' at point {}", array, point),
                ));
            }
        }
    }
    Ok(())
}

/// Fuse adjacent levels split from the same map, innermost first.
///
/// Fission groups are cleared afterwards.
pub fn collapse_all(fragment: &mut Fragment) -> TransformResult<()> {
    let nest = extract_nest(fragment)?;
    let mut levels = nest.levels.iter().rev();
    if let Some(innermost) = levels.next() {
        let mut inner = innermost.map;
        for level in levels {
            let outer = level.map;
            let group = |m: MapId| fragment.map(m).and_then(|map| map.fission_group);
            let same_group = matches!((group(outer), group(inner)), (Some(a), Some(b)) if a == b);
            let collapse: Rewrite = MapCollapse::new(outer, inner).into();
            if same_group && collapse.can_apply(fragment) {
                run(fragment, collapse)?;
            }
            inner = outer;
        }
    }
    for (_, map) in fragment.maps_mut() {
        map.fission_group = None;
    }
    Ok(())
}

/// Assign a schedule to every level.
pub fn apply_parallelization(fragment: &mut Fragment, parallelization: &Parallelization) -> TransformResult<()> {
    let nest = extract_nest(fragment)?;
    if nest.depth() != parallelization.0.len() {
        return Err(contract(
            "parallelization",
            format!("{} strategies for a nest of depth {}", parallelization.0.len(), nest.depth()),
        ));
    }
    for (level, &strategy) in nest.levels.iter().zip(&parallelization.0) {
        let schedule = match strategy {
            0 => MapSchedule::sequential(level.map),
            k => MapSchedule::multicore(level.map, k),
        };
        run(fragment, schedule.into())?;
    }
    Ok(())
}

/// Vectorize the innermost level; width 1 leaves the fragment unchanged.
pub fn apply_vectorization(fragment: &mut Fragment, width: u32) -> TransformResult<()> {
    if width == 1 {
        return Ok(());
    }
    let nest = extract_nest(fragment)?;
    run(fragment, Vectorization::new(nest.innermost().map, width).into())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autotuning::space;
    use crate::ir::{kernels, ScheduleType};

    #[test]
    fn test_expand_then_collapse_round_trips() {
        let original = kernels::matmul(16).unwrap();
        let mut f = original.clone();
        expand_all(&mut f).unwrap();
        assert_eq!(extract_nest(&f).unwrap().depth(), 3);

        collapse_all(&mut f).unwrap();
        let nest = extract_nest(&f).unwrap();
        assert_eq!(nest.params(), extract_nest(&original).unwrap().params());
        assert_eq!(f.map(nest.outermost().map).unwrap().label, original.map(extract_nest(&original).unwrap().outermost().map).unwrap().label);
        assert!(f.maps().all(|(_, m)| m.fission_group.is_none()));
        f.validate().unwrap();
    }

    #[test]
    fn test_tile_levels_stay_apart() {
        let mut f = kernels::scale(64).unwrap();
        let tiling = Tiling([("i".to_string(), 8)].into_iter().collect());
        apply_tiling(&mut f, &tiling).unwrap();
        expand_all(&mut f).unwrap();
        collapse_all(&mut f).unwrap();
        assert_eq!(extract_nest(&f).unwrap().depth(), 2);
    }

    #[test]
    fn test_staging_blocks_fusion() {
        let mut f = kernels::matmul(16).unwrap();
        expand_all(&mut f).unwrap();
        let nest = extract_nest(&f).unwrap();
        let placements = space::local_storages(nest.depth(), &nest.inputs, &nest.outputs);
        // A staged between i and j
        let placement = placements
            .iter()
            .find(|p| p.inputs["A"] == vec![true, false] && p.inputs["B"] == vec![false, false] && p.outputs["C"] == vec![false, false])
            .unwrap();
        apply_local_storage(&mut f, placement).unwrap();
        collapse_all(&mut f).unwrap();
        assert_eq!(extract_nest(&f).unwrap().depth(), 3);
        f.validate().unwrap();
    }

    #[test]
    fn test_output_falls_back_to_accumulation() {
        let mut f = kernels::matmul(16).unwrap();
        let mut placement = LocalStorage::default();
        placement.outputs.insert("C".into(), vec![true]);
        apply_local_storage(&mut f, &placement).unwrap();
        let staged: Vec<_> = f.arrays().filter(|(_, d)| d.transient).collect();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].1.accumulate.is_some());
        f.validate().unwrap();
    }

    #[test]
    fn test_bad_insertion_point() {
        let mut f = kernels::scale(8).unwrap();
        let mut placement = LocalStorage::default();
        placement.inputs.insert("A".into(), vec![false, true]);
        let err = apply_local_storage(&mut f, &placement).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::ContractViolation);
    }

    #[test]
    fn test_parallelization_and_width() {
        let mut f = kernels::matmul(16).unwrap();
        apply_parallelization(&mut f, &Parallelization(vec![2, 0])).unwrap();
        let nest = extract_nest(&f).unwrap();
        let outer = f.map(nest.outermost().map).unwrap();
        assert_eq!((outer.schedule, outer.collapse), (ScheduleType::CpuMulticore, 2));

        assert!(apply_parallelization(&mut f, &Parallelization(vec![0])).is_err());

        let before = f.clone();
        apply_vectorization(&mut f, 1).unwrap();
        assert_eq!(f, before);
    }
}
