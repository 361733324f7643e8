//! Search-space generators.
//!
//! Each generator is a pure function of the nest shape it is given and
//! returns its choices in a fixed order, so a coordinate names the same
//! combination on every run.

use super::choices::{LocalStorage, Parallelization, Permutation, Tiling};
use itertools::Itertools;
use std::collections::BTreeMap;

/// Cartesian product of `lists`, first list varying slowest.
///
/// The product of zero lists is a single empty combination.
fn product<T: Clone>(lists: Vec<Vec<T>>) -> Vec<Vec<T>> {
    if lists.is_empty() {
        return vec![Vec::new()];
    }
    lists.into_iter().map(|l| l.into_iter()).multi_cartesian_product().collect()
}

/// Every ordering of every level's parameters.
pub fn permutations(levels: &[Vec<String>]) -> Vec<Permutation> {
    let per_level: Vec<Vec<Vec<String>>> = levels
        .iter()
        .map(|params| params.iter().cloned().permutations(params.len()).collect())
        .collect();
    product(per_level).into_iter().map(Permutation).collect()
}

/// One tile size per level, shared by that level's parameters.
pub fn tilings(levels: &[Vec<String>], sizes: &[i64]) -> Vec<Tiling> {
    let per_level = vec![sizes.to_vec(); levels.len()];
    product(per_level)
        .into_iter()
        .map(|choice| {
            let table: BTreeMap<String, i64> = levels
                .iter()
                .zip(choice)
                .flat_map(|(params, size)| params.iter().map(move |p| (p.clone(), size)))
                .collect();
            Tiling(table)
        })
        .collect()
}

/// Staging placements for a nest of `depth` levels.
///
/// Every array either stays unstaged or is staged at exactly one of the
/// `depth - 1` insertion points.
pub fn local_storages(depth: usize, inputs: &[String], outputs: &[String]) -> Vec<LocalStorage> {
    if depth <= 1 || (inputs.is_empty() && outputs.is_empty()) {
        return vec![LocalStorage::default()];
    }
    let points = depth - 1;
    let options: Vec<Vec<bool>> = std::iter::once(vec![false; points])
        .chain((0..points).map(|i| (0..points).map(|j| i == j).collect()))
        .collect();

    let arrays: Vec<&String> = inputs.iter().chain(outputs).collect();
    product(vec![options; arrays.len()])
        .into_iter()
        .map(|flags| {
            let mut placement = LocalStorage::default();
            for (n, (array, bits)) in arrays.iter().zip(flags).enumerate() {
                let side = if n < inputs.len() { &mut placement.inputs } else { &mut placement.outputs };
                side.insert((*array).clone(), bits);
            }
            placement
        })
        .collect()
}

/// All-sequential baseline, then one multicore level at a time.
pub fn parallelizations(levels: &[Vec<String>]) -> Vec<Parallelization> {
    let baseline = vec![0; levels.len()];
    let mut result = vec![Parallelization(baseline.clone())];
    for (level, params) in levels.iter().enumerate() {
        for collapse in 1..=params.len() {
            let mut strategy = baseline.clone();
            strategy[level] = collapse;
            result.push(Parallelization(strategy));
        }
    }
    result
}

/// The configured widths, in order.
pub fn vectorizations(widths: &[u32]) -> Vec<u32> {
    widths.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(shape: &[&[&str]]) -> Vec<Vec<String>> {
        shape.iter().map(|l| l.iter().map(|p| p.to_string()).collect()).collect()
    }

    #[test]
    fn test_single_parameter_single_permutation() {
        let perms = permutations(&levels(&[&["i"]]));
        assert_eq!(perms, vec![Permutation(levels(&[&["i"]]))]);
    }

    #[test]
    fn test_permutations_lexicographic() {
        let perms = permutations(&levels(&[&["i", "j"], &["k"]]));
        assert_eq!(perms.len(), 2);
        assert_eq!(perms[0].0, levels(&[&["i", "j"], &["k"]]));
        assert_eq!(perms[1].0, levels(&[&["j", "i"], &["k"]]));

        assert_eq!(permutations(&levels(&[&["a", "b", "c"]])).len(), 6);
    }

    #[test]
    fn test_tiling_count() {
        let sizes = [1, 2, 4];
        let nest = levels(&[&["i", "j"], &["k"]]);
        let tilings = tilings(&nest, &sizes);
        assert_eq!(tilings.len(), sizes.len().pow(nest.len() as u32));
        assert!(tilings[0].is_trivial());
        // Parameters of one level share a size.
        assert!(tilings.iter().all(|t| t.size_of("i") == t.size_of("j")));
        assert_eq!(tilings[1].size_of("k"), 2);
    }

    #[test]
    fn test_no_arrays_single_placement() {
        assert_eq!(local_storages(3, &[], &[]), vec![LocalStorage::default()]);
        assert_eq!(local_storages(1, &["A".into()], &["B".into()]).len(), 1);
    }

    #[test]
    fn test_placements_one_hot() {
        let placements = local_storages(3, &["A".into()], &["C".into()]);
        // (1 + 2 insertion points) options per array
        assert_eq!(placements.len(), 9);
        assert!(placements[0].is_empty());
        assert_eq!(placements[1].outputs["C"], vec![true, false]);
        assert_eq!(placements[3].inputs["A"], vec![true, false]);
        for p in &placements {
            let set = p.inputs.values().chain(p.outputs.values())
                .map(|bits| bits.iter().filter(|&&b| b).count());
            assert!(set.into_iter().all(|n| n <= 1));
        }
    }

    #[test]
    fn test_parallelizations() {
        let pars = parallelizations(&levels(&[&["i", "j"], &["k"]]));
        let expected: Vec<Vec<usize>> = vec![vec![0, 0], vec![1, 0], vec![2, 0], vec![0, 1]];
        assert_eq!(pars.into_iter().map(|p| p.0).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_vectorizations_keep_order() {
        assert_eq!(vectorizations(&[1, 4, 2]), vec![1, 4, 2]);
    }
}
