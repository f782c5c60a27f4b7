//! CPU reference versions of the GPU primitives.
//!
//! These are straightforward serial implementations used as oracles by the
//! GPU tests; nothing on the simulation path calls them.

use glam::{IVec3, UVec3};

use crate::grid::{CellType, GridLayout};
use crate::particle::{CellRange, KeyValue};

/// Exclusive prefix sum with wrapping arithmetic, plus the grand total.
pub fn exclusive_scan(input: &[u32]) -> (Vec<u32>, u32) {
    let mut out = Vec::with_capacity(input.len());
    let mut total = 0u32;
    for &x in input {
        out.push(total);
        total = total.wrapping_add(x);
    }
    (out, total)
}

/// Stable LSD radix sort, two key bits per pass, stopping once every bit
/// of `max_key` has been consumed.
pub fn radix_sort(data: &mut Vec<KeyValue>, max_key: u32) {
    let mut shift = 0u32;
    loop {
        let mut buckets: [Vec<KeyValue>; 4] = Default::default();
        for kv in data.iter() {
            buckets[((kv.key >> shift) & 3) as usize].push(*kv);
        }
        data.clear();
        for bucket in buckets {
            data.extend(bucket);
        }
        shift += 2;
        if shift >= 32 || max_key >> shift == 0 {
            break;
        }
    }
}

/// Per-cell ranges of a pair array sorted by key.
pub fn cell_ranges(sorted: &[KeyValue], num_cells: u32) -> Vec<CellRange> {
    let mut ranges = vec![CellRange::EMPTY; num_cells as usize];
    for (i, kv) in sorted.iter().enumerate() {
        let range = &mut ranges[kv.key as usize];
        if range.is_empty() {
            range.first = i as u32;
        }
        range.count += 1;
    }
    ranges
}

/// Stable filter keeping the elements for which `keep` holds.
pub fn compact(input: &[u32], keep: impl Fn(u32) -> bool) -> Vec<u32> {
    input.iter().copied().filter(|&x| keep(x)).collect()
}

/// L2 norm of `lap(p) - rhs` over fluid cells, with the same boundary
/// treatment as the GPU Jacobi solve: air neighbours are `p = 0`, solid and
/// out-of-domain neighbours are excluded.
pub fn poisson_residual(layout: &GridLayout, types: &[u32], pressure: &[f32], rhs: &[f32]) -> f32 {
    let n = layout.num_cells() as usize;
    assert!(types.len() == n && pressure.len() == n && rhs.len() == n);
    let inv_h2 = layout.inv_spacing() * layout.inv_spacing();
    let size = layout.size.as_ivec3();
    let mut sum = 0.0f64;
    for index in 0..layout.num_cells() {
        let i = index as usize;
        if CellType::from_u32(types[i]) != CellType::Fluid {
            continue;
        }
        let c = layout.cell_coord(index).as_ivec3();
        let mut lap = 0.0f32;
        for axis in 0..3 {
            for sign in [-1, 1] {
                let mut offset = IVec3::ZERO;
                offset[axis] = sign;
                let nb = c + offset;
                if nb.cmplt(IVec3::ZERO).any() || nb.cmpge(size).any() {
                    continue;
                }
                let j = layout.linear_index(UVec3::new(nb.x as u32, nb.y as u32, nb.z as u32)) as usize;
                match CellType::from_u32(types[j]) {
                    CellType::Fluid => lap += (pressure[j] - pressure[i]) * inv_h2[axis],
                    CellType::Air => lap -= pressure[i] * inv_h2[axis],
                    CellType::Solid => {}
                }
            }
        }
        let r = (lap - rhs[i]) as f64;
        sum += r * r;
    }
    sum.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scan_of_single_element() {
        assert_eq!(exclusive_scan(&[7]), (vec![0], 7));
    }

    #[test]
    fn ranges_cover_sorted_pairs() {
        let pairs = [KeyValue::new(1, 0), KeyValue::new(1, 2), KeyValue::new(3, 1)];
        let ranges = cell_ranges(&pairs, 4);
        assert_eq!(ranges[0], CellRange::EMPTY);
        assert_eq!(ranges[1], CellRange { first: 0, count: 2 });
        assert_eq!(ranges[3], CellRange { first: 2, count: 1 });
    }

    #[test]
    fn zero_pressure_residual_is_rhs_norm() {
        let layout = GridLayout::centered(glam::Vec3::splat(3.0), 1.0);
        let n = layout.num_cells() as usize;
        let types = vec![CellType::Fluid.as_u32(); n];
        let mut rhs = vec![0.0; n];
        rhs[13] = 2.0;
        assert!((poisson_residual(&layout, &types, &vec![0.0; n], &rhs) - 2.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn radix_sort_matches_stable_sort(
            keys in prop::collection::vec(0u32..1000, 0..300),
        ) {
            let mut data: Vec<KeyValue> = keys
                .iter()
                .enumerate()
                .map(|(i, &k)| KeyValue::new(k, i as u32))
                .collect();
            let mut expected = data.clone();
            expected.sort_by_key(|kv| kv.key);
            radix_sort(&mut data, 999);
            prop_assert_eq!(data, expected);
        }

        #[test]
        fn scan_total_is_sum(input in prop::collection::vec(0u32..1_000_000, 1..500)) {
            let (out, total) = exclusive_scan(&input);
            prop_assert_eq!(total, input.iter().sum::<u32>());
            prop_assert_eq!(out[0], 0);
            for i in 1..input.len() {
                prop_assert_eq!(out[i], out[i - 1] + input[i - 1]);
            }
        }
    }
}
