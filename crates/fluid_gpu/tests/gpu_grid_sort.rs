//! Grid sort: particles end up bucketed by cell with a consistent
//! per-cell range table.

mod common;

use common::gpu;
use fluid_core::{reference, CellRange, GridLayout, Particle, UVec3, Vec3};
use fluid_gpu::{DeviceBuffer, DoubleBuffer, GridSortHelper};
use rand::{Rng, SeedableRng};

/// Particles jittered around cell centres so no position sits on a cell
/// face, numbered through their x velocity.
fn scattered_particles(layout: &GridLayout, count: usize, seed: u64) -> Vec<Particle> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let cell = UVec3::new(
                rng.gen_range(0..layout.size.x),
                rng.gen_range(0..layout.size.y),
                rng.gen_range(0..layout.size.z),
            );
            let jitter = Vec3::new(
                rng.gen_range(-0.4..0.4),
                rng.gen_range(-0.4..0.4),
                rng.gen_range(-0.4..0.4),
            );
            let position = layout.cell_center(cell) + jitter * layout.spacing;
            Particle::new(position, Vec3::new(i as f32, 0.0, 0.0))
        })
        .collect()
}

fn check_ranges(layout: &GridLayout, sorted: &[Particle], ranges: &[CellRange]) {
    let mut covered = vec![false; sorted.len()];
    for (cell, range) in ranges.iter().enumerate() {
        for i in range.range() {
            assert!(!covered[i], "particle {} is in two cell ranges", i);
            covered[i] = true;
            assert_eq!(
                layout.cell_index_of(sorted[i].position()),
                cell as u32,
                "particle {} at {:?} listed under cell {}",
                i,
                sorted[i].position(),
                cell
            );
        }
    }
    assert!(covered.iter().all(|&c| c), "some particles are in no cell range");
}

#[test]
fn cell_ranges_cover_every_particle_once() {
    let Some(ctx) = gpu() else { return };
    let layout = GridLayout::centered(Vec3::new(8.0, 4.0, 6.0), 0.5);
    let input = scattered_particles(&layout, 20_000, 11);

    let mut particles = DoubleBuffer::new("Grid Sort Particles");
    particles.init(&ctx, input.len()).unwrap();
    particles.read().write(&ctx, &input);
    let grid_index = DeviceBuffer::<CellRange>::with_len(&ctx, "Grid Index", layout.num_cells() as usize).unwrap();
    let mut helper = GridSortHelper::<Particle>::new(&ctx).unwrap();

    helper.sort(&ctx, &mut particles, &grid_index, &layout).unwrap();

    let sorted = particles.read().read(&ctx).unwrap();
    let ranges = grid_index.read(&ctx).unwrap();
    check_ranges(&layout, &sorted, &ranges);

    // Same permutation as a stable CPU sort by cell.
    let pairs = helper.pairs().read(&ctx).unwrap();
    assert_eq!(reference::cell_ranges(&pairs, layout.num_cells()), ranges);
    let mut ids: Vec<u32> = sorted.iter().map(|p| p.velocity().x as u32).collect();
    let expected: Vec<u32> = pairs.iter().map(|kv| kv.value).collect();
    assert_eq!(ids, expected);
    ids.sort_unstable();
    assert!(ids.iter().enumerate().all(|(i, &id)| id == i as u32));
}

#[test]
fn empty_cells_get_empty_ranges() {
    let Some(ctx) = gpu() else { return };
    let layout = GridLayout::centered(Vec3::splat(2.0), 0.5);
    // Everything in the minimum corner cell.
    let corner = layout.cell_center(UVec3::ZERO);
    let input: Vec<Particle> = (0..10).map(|_| Particle::at(corner)).collect();

    let mut particles = DoubleBuffer::new("Corner Particles");
    particles.init(&ctx, input.len()).unwrap();
    particles.read().write(&ctx, &input);
    let grid_index = DeviceBuffer::<CellRange>::with_len(&ctx, "Grid Index", layout.num_cells() as usize).unwrap();
    let mut helper = GridSortHelper::<Particle>::new(&ctx).unwrap();

    helper.sort(&ctx, &mut particles, &grid_index, &layout).unwrap();

    let ranges = grid_index.read(&ctx).unwrap();
    assert_eq!(ranges[0], CellRange { first: 0, count: 10 });
    assert!(ranges[1..].iter().all(|r| r.is_empty()));
}

#[test]
fn resorting_moving_particles_stays_consistent() {
    let Some(ctx) = gpu() else { return };
    let layout = GridLayout::centered(Vec3::splat(4.0), 0.5);
    let mut helper = GridSortHelper::<Particle>::new(&ctx).unwrap();
    let grid_index = DeviceBuffer::<CellRange>::with_len(&ctx, "Grid Index", layout.num_cells() as usize).unwrap();
    let mut particles = DoubleBuffer::new("Moving Particles");

    for (round, count) in [(0u64, 500usize), (1, 500), (2, 1200)] {
        let input = scattered_particles(&layout, count, round);
        particles.check_size_changed(&ctx, count).unwrap();
        particles.read().write(&ctx, &input);
        helper.sort(&ctx, &mut particles, &grid_index, &layout).unwrap();
        check_ranges(
            &layout,
            &particles.read().read(&ctx).unwrap(),
            &grid_index.read(&ctx).unwrap(),
        );
    }
}
