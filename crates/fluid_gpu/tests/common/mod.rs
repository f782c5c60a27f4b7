//! Shared setup for the GPU integration tests.

#![allow(dead_code)]

use fluid_gpu::GpuContext;

/// Set to anything but `0` to turn a missing adapter into a test failure.
pub const REQUIRE_GPU_VAR: &str = "FLUID_REQUIRE_GPU";

fn gpu_required() -> bool {
    std::env::var(REQUIRE_GPU_VAR).is_ok_and(|v| !v.is_empty() && v != "0")
}

/// Headless device for a test (hardware first, then the software
/// fallback), or `None` with a warning when neither exists. With
/// `FLUID_REQUIRE_GPU` set the missing adapter panics instead, so CI can
/// refuse a run where nothing was dispatched.
pub fn gpu() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::new_headless_blocking() {
        Ok(ctx) => Some(ctx),
        Err(e) if gpu_required() => panic!("{} is set but no GPU adapter is usable: {}", REQUIRE_GPU_VAR, e),
        Err(e) => {
            log::warn!("No GPU adapter available ({}); skipping test.", e);
            eprintln!("No GPU adapter available ({}); skipping test. Set {}=1 to fail instead.", e, REQUIRE_GPU_VAR);
            None
        }
    }
}

/// Deterministic pseudo-random values in `0..bound`.
pub fn random_u32s(len: usize, bound: u32, seed: u64) -> Vec<u32> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0..bound)).collect()
}
