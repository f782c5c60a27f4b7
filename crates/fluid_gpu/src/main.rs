//! Headless runner for the FLIP and smoke solvers.
//!
//! Usage: `fluid_gpu [flip|smoke] [steps] [config.json]`
//!
//! Runs the chosen solver for `steps` frames (default 120) on the first
//! adapter found, logging diagnostics every 30 frames. Set `RUST_LOG` to
//! `debug` to see buffer allocations and scan/sort details.

use std::process::ExitCode;
use std::time::Instant;

use fluid_core::{FlipConfig, InteractionInput, SmokeConfig};
use fluid_gpu::{FlipSimulation, GpuContext, GpuError, SmokeSimulation};

const DEFAULT_STEPS: u32 = 120;
const REPORT_EVERY: u32 = 30;

#[derive(Clone, Copy, Debug)]
enum Solver {
    Flip,
    Smoke,
}

struct Args {
    solver: Solver,
    steps: u32,
    config: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let solver = match args.next().as_deref() {
        None | Some("flip") => Solver::Flip,
        Some("smoke") => Solver::Smoke,
        Some(other) => return Err(format!("unknown solver '{}', expected flip or smoke", other)),
    };
    let steps = match args.next() {
        Some(s) => s.parse().map_err(|_| format!("invalid step count '{}'", s))?,
        None => DEFAULT_STEPS,
    };
    let config = match args.next() {
        Some(path) => Some(std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path, e))?),
        None => None,
    };
    Ok(Args { solver, steps, config })
}

fn run_flip(ctx: &GpuContext, config: FlipConfig, steps: u32) -> Result<(), GpuError> {
    let mut sim = FlipSimulation::new(ctx, &config)?;
    let input = InteractionInput::default();
    let dt = sim.config().delta_time;
    let start = Instant::now();
    for frame in 1..=steps {
        sim.step(dt, &input)?;
        if frame % REPORT_EVERY == 0 || frame == steps {
            let fluid_cells = sim.fluid_cell_count()?;
            let max_speed = sim.max_particle_speed()?;
            log::info!(
                "frame {}: {} fluid cells, max speed {:?}, {:.2} ms/frame",
                frame,
                fluid_cells,
                max_speed,
                start.elapsed().as_secs_f64() * 1000.0 / frame as f64
            );
            if max_speed.is_none() {
                log::error!("non-finite particle state at frame {}", frame);
            }
        }
    }
    sim.shutdown();
    Ok(())
}

fn run_smoke(ctx: &GpuContext, config: SmokeConfig, steps: u32) -> Result<(), GpuError> {
    let mut sim = SmokeSimulation::new(ctx, &config)?;
    let input = InteractionInput::default();
    let dt = sim.config().delta_time;
    let start = Instant::now();
    for frame in 1..=steps {
        sim.step(dt, &input)?;
        if frame % REPORT_EVERY == 0 || frame == steps {
            log::info!(
                "frame {}: total density {:.3}, {:.2} ms/frame",
                frame,
                sim.total_density()?,
                start.elapsed().as_secs_f64() * 1000.0 / frame as f64
            );
        }
    }
    sim.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("usage: fluid_gpu [flip|smoke] [steps] [config.json]");
            return ExitCode::FAILURE;
        }
    };

    let ctx = match GpuContext::new_headless_blocking() {
        Ok(ctx) => ctx,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match args.solver {
        Solver::Flip => match args.config.as_deref().map(FlipConfig::from_json).transpose() {
            Ok(config) => run_flip(&ctx, config.unwrap_or_default(), args.steps),
            Err(e) => {
                log::error!("invalid FLIP config: {}", e);
                return ExitCode::FAILURE;
            }
        },
        Solver::Smoke => match args.config.as_deref().map(SmokeConfig::from_json).transpose() {
            Ok(config) => run_smoke(&ctx, config.unwrap_or_default(), args.steps),
            Err(e) => {
                log::error!("invalid smoke config: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:?} solver failed: {}", args.solver, e);
            ExitCode::FAILURE
        }
    }
}
