//! GPU exclusive prefix scan over `u32` buffers.
//!
//! Classic two-phase work-efficient scan applied recursively:
//! 1. Scan every block of `2 * threads` values in place, writing block totals
//!    into the group-sum buffer of the current depth
//! 2. Scan the block totals, either in one block (writing the grand total
//!    to the total target) or by recursing one level deeper
//! 3. Add each block's scanned total back into the block
//!
//! Group-sum buffers form an arena indexed by recursion depth. They are
//! planned and resized before any dispatch, and only reallocated when the
//! group count at that depth changes, so steady-state frames never allocate.

use super::buffer::{DeviceBuffer, UniformBuffer};
use super::kernel::{bind, Access, Bindings, ComputeKernel, KernelSpec, Slot};
use super::params::ScanParams;
use super::shaders::ShaderId;
use super::{GpuContext, GpuError};

/// Threads per scan group. Larger inputs use larger groups to keep the
/// recursion shallow; any tier gives the same result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanTier {
    Threads128,
    Threads256,
    Threads512,
}

impl ScanTier {
    pub const ALL: [ScanTier; 3] = [ScanTier::Threads128, ScanTier::Threads256, ScanTier::Threads512];

    pub fn threads(self) -> u32 {
        match self {
            ScanTier::Threads128 => 128,
            ScanTier::Threads256 => 256,
            ScanTier::Threads512 => 512,
        }
    }

    /// Each thread scans two values.
    pub fn elements_per_group(self) -> u32 {
        self.threads() * 2
    }

    /// Preferred tier for `len` elements.
    pub fn for_len(len: u32) -> Self {
        if len <= 65536 {
            ScanTier::Threads128
        } else if len <= 262144 {
            ScanTier::Threads256
        } else {
            ScanTier::Threads512
        }
    }

    /// Largest tier no bigger than `self` that fits in `max_threads`.
    pub fn clamp_to(self, max_threads: u32) -> Self {
        Self::ALL
            .into_iter()
            .rev()
            .find(|tier| *tier as u8 <= self as u8 && tier.threads() <= max_threads)
            .unwrap_or(ScanTier::Threads128)
    }
}

const SCAN_BINDINGS: &[super::kernel::BindingDecl] = &[
    bind(0, Slot::Params, Access::Uniform),
    bind(1, Slot::Data, Access::ReadWrite),
    bind(2, Slot::GroupSum, Access::ReadWrite),
];

fn scan_spec(tier: ScanTier, entry_point: &'static str) -> KernelSpec {
    KernelSpec {
        entry_point,
        workgroup_size: tier.threads(),
        bindings: SCAN_BINDINGS,
    }
}

struct TierKernels {
    tier: ScanTier,
    scan: ComputeKernel,
    add_group_sum: ComputeKernel,
}

/// Number of groups at each recursion depth for a scan of `len` values.
pub fn level_group_counts(len: u32, tier: ScanTier) -> Vec<u32> {
    let per_group = tier.elements_per_group();
    let mut levels = Vec::new();
    let mut n = len;
    loop {
        let groups = n.div_ceil(per_group);
        levels.push(groups);
        if groups <= per_group {
            return levels;
        }
        n = groups;
    }
}

pub struct PrefixScan {
    kernels: Vec<TierKernels>,
    max_threads: u32,
    params: UniformBuffer<ScanParams>,
    group_sums: Vec<DeviceBuffer<u32>>,
    total: DeviceBuffer<u32>,
}

impl PrefixScan {
    pub fn new(ctx: &GpuContext) -> Result<Self, GpuError> {
        let max_threads = ctx.max_workgroup_threads();
        let kernels = ScanTier::ALL
            .into_iter()
            .filter(|tier| tier.threads() <= max_threads)
            .map(|tier| {
                let module = ShaderId::PrefixScan(tier).create_module(ctx);
                TierKernels {
                    tier,
                    scan: ComputeKernel::new(
                        ctx,
                        &module,
                        &format!("Prefix Scan {}", tier.threads()),
                        &scan_spec(tier, "prefix_scan"),
                    ),
                    add_group_sum: ComputeKernel::new(
                        ctx,
                        &module,
                        &format!("Add Group Sum {}", tier.threads()),
                        &scan_spec(tier, "add_group_sum"),
                    ),
                }
            })
            .collect();

        Ok(Self {
            kernels,
            max_threads,
            params: UniformBuffer::new(ctx, "Scan Params"),
            group_sums: Vec::new(),
            total: DeviceBuffer::with_len(ctx, "Scan Total", 1)?,
        })
    }

    /// Exclusive scan of `data` in place. An empty buffer scans to a
    /// total of zero.
    pub fn scan(&mut self, ctx: &GpuContext, data: &DeviceBuffer<u32>) -> Result<(), GpuError> {
        if data.is_empty() {
            self.total.write(ctx, &[0]);
            return Ok(());
        }
        let tier = self.prepare(ctx, data)?;
        self.run(ctx, tier, data, &self.total, 0);
        Ok(())
    }

    /// Exclusive scan of `data` in place, writing the grand total into
    /// `total[offset]` without a readback.
    pub fn scan_into(
        &mut self,
        ctx: &GpuContext,
        data: &DeviceBuffer<u32>,
        total: &DeviceBuffer<u32>,
        offset: u32,
    ) -> Result<(), GpuError> {
        assert!(
            (offset as usize) < total.len(),
            "scan total offset {} outside {} ({} elements)",
            offset,
            total.label(),
            total.len()
        );
        if data.is_empty() {
            total.write_at(ctx, offset as usize, &[0]);
            return Ok(());
        }
        let tier = self.prepare(ctx, data)?;
        self.run(ctx, tier, data, total, offset);
        Ok(())
    }

    /// Exclusive scan of `data` in place, returning the grand total.
    ///
    /// Blocks until the GPU has finished; keep it off the per-frame path.
    pub fn scan_with_total(&mut self, ctx: &GpuContext, data: &DeviceBuffer<u32>) -> Result<u32, GpuError> {
        self.scan(ctx, data)?;
        Ok(self.total.read(ctx)?[0])
    }

    /// Group-sum buffers currently held, one per recursion depth.
    pub fn arena_depth(&self) -> usize {
        self.group_sums.len()
    }

    /// Pick the tier for `data` and size the group-sum arena for every depth.
    fn prepare(&mut self, ctx: &GpuContext, data: &DeviceBuffer<u32>) -> Result<ScanTier, GpuError> {
        let len = data.len() as u32;
        let tier = ScanTier::for_len(len).clamp_to(self.max_threads);
        let levels = level_group_counts(len, tier);
        for (depth, &groups) in levels.iter().enumerate() {
            if self.group_sums.len() <= depth {
                log::debug!("scan arena grows to depth {}", depth);
                self.group_sums
                    .push(DeviceBuffer::new(format!("Scan Group Sums {}", depth)));
            }
            self.group_sums[depth].check_size_changed(ctx, groups as usize)?;
        }
        log::trace!(
            "scan of {} elements: {} threads, {} levels",
            len,
            tier.threads(),
            levels.len()
        );
        Ok(tier)
    }

    fn run(
        &self,
        ctx: &GpuContext,
        tier: ScanTier,
        data: &DeviceBuffer<u32>,
        total: &DeviceBuffer<u32>,
        total_offset: u32,
    ) {
        let kernels = self
            .kernels
            .iter()
            .find(|k| k.tier == tier)
            .unwrap_or_else(|| panic!("no scan kernels built for {:?}", tier));
        self.scan_level(ctx, kernels, data, 0, total, total_offset);
    }

    fn write_params(&self, ctx: &GpuContext, num_elements: u32, group_sum_offset: u32) {
        self.params.write(
            ctx,
            &ScanParams {
                num_elements,
                group_sum_offset,
                _pad0: 0,
                _pad1: 0,
            },
        );
    }

    fn scan_level(
        &self,
        ctx: &GpuContext,
        kernels: &TierKernels,
        data: &DeviceBuffer<u32>,
        depth: usize,
        total: &DeviceBuffer<u32>,
        total_offset: u32,
    ) {
        let per_group = kernels.tier.elements_per_group();
        let len = data.len() as u32;
        let groups = len.div_ceil(per_group);
        let Some(group_sum) = self.group_sums.get(depth) else {
            panic!(
                "scan recursion reached depth {} but only {} group-sum buffers exist",
                depth,
                self.group_sums.len()
            );
        };
        assert_eq!(
            group_sum.len(),
            groups as usize,
            "group-sum buffer at depth {} was not sized for this scan",
            depth
        );

        // Local scans; block totals land in this depth's group sums.
        self.write_params(ctx, len, 0);
        let local = Bindings::new()
            .uniform(Slot::Params, &self.params)
            .buffer(Slot::Data, data)
            .buffer(Slot::GroupSum, group_sum);
        kernels.scan.dispatch_groups(ctx, &local, groups, len);

        if groups <= per_group {
            self.write_params(ctx, groups, total_offset);
            let sums = Bindings::new()
                .uniform(Slot::Params, &self.params)
                .buffer(Slot::Data, group_sum)
                .buffer(Slot::GroupSum, total);
            kernels.scan.dispatch_groups(ctx, &sums, 1, groups);
        } else {
            self.scan_level(ctx, kernels, group_sum, depth + 1, total, total_offset);
        }

        self.write_params(ctx, len, 0);
        kernels.add_group_sum.dispatch_groups(ctx, &local, groups, len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_follows_element_count() {
        assert_eq!(ScanTier::for_len(1), ScanTier::Threads128);
        assert_eq!(ScanTier::for_len(65536), ScanTier::Threads128);
        assert_eq!(ScanTier::for_len(65537), ScanTier::Threads256);
        assert_eq!(ScanTier::for_len(262144), ScanTier::Threads256);
        assert_eq!(ScanTier::for_len(262145), ScanTier::Threads512);
    }

    #[test]
    fn tier_clamps_to_device_limit() {
        assert_eq!(ScanTier::Threads512.clamp_to(256), ScanTier::Threads256);
        assert_eq!(ScanTier::Threads512.clamp_to(1024), ScanTier::Threads512);
        assert_eq!(ScanTier::Threads256.clamp_to(128), ScanTier::Threads128);
        assert_eq!(ScanTier::Threads128.clamp_to(512), ScanTier::Threads128);
    }

    #[test]
    fn single_block_needs_one_level() {
        assert_eq!(level_group_counts(1, ScanTier::Threads128), vec![1]);
        assert_eq!(level_group_counts(256, ScanTier::Threads128), vec![1]);
        assert_eq!(level_group_counts(257, ScanTier::Threads128), vec![2]);
    }

    #[test]
    fn recursion_starts_past_one_block_of_groups() {
        // 256 groups of 256 still fit one level.
        assert_eq!(level_group_counts(65536, ScanTier::Threads128), vec![256]);
        assert_eq!(level_group_counts(65537, ScanTier::Threads128), vec![257, 2]);
        assert_eq!(level_group_counts(300000, ScanTier::Threads512), vec![293]);
        let deep = level_group_counts(u32::MAX, ScanTier::Threads128);
        assert_eq!(deep, vec![16777216, 65536, 256]);
    }
}
