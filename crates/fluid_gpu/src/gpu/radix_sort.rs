//! Stable 4-way GPU radix sort of (key, value) pairs.
//!
//! Each pass consumes two key bits:
//! 1. `radix_sort_local` splits every group of 128 pairs into 4 buckets and
//!    records each bucket's local start and size
//! 2. The bucket sizes, laid out digit-major, are exclusive-scanned so every
//!    (digit, group) gets its global output offset
//! 3. `global_shuffle` scatters the locally sorted pairs back into place
//!
//! The pass count follows the bit length of `max_key`, so callers should
//! pass the tightest bound they know.

use fluid_core::KeyValue;

use super::buffer::{DeviceBuffer, UniformBuffer};
use super::kernel::{bind, group_count, Access, Bindings, ComputeKernel, KernelSpec, Slot};
use super::params::SortParams;
use super::prefix_scan::PrefixScan;
use super::shaders::ShaderId;
use super::{GpuContext, GpuError};

/// Pairs handled by one sort group.
pub const SORT_GROUP_SIZE: u32 = 128;

const LOCAL_SORT: KernelSpec = KernelSpec {
    entry_point: "radix_sort_local",
    workgroup_size: SORT_GROUP_SIZE,
    bindings: &[
        bind(0, Slot::Params, Access::Uniform),
        bind(1, Slot::DataIn, Access::ReadOnly),
        bind(2, Slot::DataOut, Access::ReadWrite),
        bind(3, Slot::FirstIndex, Access::ReadWrite),
        bind(4, Slot::GroupSum, Access::ReadWrite),
    ],
};

const GLOBAL_SHUFFLE: KernelSpec = KernelSpec {
    entry_point: "global_shuffle",
    ..LOCAL_SORT
};

/// Two-bit passes needed to cover every bit of `max_key`; at least one.
pub fn pass_count(max_key: u32) -> u32 {
    let bits = (u32::BITS - max_key.leading_zeros()).max(1);
    bits.div_ceil(2)
}

pub struct RadixSort {
    local_sort: ComputeKernel,
    global_shuffle: ComputeKernel,
    scan: PrefixScan,
    params: UniformBuffer<SortParams>,
    temp: DeviceBuffer<KeyValue>,
    first_index: DeviceBuffer<u32>,
    group_sum: DeviceBuffer<u32>,
}

impl RadixSort {
    pub fn new(ctx: &GpuContext) -> Result<Self, GpuError> {
        let module = ShaderId::RadixSort.create_module(ctx);
        Ok(Self {
            local_sort: ComputeKernel::new(ctx, &module, "Radix Sort Local", &LOCAL_SORT),
            global_shuffle: ComputeKernel::new(ctx, &module, "Radix Sort Shuffle", &GLOBAL_SHUFFLE),
            scan: PrefixScan::new(ctx)?,
            params: UniformBuffer::new(ctx, "Radix Sort Params"),
            temp: DeviceBuffer::new("Radix Sort Temp"),
            first_index: DeviceBuffer::new("Radix Sort First Index"),
            group_sum: DeviceBuffer::new("Radix Sort Group Sum"),
        })
    }

    /// Sort all of `data` by key, ascending and stable. Every key must be
    /// at most `max_key`.
    pub fn sort(&mut self, ctx: &GpuContext, data: &DeviceBuffer<KeyValue>, max_key: u32) -> Result<(), GpuError> {
        let len = data.len() as u32;
        if len == 0 {
            return Ok(());
        }
        let groups = group_count(len, SORT_GROUP_SIZE);
        self.temp.ensure_capacity(ctx, len as usize)?;
        self.first_index.ensure_capacity(ctx, 4 * groups as usize)?;
        // Scanned as a whole, so it must be exactly 4 entries per group.
        self.group_sum.check_size_changed(ctx, 4 * groups as usize)?;

        let passes = pass_count(max_key);
        log::trace!("radix sort of {} pairs: {} passes", len, passes);

        for pass in 0..passes {
            self.params.write(
                ctx,
                &SortParams {
                    num_elements: len,
                    num_groups: groups,
                    bit_shift: pass * 2,
                    _pad: 0,
                },
            );
            let local = Bindings::new()
                .uniform(Slot::Params, &self.params)
                .buffer(Slot::FirstIndex, &self.first_index)
                .buffer(Slot::GroupSum, &self.group_sum)
                .buffer(Slot::DataIn, data)
                .buffer(Slot::DataOut, &self.temp);
            self.local_sort.dispatch_groups(ctx, &local, groups, len);

            self.scan.scan(ctx, &self.group_sum)?;

            let shuffle = Bindings::new()
                .uniform(Slot::Params, &self.params)
                .buffer(Slot::FirstIndex, &self.first_index)
                .buffer(Slot::GroupSum, &self.group_sum)
                .buffer(Slot::DataIn, &self.temp)
                .buffer(Slot::DataOut, data);
            self.global_shuffle.dispatch_groups(ctx, &shuffle, groups, len);
        }
        Ok(())
    }

    pub fn release(&mut self) {
        self.temp.release();
        self.first_index.release();
        self.group_sum.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_count_follows_bit_length() {
        assert_eq!(pass_count(0), 1);
        assert_eq!(pass_count(1), 1);
        assert_eq!(pass_count(3), 1);
        assert_eq!(pass_count(4), 2);
        assert_eq!(pass_count(63), 3);
        assert_eq!(pass_count(64), 4);
        assert_eq!(pass_count(u32::MAX), 16);
    }
}
