//! Stable stream compaction of `u32` buffers.
//!
//! Kept values move to the front of the buffer in their original order;
//! whatever follows the kept prefix is unspecified. Built from a per-group
//! compaction, a prefix scan of the per-group counts and a global scatter.

use super::buffer::{DeviceBuffer, UniformBuffer};
use super::kernel::{bind, group_count, Access, Bindings, ComputeKernel, KernelSpec, Slot};
use super::params::FilterParams;
use super::prefix_scan::PrefixScan;
use super::shaders::ShaderId;
use super::{GpuContext, GpuError};

const COMPACT_GROUP_SIZE: u32 = 128;

const COMPACT_LOCAL: KernelSpec = KernelSpec {
    entry_point: "compact_local",
    workgroup_size: COMPACT_GROUP_SIZE,
    bindings: &[
        bind(0, Slot::Params, Access::Uniform),
        bind(1, Slot::DataIn, Access::ReadOnly),
        bind(2, Slot::DataOut, Access::ReadWrite),
        bind(3, Slot::GroupCount, Access::ReadWrite),
        bind(4, Slot::GlobalPrefix, Access::ReadWrite),
    ],
};

const COMPACT_SCATTER: KernelSpec = KernelSpec {
    entry_point: "compact_scatter",
    ..COMPACT_LOCAL
};

/// Which values a filter keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterPredicate {
    NonZero,
    Equal(u32),
    NotEqual(u32),
    Less(u32),
}

impl FilterPredicate {
    /// `(predicate code, operand)` as the kernel reads them.
    fn encode(self) -> (u32, u32) {
        match self {
            FilterPredicate::NonZero => (0, 0),
            FilterPredicate::Equal(v) => (1, v),
            FilterPredicate::NotEqual(v) => (2, v),
            FilterPredicate::Less(v) => (3, v),
        }
    }

    pub fn keeps(self, value: u32) -> bool {
        match self {
            FilterPredicate::NonZero => value != 0,
            FilterPredicate::Equal(v) => value == v,
            FilterPredicate::NotEqual(v) => value != v,
            FilterPredicate::Less(v) => value < v,
        }
    }
}

pub struct StreamCompaction {
    compact_local: ComputeKernel,
    compact_scatter: ComputeKernel,
    scan: PrefixScan,
    params: UniformBuffer<FilterParams>,
    temp: DeviceBuffer<u32>,
    group_count: DeviceBuffer<u32>,
    global_prefix: DeviceBuffer<u32>,
    count: DeviceBuffer<u32>,
}

impl StreamCompaction {
    pub fn new(ctx: &GpuContext) -> Result<Self, GpuError> {
        let module = ShaderId::StreamCompaction.create_module(ctx);
        Ok(Self {
            compact_local: ComputeKernel::new(ctx, &module, "Compact Local", &COMPACT_LOCAL),
            compact_scatter: ComputeKernel::new(ctx, &module, "Compact Scatter", &COMPACT_SCATTER),
            scan: PrefixScan::new(ctx)?,
            params: UniformBuffer::new(ctx, "Filter Params"),
            temp: DeviceBuffer::new("Filter Temp"),
            group_count: DeviceBuffer::new("Filter Group Count"),
            global_prefix: DeviceBuffer::new("Filter Global Prefix"),
            count: DeviceBuffer::with_len(ctx, "Filter Count", 1)?,
        })
    }

    /// Compact `data` in place and return how many values were kept
    /// (zero for an empty buffer).
    ///
    /// Reads the count back, so this waits for the GPU.
    pub fn filter(
        &mut self,
        ctx: &GpuContext,
        data: &DeviceBuffer<u32>,
        predicate: FilterPredicate,
    ) -> Result<u32, GpuError> {
        self.encode_filter(ctx, data, predicate, None)?;
        Ok(self.count.read(ctx)?[0])
    }

    /// Compact `data` in place, writing the kept count to `count[offset]`
    /// on the GPU.
    pub fn filter_into(
        &mut self,
        ctx: &GpuContext,
        data: &DeviceBuffer<u32>,
        predicate: FilterPredicate,
        count: &DeviceBuffer<u32>,
        offset: u32,
    ) -> Result<(), GpuError> {
        self.encode_filter(ctx, data, predicate, Some((count, offset)))
    }

    fn encode_filter(
        &mut self,
        ctx: &GpuContext,
        data: &DeviceBuffer<u32>,
        predicate: FilterPredicate,
        count_target: Option<(&DeviceBuffer<u32>, u32)>,
    ) -> Result<(), GpuError> {
        let len = data.len() as u32;
        if len == 0 {
            let (count, offset) = count_target.unwrap_or((&self.count, 0));
            count.write_at(ctx, offset as usize, &[0]);
            return Ok(());
        }
        let groups = group_count(len, COMPACT_GROUP_SIZE);
        self.temp.ensure_capacity(ctx, len as usize)?;
        self.group_count.ensure_capacity(ctx, groups as usize)?;
        self.global_prefix.check_size_changed(ctx, groups as usize)?;

        let (code, operand) = predicate.encode();
        self.params.write(
            ctx,
            &FilterParams {
                num_elements: len,
                num_groups: groups,
                predicate: code,
                operand,
            },
        );

        let local = Bindings::new()
            .uniform(Slot::Params, &self.params)
            .buffer(Slot::GroupCount, &self.group_count)
            .buffer(Slot::GlobalPrefix, &self.global_prefix)
            .buffer(Slot::DataIn, data)
            .buffer(Slot::DataOut, &self.temp);
        self.compact_local.dispatch_groups(ctx, &local, groups, len);

        match count_target {
            Some((count, offset)) => self.scan.scan_into(ctx, &self.global_prefix, count, offset)?,
            None => self.scan.scan_into(ctx, &self.global_prefix, &self.count, 0)?,
        }

        let scatter = Bindings::new()
            .uniform(Slot::Params, &self.params)
            .buffer(Slot::GroupCount, &self.group_count)
            .buffer(Slot::GlobalPrefix, &self.global_prefix)
            .buffer(Slot::DataIn, &self.temp)
            .buffer(Slot::DataOut, data);
        self.compact_scatter.dispatch_groups(ctx, &scatter, groups, len);
        Ok(())
    }

    pub fn release(&mut self) {
        self.temp.release();
        self.group_count.release();
        self.global_prefix.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_their_names() {
        assert!(FilterPredicate::NonZero.keeps(3));
        assert!(!FilterPredicate::NonZero.keeps(0));
        assert!(FilterPredicate::Equal(2).keeps(2));
        assert!(!FilterPredicate::Equal(2).keeps(1));
        assert!(FilterPredicate::NotEqual(2).keeps(1));
        assert!(FilterPredicate::Less(5).keeps(4));
        assert!(!FilterPredicate::Less(5).keeps(5));
    }

    #[test]
    fn predicate_codes_match_kernel() {
        assert_eq!(FilterPredicate::NonZero.encode(), (0, 0));
        assert_eq!(FilterPredicate::Equal(7).encode(), (1, 7));
        assert_eq!(FilterPredicate::NotEqual(7).encode(), (2, 7));
        assert_eq!(FilterPredicate::Less(7).encode(), (3, 7));
    }
}
