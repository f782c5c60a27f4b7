//! Buckets objects into grid cells on the GPU.
//!
//! Each step the objects are keyed by the cell containing their position,
//! the (cell, object) pairs are radix sorted, the per-cell
//! `(first, count)` table is rebuilt from the runs of equal keys, and the
//! objects are rearranged into cell order.

use std::marker::PhantomData;

use fluid_core::{CellRange, GridLayout, GridObject, KeyValue};

use super::buffer::{DeviceBuffer, DoubleBuffer, UniformBuffer};
use super::kernel::{bind, Access, Bindings, ComputeKernel, KernelSpec, Slot};
use super::params::GridSortParams;
use super::radix_sort::RadixSort;
use super::shaders::ShaderId;
use super::{GpuContext, GpuError};

const GROUP_SIZE: u32 = 128;

const MAKE_PAIRS: KernelSpec = KernelSpec {
    entry_point: "make_pairs",
    workgroup_size: GROUP_SIZE,
    bindings: &[
        bind(0, Slot::Params, Access::Uniform),
        bind(1, Slot::ObjectIn, Access::ReadOnly),
        bind(3, Slot::Pairs, Access::ReadWrite),
    ],
};

const INDEX_BINDINGS: &[super::kernel::BindingDecl] = &[
    bind(0, Slot::Params, Access::Uniform),
    bind(3, Slot::Pairs, Access::ReadWrite),
    bind(4, Slot::GridIndex, Access::ReadWrite),
];

const CLEAR_GRID_INDEX: KernelSpec = KernelSpec {
    entry_point: "clear_grid_index",
    workgroup_size: GROUP_SIZE,
    bindings: INDEX_BINDINGS,
};

const SET_GRID_INDEX: KernelSpec = KernelSpec {
    entry_point: "set_grid_index",
    ..CLEAR_GRID_INDEX
};

const FINALIZE_GRID_INDEX: KernelSpec = KernelSpec {
    entry_point: "finalize_grid_index",
    ..CLEAR_GRID_INDEX
};

const REARRANGE: KernelSpec = KernelSpec {
    entry_point: "rearrange",
    workgroup_size: GROUP_SIZE,
    bindings: &[
        bind(0, Slot::Params, Access::Uniform),
        bind(1, Slot::ObjectIn, Access::ReadOnly),
        bind(2, Slot::ObjectOut, Access::ReadWrite),
        bind(3, Slot::Pairs, Access::ReadWrite),
    ],
};

/// Grid sort for one object type.
pub struct GridSortHelper<T: GridObject> {
    make_pairs: ComputeKernel,
    clear_grid_index: ComputeKernel,
    set_grid_index: ComputeKernel,
    finalize_grid_index: ComputeKernel,
    rearrange: ComputeKernel,
    sort: RadixSort,
    params: UniformBuffer<GridSortParams>,
    pairs: DeviceBuffer<KeyValue>,
    _marker: PhantomData<T>,
}

impl<T: GridObject> GridSortHelper<T> {
    const WORDS_PER_OBJECT: u32 = (std::mem::size_of::<T>() / 4) as u32;

    pub fn new(ctx: &GpuContext) -> Result<Self, GpuError> {
        assert!(
            std::mem::size_of::<T>() % 4 == 0 && T::POSITION_WORD + 3 <= Self::WORDS_PER_OBJECT,
            "grid objects must be whole words with the position inside the object"
        );
        let module = ShaderId::GridSort.create_module(ctx);
        Ok(Self {
            make_pairs: ComputeKernel::new(ctx, &module, "Grid Sort Make Pairs", &MAKE_PAIRS),
            clear_grid_index: ComputeKernel::new(ctx, &module, "Grid Sort Clear Index", &CLEAR_GRID_INDEX),
            set_grid_index: ComputeKernel::new(ctx, &module, "Grid Sort Set Index", &SET_GRID_INDEX),
            finalize_grid_index: ComputeKernel::new(
                ctx,
                &module,
                "Grid Sort Finalize Index",
                &FINALIZE_GRID_INDEX,
            ),
            rearrange: ComputeKernel::new(ctx, &module, "Grid Sort Rearrange", &REARRANGE),
            sort: RadixSort::new(ctx)?,
            params: UniformBuffer::new(ctx, "Grid Sort Params"),
            pairs: DeviceBuffer::new("Grid Sort Pairs"),
            _marker: PhantomData,
        })
    }

    /// Sort `objects` into cell order and rebuild `grid_index`.
    ///
    /// The sorted objects end up in `objects.read()`. Cells without objects
    /// get [`CellRange::EMPTY`].
    pub fn sort(
        &mut self,
        ctx: &GpuContext,
        objects: &mut DoubleBuffer<T>,
        grid_index: &DeviceBuffer<CellRange>,
        layout: &GridLayout,
    ) -> Result<(), GpuError> {
        let num_cells = layout.num_cells();
        assert_eq!(
            grid_index.len(),
            num_cells as usize,
            "grid index has {} entries for {} cells",
            grid_index.len(),
            num_cells
        );
        let num_objects = objects.len() as u32;
        self.pairs.check_size_changed(ctx, num_objects as usize)?;

        self.params.write(
            ctx,
            &GridSortParams {
                grid_min: layout.min.to_array(),
                num_objects,
                grid_inv_spacing: layout.inv_spacing().to_array(),
                words_per_object: Self::WORDS_PER_OBJECT,
                grid_size: layout.size.to_array(),
                position_word: T::POSITION_WORD,
            },
        );

        let pairs = Bindings::new()
            .uniform(Slot::Params, &self.params)
            .buffer(Slot::ObjectIn, objects.read())
            .buffer(Slot::Pairs, &self.pairs);
        self.make_pairs.dispatch(ctx, &pairs, num_objects);

        self.sort.sort(ctx, &self.pairs, num_cells - 1)?;

        let index = Bindings::new()
            .uniform(Slot::Params, &self.params)
            .buffer(Slot::Pairs, &self.pairs)
            .buffer(Slot::GridIndex, grid_index);
        self.clear_grid_index.dispatch(ctx, &index, num_cells);
        self.set_grid_index.dispatch(ctx, &index, num_objects);
        self.finalize_grid_index.dispatch(ctx, &index, num_cells);

        let rearrange = Bindings::new()
            .uniform(Slot::Params, &self.params)
            .buffer(Slot::Pairs, &self.pairs)
            .buffer(Slot::ObjectIn, objects.read())
            .buffer(Slot::ObjectOut, objects.write());
        self.rearrange.dispatch(ctx, &rearrange, num_objects);
        objects.swap();
        Ok(())
    }

    /// The sorted (cell, object) pairs from the last [`GridSortHelper::sort`].
    pub fn pairs(&self) -> &DeviceBuffer<KeyValue> {
        &self.pairs
    }

    pub fn release(&mut self) {
        self.pairs.release();
        self.sort.release();
    }
}
