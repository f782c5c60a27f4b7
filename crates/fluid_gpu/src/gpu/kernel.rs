//! Typed compute kernel dispatcher.
//!
//! A kernel is one WGSL entry point plus the resources it expects. The
//! expectations are written down once, as a [`KernelSpec`] naming each
//! binding by [`Slot`] together with its [`Access`]; the bind group layout
//! is generated from that list, and a dispatch resolves every slot from a
//! [`Bindings`] table. A slot the caller forgot to provide is a bug and
//! panics with the kernel and slot name instead of surfacing as a wgpu
//! validation error.
//!
//! ```ignore
//! const SCAN: KernelSpec = KernelSpec {
//!     entry_point: "prefix_scan",
//!     workgroup_size: 128,
//!     bindings: &[
//!         bind(0, Slot::Params, Access::Uniform),
//!         bind(1, Slot::Data, Access::ReadWrite),
//!         bind(2, Slot::GroupSum, Access::ReadWrite),
//!     ],
//! };
//! let kernel = ComputeKernel::new(ctx, &module, "Prefix Scan", &SCAN);
//! kernel.dispatch(ctx, &Bindings::new().uniform(Slot::Params, &params)...
//! ```
//!
//! Every kernel also owns a small uniform at `@group(1) @binding(0)`
//! carrying [`DispatchInfo`]. Group counts above [`MAX_DISPATCH_SIZE`] are
//! split into several dispatches, each told its `group_offset`, so kernels
//! index with `(workgroup_id.x + group_offset) * size + local_index`.

use bytemuck::Pod;

use super::buffer::{DeviceBuffer, DoubleBuffer, UniformBuffer};
use super::params::DispatchInfo;
use super::GpuContext;

/// Largest group count issued in a single `dispatch_workgroups` call.
pub const MAX_DISPATCH_SIZE: u32 = 65535;

/// Named resource roles shared by host code and kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Constants,
    Params,
    /// Second uniform block for kernels that read two
    Force,
    // Scan, sort and filter
    Data,
    DataIn,
    DataOut,
    GroupSum,
    FirstIndex,
    GroupCount,
    GlobalPrefix,
    // Grid sort
    ObjectIn,
    ObjectOut,
    Pairs,
    GridIndex,
    // Particles
    Particles,
    RenderParticles,
    // Grid fields
    GridType,
    GridVelocity,
    GridOriginalVelocity,
    GridDivergence,
    PressureIn,
    PressureOut,
    DiffusionIn,
    DiffusionOut,
    GridUintWeight,
    GridGhostWeight,
    GridPositionModify,
    // Smoke fields
    VelocityIn,
    VelocityOut,
    DensityIn,
    DensityOut,
    TemperatureIn,
    TemperatureOut,
    Vorticity,
    Boundary,
    DensityTexture,
}

/// How a kernel accesses a binding; must match the WGSL declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Uniform,
    ReadOnly,
    ReadWrite,
    /// `texture_storage_3d<format, write>`
    WriteTexture3D(wgpu::TextureFormat),
}

/// One entry of a kernel's binding table.
#[derive(Clone, Copy, Debug)]
pub struct BindingDecl {
    pub binding: u32,
    pub slot: Slot,
    pub access: Access,
}

pub const fn bind(binding: u32, slot: Slot, access: Access) -> BindingDecl {
    BindingDecl {
        binding,
        slot,
        access,
    }
}

/// Static description of a compute entry point and its bindings in group 0.
#[derive(Clone, Copy, Debug)]
pub struct KernelSpec {
    pub entry_point: &'static str,
    /// Must equal the entry point's `@workgroup_size` x (y and z are 1)
    pub workgroup_size: u32,
    pub bindings: &'static [BindingDecl],
}

fn layout_entry(decl: &BindingDecl) -> wgpu::BindGroupLayoutEntry {
    let ty = match decl.access {
        Access::Uniform => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        Access::ReadOnly | Access::ReadWrite => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage {
                read_only: decl.access == Access::ReadOnly,
            },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        Access::WriteTexture3D(format) => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D3,
        },
    };
    wgpu::BindGroupLayoutEntry {
        binding: decl.binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty,
        count: None,
    }
}

/// Resources for one dispatch, keyed by slot.
#[derive(Default, Clone)]
pub struct Bindings<'a> {
    entries: Vec<(Slot, wgpu::BindingResource<'a>)>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer<T: Pod>(mut self, slot: Slot, buffer: &'a DeviceBuffer<T>) -> Self {
        self.entries.push((slot, buffer.raw().as_entire_binding()));
        self
    }

    pub fn uniform<T: Pod>(mut self, slot: Slot, buffer: &'a UniformBuffer<T>) -> Self {
        self.entries.push((slot, buffer.raw().as_entire_binding()));
        self
    }

    pub fn texture(mut self, slot: Slot, view: &'a wgpu::TextureView) -> Self {
        self.entries.push((slot, wgpu::BindingResource::TextureView(view)));
        self
    }

    /// Later entries win, so a base table can be extended per dispatch.
    fn get(&self, slot: Slot) -> Option<&wgpu::BindingResource<'a>> {
        self.entries.iter().rev().find(|(s, _)| *s == slot).map(|(_, r)| r)
    }
}

/// Number of groups needed to cover `num_threads`.
pub fn group_count(num_threads: u32, group_size: u32) -> u32 {
    num_threads.div_ceil(group_size)
}

/// Split `num_groups` into `(group_offset, count)` chunks of at most
/// [`MAX_DISPATCH_SIZE`] groups.
pub fn dispatch_chunks(num_groups: u32) -> impl Iterator<Item = (u32, u32)> {
    (0..num_groups)
        .step_by(MAX_DISPATCH_SIZE as usize)
        .map(move |offset| (offset, (num_groups - offset).min(MAX_DISPATCH_SIZE)))
}

/// A compute pipeline built from a [`KernelSpec`].
pub struct ComputeKernel {
    label: String,
    spec: KernelSpec,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    dispatch_info: UniformBuffer<DispatchInfo>,
    dispatch_bind_group: wgpu::BindGroup,
}

impl ComputeKernel {
    pub fn new(ctx: &GpuContext, module: &wgpu::ShaderModule, label: &str, spec: &KernelSpec) -> Self {
        let device = &ctx.device;
        let entries: Vec<_> = spec.bindings.iter().map(layout_entry).collect();
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Layout", label)),
            entries: &entries,
        });

        let dispatch_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Dispatch Layout", label)),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let dispatch_info = UniformBuffer::new(ctx, &format!("{} Dispatch Info", label));
        let dispatch_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Dispatch Bind Group", label)),
            layout: &dispatch_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: dispatch_info.raw().as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", label)),
            bind_group_layouts: &[&layout, &dispatch_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some(spec.entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            label: label.to_string(),
            spec: *spec,
            pipeline,
            layout,
            dispatch_info,
            dispatch_bind_group,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn workgroup_size(&self) -> u32 {
        self.spec.workgroup_size
    }

    /// Resolve every declared slot from `bindings` into a bind group for
    /// this kernel's layout.
    pub fn bind_group(&self, ctx: &GpuContext, bindings: &Bindings<'_>) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = self
            .spec
            .bindings
            .iter()
            .map(|decl| {
                let resource = bindings.get(decl.slot).unwrap_or_else(|| {
                    panic!(
                        "kernel `{}` ({}) dispatched without a binding for {:?}",
                        self.label, self.spec.entry_point, decl.slot
                    )
                });
                wgpu::BindGroupEntry {
                    binding: decl.binding,
                    resource: resource.clone(),
                }
            })
            .collect();
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.label),
            layout: &self.layout,
            entries: &entries,
        })
    }

    /// Run one thread per element for `num_threads` elements.
    pub fn dispatch(&self, ctx: &GpuContext, bindings: &Bindings<'_>, num_threads: u32) {
        let groups = group_count(num_threads, self.spec.workgroup_size);
        self.dispatch_groups(ctx, bindings, groups, num_threads);
    }

    /// Run `num_groups` groups; `num_threads` is passed through to the
    /// kernel as its logical element count.
    pub fn dispatch_groups(
        &self,
        ctx: &GpuContext,
        bindings: &Bindings<'_>,
        num_groups: u32,
        num_threads: u32,
    ) {
        if num_groups == 0 {
            return;
        }
        let bind_group = self.bind_group(ctx, bindings);
        self.dispatch_bound(ctx, &bind_group, num_groups, num_threads);
    }

    fn write_dispatch_info(&self, ctx: &GpuContext, group_offset: u32, num_groups: u32, num_threads: u32) {
        self.dispatch_info.write(
            ctx,
            &DispatchInfo {
                num_threads,
                group_offset,
                num_groups,
                _pad: 0,
            },
        );
    }

    /// Dispatch with a prebuilt bind group, one submit per chunk.
    fn dispatch_bound(&self, ctx: &GpuContext, bind_group: &wgpu::BindGroup, num_groups: u32, num_threads: u32) {
        for (group_offset, count) in dispatch_chunks(num_groups) {
            // Written before the submit below, so this chunk sees its own offset.
            self.write_dispatch_info(ctx, group_offset, num_groups, num_threads);
            ctx.submit_with(&self.label, |encoder| {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(&self.label),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.set_bind_group(1, &self.dispatch_bind_group, &[]);
                pass.dispatch_workgroups(count, 1, 1);
            });
        }
    }
}

/// Run `kernel` `iterations` times over `field`, one thread per element.
///
/// Each iteration binds the read side as `input` and the write side as
/// `output` on top of `base`, then swaps, so the result ends up in
/// `field.read()`. Only two bind groups are built, one per parity. When
/// the field fits in a single chunk every sweep shares the same dispatch
/// info and all of them go out as consecutive dispatches of one pass.
pub fn ping_pong<T: Pod>(
    ctx: &GpuContext,
    kernel: &ComputeKernel,
    base: &Bindings<'_>,
    field: &mut DoubleBuffer<T>,
    (input, output): (Slot, Slot),
    iterations: u32,
) {
    let len = field.len() as u32;
    let groups = group_count(len, kernel.spec.workgroup_size);
    if iterations == 0 || groups == 0 {
        return;
    }
    let even = kernel.bind_group(
        ctx,
        &base.clone().buffer(input, field.read()).buffer(output, field.write()),
    );
    let odd = kernel.bind_group(
        ctx,
        &base.clone().buffer(input, field.write()).buffer(output, field.read()),
    );
    let parity = |i: u32| if i % 2 == 0 { &even } else { &odd };

    if groups <= MAX_DISPATCH_SIZE {
        kernel.write_dispatch_info(ctx, 0, groups, len);
        ctx.submit_with(&kernel.label, |encoder| {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&kernel.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(1, &kernel.dispatch_bind_group, &[]);
            for i in 0..iterations {
                pass.set_bind_group(0, parity(i), &[]);
                pass.dispatch_workgroups(groups, 1, 1);
            }
        });
    } else {
        for i in 0..iterations {
            kernel.dispatch_bound(ctx, parity(i), groups, len);
        }
    }

    if iterations % 2 == 1 {
        field.swap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_count_rounds_up() {
        assert_eq!(group_count(0, 64), 0);
        assert_eq!(group_count(1, 64), 1);
        assert_eq!(group_count(64, 64), 1);
        assert_eq!(group_count(65, 64), 2);
    }

    #[test]
    fn small_dispatch_is_one_chunk() {
        assert_eq!(dispatch_chunks(10).collect::<Vec<_>>(), vec![(0, 10)]);
        assert_eq!(dispatch_chunks(0).count(), 0);
    }

    #[test]
    fn large_dispatch_is_split_at_ceiling() {
        let chunks: Vec<_> = dispatch_chunks(2 * MAX_DISPATCH_SIZE + 7).collect();
        assert_eq!(
            chunks,
            vec![
                (0, MAX_DISPATCH_SIZE),
                (MAX_DISPATCH_SIZE, MAX_DISPATCH_SIZE),
                (2 * MAX_DISPATCH_SIZE, 7)
            ]
        );
    }

    #[test]
    fn storage_access_maps_to_read_only_flag() {
        let entry = layout_entry(&bind(3, Slot::Data, Access::ReadOnly));
        assert_eq!(entry.binding, 3);
        assert!(matches!(
            entry.ty,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                ..
            }
        ));
    }
}
