//! Kernel dispatch tests: Jacobi-style ping-pong parity and chunked
//! dispatch, driven by a one-line increment kernel.

mod common;

use common::gpu;
use fluid_gpu::gpu::kernel::{bind, ping_pong, Access, Bindings, ComputeKernel, KernelSpec, Slot, MAX_DISPATCH_SIZE};
use fluid_gpu::{DoubleBuffer, GpuContext};

const INCREMENT_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> values_in: array<u32>;
@group(0) @binding(1) var<storage, read_write> values_out: array<u32>;

@compute @workgroup_size(64)
fn increment(
    @builtin(workgroup_id) wid: vec3<u32>,
    @builtin(local_invocation_index) lid: u32,
) {
    let i = thread_index(wid, lid, 64u);
    if (i >= dispatch_info.num_threads) {
        return;
    }
    values_out[i] = values_in[i] + 1u;
}
"#;

const INCREMENT: KernelSpec = KernelSpec {
    entry_point: "increment",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::DataIn, Access::ReadOnly),
        bind(1, Slot::DataOut, Access::ReadWrite),
    ],
};

fn increment_kernel(ctx: &GpuContext) -> ComputeKernel {
    let source = format!(
        "{}\n{}",
        include_str!("../src/gpu/shaders/dispatch.wgsl"),
        INCREMENT_WGSL
    );
    let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Increment"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    ComputeKernel::new(ctx, &module, "Increment", &INCREMENT)
}

fn counting_field(ctx: &GpuContext, len: usize) -> DoubleBuffer<u32> {
    let mut field = DoubleBuffer::new("Counting");
    field.init(ctx, len).unwrap();
    let values: Vec<u32> = (0..len as u32).collect();
    field.read().write(ctx, &values);
    field
}

#[test]
fn ping_pong_result_ends_on_the_read_side() {
    let Some(ctx) = gpu() else { return };
    let kernel = increment_kernel(&ctx);

    for iterations in [0u32, 1, 4, 7] {
        let mut field = counting_field(&ctx, 1000);
        ping_pong(&ctx, &kernel, &Bindings::new(), &mut field, (Slot::DataIn, Slot::DataOut), iterations);

        let result = field.read().read(&ctx).unwrap();
        for (i, &v) in result.iter().enumerate() {
            assert_eq!(v, i as u32 + iterations, "{} iterations, element {}", iterations, i);
        }
        if iterations > 0 {
            // The other side holds the previous sweep.
            let previous = field.write().read(&ctx).unwrap();
            assert_eq!(previous[10], 10 + iterations - 1);
        }
    }
}

#[test]
fn ping_pong_across_dispatch_chunks() {
    let Some(ctx) = gpu() else { return };
    let kernel = increment_kernel(&ctx);
    // A few groups past one chunk.
    let len = (MAX_DISPATCH_SIZE as usize + 65) * 64;
    let mut field = counting_field(&ctx, len);

    ping_pong(&ctx, &kernel, &Bindings::new(), &mut field, (Slot::DataIn, Slot::DataOut), 3);

    let boundary = MAX_DISPATCH_SIZE as usize * 64;
    for start in [0, boundary - 2, len - 3] {
        let values = field.read().read_range(&ctx, start, 3).unwrap();
        let expected: Vec<u32> = (start as u32..start as u32 + 3).map(|v| v + 3).collect();
        assert_eq!(values, expected, "elements from {}", start);
    }
}

#[test]
fn copy_read_to_write_syncs_both_sides() {
    let Some(ctx) = gpu() else { return };
    let kernel = increment_kernel(&ctx);
    let mut field = counting_field(&ctx, 256);
    ping_pong(&ctx, &kernel, &Bindings::new(), &mut field, (Slot::DataIn, Slot::DataOut), 1);
    assert_ne!(field.read().read(&ctx).unwrap(), field.write().read(&ctx).unwrap());

    field.copy_read_to_write(&ctx);

    let read = field.read().read(&ctx).unwrap();
    assert_eq!(read, field.write().read(&ctx).unwrap());
    assert_eq!(read[255], 256);
}
