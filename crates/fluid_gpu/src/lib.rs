//! wgpu compute layer of the fluid simulators.
//!
//! [`gpu`] holds the device context, buffers, the typed kernel dispatcher,
//! the scan/sort/filter engines and the two orchestrators. The most used
//! types are re-exported here.

pub mod gpu;

pub use gpu::buffer::{DeviceBuffer, DoubleBuffer, UniformBuffer};
pub use gpu::filtering::{FilterPredicate, StreamCompaction};
pub use gpu::flip_3d::FlipSimulation;
pub use gpu::grid_sort::GridSortHelper;
pub use gpu::prefix_scan::PrefixScan;
pub use gpu::radix_sort::RadixSort;
pub use gpu::smoke_3d::SmokeSimulation;
pub use gpu::{GpuContext, GpuError};
