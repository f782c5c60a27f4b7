//! GPU scan, radix sort, stream compaction and buffer tests, checked
//! against the serial versions in `fluid_core::reference`.

mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use common::{gpu, random_u32s};
use fluid_core::reference;
use fluid_core::KeyValue;
use fluid_gpu::gpu::radix_sort::pass_count;
use fluid_gpu::{DeviceBuffer, DoubleBuffer, FilterPredicate, GpuContext, PrefixScan, RadixSort, StreamCompaction};
use proptest::prelude::*;

fn gpu_scan(ctx: &GpuContext, scan: &mut PrefixScan, input: &[u32]) -> (Vec<u32>, u32) {
    let data = DeviceBuffer::from_slice(ctx, "Scan Test Data", input).unwrap();
    let total = scan.scan_with_total(ctx, &data).unwrap();
    (data.read(ctx).unwrap(), total)
}

#[test]
fn scan_matches_reference_across_tiers_and_levels() {
    let Some(ctx) = gpu() else { return };
    let mut scan = PrefixScan::new(&ctx).unwrap();

    for (i, &n) in [1usize, 127, 128, 129, 65536, 65537, 300_000].iter().enumerate() {
        let input = random_u32s(n, 16, i as u64);
        let (expected, expected_total) = reference::exclusive_scan(&input);
        let (output, total) = gpu_scan(&ctx, &mut scan, &input);
        assert_eq!(total, expected_total, "total for N = {}", n);
        if let Some(at) = output.iter().zip(&expected).position(|(a, b)| a != b) {
            panic!("N = {}: first mismatch at {}: {} != {}", n, at, output[at], expected[at]);
        }
    }
}

#[test]
fn single_element_scan_is_identity_with_total() {
    let Some(ctx) = gpu() else { return };
    let mut scan = PrefixScan::new(&ctx).unwrap();
    let (output, total) = gpu_scan(&ctx, &mut scan, &[42]);
    assert_eq!(output, vec![0]);
    assert_eq!(total, 42);
}

#[test]
fn scan_into_writes_total_at_offset() {
    let Some(ctx) = gpu() else { return };
    let mut scan = PrefixScan::new(&ctx).unwrap();
    let data = DeviceBuffer::from_slice(&ctx, "Scan Data", &[1u32; 1000]).unwrap();
    let totals = DeviceBuffer::from_slice(&ctx, "Scan Totals", &[7u32, 7, 7, 7]).unwrap();

    scan.scan_into(&ctx, &data, &totals, 2).unwrap();

    assert_eq!(totals.read(&ctx).unwrap(), vec![7, 7, 1000, 7]);
    let output = data.read(&ctx).unwrap();
    assert_eq!(output[999], 999);
}

#[test]
fn scan_arena_is_reused_for_repeated_sizes() {
    let Some(ctx) = gpu() else { return };
    let mut scan = PrefixScan::new(&ctx).unwrap();
    // Past 1024 groups of 1024 the group sums need a second level.
    let input = random_u32s(1_100_000, 4, 9);
    gpu_scan(&ctx, &mut scan, &input);
    let depth = scan.arena_depth();
    assert!(depth >= 2, "1.1M elements should recurse, arena depth {}", depth);
    let (output, _) = gpu_scan(&ctx, &mut scan, &input);
    assert_eq!(scan.arena_depth(), depth);
    assert_eq!(output, reference::exclusive_scan(&input).0);
}

fn key_values(keys: &[u32]) -> Vec<KeyValue> {
    keys.iter()
        .enumerate()
        .map(|(i, &k)| KeyValue::new(k, i as u32))
        .collect()
}

fn gpu_sort(ctx: &GpuContext, sort: &mut RadixSort, input: &[KeyValue], max_key: u32) -> Vec<KeyValue> {
    let data = DeviceBuffer::from_slice(ctx, "Sort Test Data", input).unwrap();
    sort.sort(ctx, &data, max_key).unwrap();
    data.read(ctx).unwrap()
}

#[test]
fn sort_is_stable_permutation() {
    let Some(ctx) = gpu() else { return };
    let mut sort = RadixSort::new(&ctx).unwrap();
    // Many duplicates so stability matters.
    let input = key_values(&random_u32s(50_000, 300, 1));

    let output = gpu_sort(&ctx, &mut sort, &input, 299);

    let mut expected = input.clone();
    reference::radix_sort(&mut expected, 299);
    assert_eq!(output, expected);
    for pair in output.windows(2) {
        assert!(pair[0].key <= pair[1].key);
        if pair[0].key == pair[1].key {
            assert!(pair[0].value < pair[1].value, "equal keys reordered: {:?}", pair);
        }
    }
}

#[test]
fn sorting_sorted_input_is_identity() {
    let Some(ctx) = gpu() else { return };
    let mut sort = RadixSort::new(&ctx).unwrap();
    let mut keys = random_u32s(10_000, 1000, 2);
    keys.sort_unstable();
    let input = key_values(&keys);
    assert_eq!(gpu_sort(&ctx, &mut sort, &input, 999), input);
}

#[test]
fn tight_max_key_matches_full_width_sort() {
    let Some(ctx) = gpu() else { return };
    let mut sort = RadixSort::new(&ctx).unwrap();
    let input = key_values(&random_u32s(70_000, 4096, 3));
    assert!(pass_count(4095) < pass_count(u32::MAX));

    let tight = gpu_sort(&ctx, &mut sort, &input, 4095);
    let full = gpu_sort(&ctx, &mut sort, &input, u32::MAX);
    assert_eq!(tight, full);
}

#[test]
fn sort_handles_full_width_keys() {
    let Some(ctx) = gpu() else { return };
    let mut sort = RadixSort::new(&ctx).unwrap();
    let input = key_values(&[u32::MAX, 0, 1 << 31, 5, u32::MAX, 3]);
    let output = gpu_sort(&ctx, &mut sort, &input, u32::MAX);
    let keys: Vec<u32> = output.iter().map(|kv| kv.key).collect();
    assert_eq!(keys, vec![0, 3, 5, 1 << 31, u32::MAX, u32::MAX]);
    assert_eq!(output[4].value, 0);
    assert_eq!(output[5].value, 4);
}

fn shared_gpu() -> Option<&'static GpuContext> {
    static CTX: OnceLock<Option<GpuContext>> = OnceLock::new();
    CTX.get_or_init(gpu).as_ref()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn sort_matches_reference(keys in prop::collection::vec(0u32..1 << 20, 1..3000)) {
        let Some(ctx) = shared_gpu() else { return Ok(()) };
        let mut sort = RadixSort::new(ctx).unwrap();
        let input = key_values(&keys);
        let max_key = *keys.iter().max().unwrap();

        let output = gpu_sort(ctx, &mut sort, &input, max_key);

        let mut expected = input;
        reference::radix_sort(&mut expected, max_key);
        prop_assert_eq!(output, expected);
    }
}

#[test]
fn filter_compacts_stably() {
    let Some(ctx) = gpu() else { return };
    let mut filter = StreamCompaction::new(&ctx).unwrap();
    let input = random_u32s(100_000, 5, 4);

    for predicate in [
        FilterPredicate::NonZero,
        FilterPredicate::Equal(2),
        FilterPredicate::NotEqual(0),
        FilterPredicate::Less(3),
    ] {
        let data = DeviceBuffer::from_slice(&ctx, "Filter Data", &input).unwrap();
        let count = filter.filter(&ctx, &data, predicate).unwrap();
        let expected = reference::compact(&input, |v| predicate.keeps(v));
        assert_eq!(count as usize, expected.len(), "{:?}", predicate);
        let output = data.read(&ctx).unwrap();
        assert_eq!(&output[..expected.len()], &expected[..], "{:?}", predicate);
    }
}

#[test]
fn filter_into_writes_count_without_readback() {
    let Some(ctx) = gpu() else { return };
    let mut filter = StreamCompaction::new(&ctx).unwrap();
    let data = DeviceBuffer::from_slice(&ctx, "Filter Data", &[0u32, 3, 0, 4, 5, 0]).unwrap();
    let counts = DeviceBuffer::<u32>::with_len(&ctx, "Filter Counts", 2).unwrap();

    filter
        .filter_into(&ctx, &data, FilterPredicate::NonZero, &counts, 1)
        .unwrap();

    assert_eq!(counts.read(&ctx).unwrap(), vec![0, 3]);
    assert_eq!(&data.read(&ctx).unwrap()[..3], &[3, 4, 5]);
}

#[test]
fn empty_buffers_scan_and_filter_to_nothing() {
    let Some(ctx) = gpu() else { return };
    let empty = DeviceBuffer::<u32>::new("Empty Input");
    let mut scan = PrefixScan::new(&ctx).unwrap();
    let mut filter = StreamCompaction::new(&ctx).unwrap();

    // A real scan first, so a stale total would show.
    gpu_scan(&ctx, &mut scan, &[5, 6]);
    assert_eq!(scan.scan_with_total(&ctx, &empty).unwrap(), 0);
    let totals = DeviceBuffer::from_slice(&ctx, "Empty Totals", &[7u32, 7]).unwrap();
    scan.scan_into(&ctx, &empty, &totals, 1).unwrap();
    assert_eq!(totals.read(&ctx).unwrap(), vec![7, 0]);

    assert_eq!(filter.filter(&ctx, &empty, FilterPredicate::NonZero).unwrap(), 0);
    let counts = DeviceBuffer::from_slice(&ctx, "Empty Counts", &[9u32, 9]).unwrap();
    filter
        .filter_into(&ctx, &empty, FilterPredicate::Equal(1), &counts, 0)
        .unwrap();
    assert_eq!(counts.read(&ctx).unwrap(), vec![0, 9]);
}

#[test]
fn double_buffer_swap_exchanges_roles_only() {
    let Some(ctx) = gpu() else { return };
    let mut buffer = DoubleBuffer::<u32>::new("Swap Test");
    buffer.init(&ctx, 4).unwrap();
    buffer.read().write(&ctx, &[1, 2, 3, 4]);
    buffer.write().write(&ctx, &[5, 6, 7, 8]);

    buffer.swap();

    assert_eq!(buffer.read().read(&ctx).unwrap(), vec![5, 6, 7, 8]);
    assert_eq!(buffer.write().read(&ctx).unwrap(), vec![1, 2, 3, 4]);
    assert!(!buffer.check_size_changed(&ctx, 4).unwrap());
    assert_eq!(buffer.read().read(&ctx).unwrap(), vec![5, 6, 7, 8]);
}

#[test]
fn buffer_resize_and_partial_transfers() {
    let Some(ctx) = gpu() else { return };
    let mut buffer = DeviceBuffer::<u32>::with_len(&ctx, "Resize Test", 8).unwrap();
    assert!(!buffer.check_size_changed(&ctx, 8).unwrap());
    assert!(buffer.check_size_changed(&ctx, 16).unwrap());
    assert_eq!(buffer.len(), 16);
    assert_eq!(buffer.read(&ctx).unwrap(), vec![0; 16]);

    buffer.write_at(&ctx, 4, &[9, 9]);
    assert_eq!(buffer.read_range(&ctx, 3, 4).unwrap(), vec![0, 9, 9, 0]);

    buffer.release();
    assert!(!buffer.is_initialized());
}

#[test]
fn full_write_with_wrong_length_is_rejected() {
    let Some(ctx) = gpu() else { return };
    let buffer = DeviceBuffer::<u32>::with_len(&ctx, "Exact Write", 4).unwrap();

    let result = panic::catch_unwind(AssertUnwindSafe(|| buffer.write(&ctx, &[1, 2, 3])));

    let payload = result.expect_err("a 3-element write into 4 elements was accepted");
    let message = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or_default();
    assert!(
        message.contains("write of 3 elements into a buffer of 4"),
        "unexpected panic: {:?}",
        message
    );
    // The rejected write never reached the queue.
    assert_eq!(buffer.read(&ctx).unwrap(), vec![0; 4]);
}
