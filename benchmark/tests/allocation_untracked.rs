// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Allocation tracking without the counting allocator installed.
//!
//! A single test, so no other thread calls the allocator directly while
//! installation is being detected.

use std::alloc::{GlobalAlloc, Layout};

use netbench_benchmark::alloc::{is_tracking, AllocationStats};
use netbench_benchmark::{BenchmarkHarness, CountingAllocator};
use netbench_core::{BenchmarkConfiguration, RawBenchmarkConfig, TransportKind};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_direct_use_does_not_count_as_installed() {
    let layout = Layout::from_size_align(64, 8).unwrap();
    unsafe {
        let ptr = CountingAllocator.alloc(layout);
        assert!(!ptr.is_null());
        CountingAllocator.dealloc(ptr, layout);
    }
    assert!(AllocationStats::now().allocations > 0);
    assert!(!is_tracking());

    let before = AllocationStats::now();
    let buffer = std::hint::black_box(vec![0u8; 4096]);
    assert_eq!(AllocationStats::now().since(before), AllocationStats::default());
    drop(buffer);

    // The harness must report no allocation metrics rather than zero.
    let config = BenchmarkConfiguration::from_raw(RawBenchmarkConfig {
        transport: TransportKind::Loopback,
        port: 5210,
        clients: 2,
        parallel_messages: 2,
        message_target: 100,
        ..RawBenchmarkConfig::default()
    })
    .unwrap();
    let outcome = BenchmarkHarness::new()
        .warmup(0)
        .iterations(1)
        .run_series(&config)
        .await;
    assert_eq!(outcome.runs.len(), 1);
    assert!(outcome.runs[0].allocations.is_none());
}
