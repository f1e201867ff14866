//! Batch Execution Tests
//!
//! Fan-out/fan-in behaviour of the batch executor: one result per item,
//! channel closure after the last worker, concurrency limiting, progress
//! tracking and in-band failures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fanout::batch::{BatchExecutor, BatchProgress, WorkResult};
use fanout::cache::SharedCache;
use fanout::task::TransformError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_doubles_every_item() {
    fanout::telemetry::init_tracing();
    let executor = BatchExecutor::infallible(|x: i32| x * 2);

    let results = drain_with_timeout(executor.run(vec![1, 2, 3, 4, 5])).await;

    let outputs: HashSet<i32> = results
        .into_iter()
        .map(|r| r.into_output().expect("doubling cannot fail"))
        .collect();
    assert_eq!(outputs, HashSet::from([2, 4, 6, 8, 10]));
}

#[tokio::test]
async fn test_empty_batch_returns_closed_channel() {
    let executor = BatchExecutor::infallible(|x: i32| x * 2);
    let mut results = executor.run(Vec::new());

    assert!(results.is_closed(), "Empty batch should be closed immediately");
    let next = results.recv_timeout(Duration::from_millis(50)).await.expect("should not block");
    assert!(next.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failures_are_carried_in_band() {
    let executor = BatchExecutor::new(|x: i32| {
        if x % 3 == 0 {
            Err(TransformError::failed(format!("{} is divisible by three", x)))
        } else {
            Ok(x)
        }
    });

    let results = drain_with_timeout(executor.run((1..=9).collect())).await;
    assert_eq!(results.len(), 9, "Failing items still produce a result");

    let failed: HashSet<usize> = results.iter().filter(|r| !r.is_success()).map(|r| r.index).collect();
    assert_eq!(failed, HashSet::from([2, 5, 8]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_worker_does_not_stall_batch() {
    let executor = BatchExecutor::infallible(|x: i32| {
        if x == 4 {
            panic!("worker for {} blew up", x);
        }
        x
    });

    let results = drain_with_timeout(executor.run(vec![1, 2, 3, 4, 5])).await;
    assert_eq!(results.len(), 5);

    let panicked: Vec<&WorkResult<i32>> = results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(panicked.len(), 1);
    assert_eq!(panicked[0].index, 3);
    assert_eq!(
        panicked[0].error(),
        Some(&TransformError::Panicked("worker for 4 blew up".to_string()))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limiting() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (running_in, peak_in) = (running.clone(), peak.clone());
    let executor = BatchExecutor::infallible(move |x: u32| {
        let now = running_in.fetch_add(1, Ordering::SeqCst) + 1;
        peak_in.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(10));
        running_in.fetch_sub(1, Ordering::SeqCst);
        x
    })
    .with_concurrency_limit(2);

    let results = drain_with_timeout(executor.run((0..10).collect())).await;

    assert_eq!(results.len(), 10);
    assert!(peak.load(Ordering::SeqCst) <= 2, "At most 2 transforms should overlap");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_progress_tracking() {
    let progress_updates = Arc::new(Mutex::new(Vec::new()));
    let progress_clone = progress_updates.clone();

    let executor = BatchExecutor::new(|x: i32| {
        if x == 0 {
            Err(TransformError::failed("zero"))
        } else {
            Ok(x)
        }
    })
    .with_progress_callback(move |progress: BatchProgress| {
        progress_clone.lock().unwrap().push(progress);
    });

    let results = drain_with_timeout(executor.run(vec![0, 1, 2, 3, 4])).await;
    assert_eq!(results.len(), 5);

    let updates = progress_updates.lock().unwrap();
    assert_eq!(updates.len(), 5, "One progress update per item");
    assert!(updates.iter().all(|p| p.total == Some(5)));
    assert_eq!(updates.iter().map(|p| p.completed).max(), Some(5));
    assert_eq!(updates.iter().map(|p| p.failed).max(), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_share_cache() {
    let cache: SharedCache = SharedCache::new();
    let worker_cache = cache.clone();

    let executor = BatchExecutor::infallible(move |i: usize| {
        worker_cache.set(format!("item{}", i), format!("value{}", i));
        i
    });

    let results = executor.collect((0..50).collect()).await;
    assert_eq!(results.len(), 50);

    assert_eq!(cache.len(), 50);
    for i in 0..50 {
        assert_eq!(cache.get(&format!("item{}", i)), Some(format!("value{}", i)));
    }
}

#[tokio::test]
async fn test_dropped_receiver_does_not_stall_workers() {
    let finished = Arc::new(AtomicUsize::new(0));
    let finished_in = finished.clone();

    let executor = BatchExecutor::infallible(|x: i32| x).with_progress_callback(move |_| {
        finished_in.fetch_add(1, Ordering::SeqCst);
    });
    drop(executor.run(vec![1, 2, 3]));

    tokio::time::timeout(RECV_TIMEOUT, async {
        while finished.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("workers should finish without a consumer");
}

proptest! {
    #[test]
    fn prop_one_result_per_item(items in proptest::collection::vec(any::<i32>(), 0..64)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let expected: Vec<i64> = items.iter().map(|x| *x as i64 * 2).collect();
        let executor = BatchExecutor::infallible(|x: i32| x as i64 * 2);
        let results = runtime.block_on(async { drain_with_timeout(executor.run(items)).await });

        let mut indexes: Vec<usize> = results.iter().map(|r| r.index).collect();
        indexes.sort_unstable();
        prop_assert_eq!(indexes, (0..expected.len()).collect::<Vec<_>>());

        for result in results {
            prop_assert_eq!(result.output(), Some(&expected[result.index]));
        }
    }
}

async fn drain_with_timeout<O>(mut receiver: fanout::channel::ResultReceiver<WorkResult<O>>) -> Vec<WorkResult<O>> {
    let mut results = Vec::new();
    while let Some(result) = receiver
        .recv_timeout(RECV_TIMEOUT)
        .await
        .expect("batch should close its channel")
    {
        results.push(result);
    }
    assert!(receiver.is_closed());
    results
}
