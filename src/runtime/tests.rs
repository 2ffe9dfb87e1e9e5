use super::*;
use crate::cache::CachePriority;
use crate::config::RuntimeConfig;
use parking_lot::Mutex;
use std::sync::Arc;

fn block_of(rt: &BlockRuntime, byte: u8, len: usize) -> Block {
    Block::new(rt, vec![vec![byte; len].into()], "").unwrap()
}

type Heard = Arc<Mutex<Vec<(PressureLevel, PressureLevel)>>>;

fn subscribe_all(rt: &BlockRuntime) -> (Heard, Vec<PressureSubscription>) {
    let heard: Heard = Arc::new(Mutex::new(Vec::new()));
    let mut subscriptions = Vec::new();
    for level in [
        PressureLevel::None,
        PressureLevel::Low,
        PressureLevel::Medium,
        PressureLevel::High,
        PressureLevel::Critical,
    ] {
        let heard = heard.clone();
        subscriptions.push(rt.on_memory_pressure_level(
            move |notified: PressureLevel| heard.lock().push((level, notified)),
            level,
        ));
    }
    (heard, subscriptions)
}

#[test]
fn test_no_limit_means_no_pressure() {
    let rt = BlockRuntime::default();
    let _block = block_of(&rt, 1, 10_000);
    assert_eq!(rt.pressure_level(), PressureLevel::None);
}

#[test]
fn test_threshold_crossing_fires_once_and_cascades() {
    let rt = BlockRuntime::default();
    rt.set_memory_usage_limit(Some(1000));
    let (heard, _subscriptions) = subscribe_all(&rt);

    let _big = block_of(&rt, 1, 850);
    assert_eq!(rt.pressure_level(), PressureLevel::High);
    assert_eq!(
        *heard.lock(),
        vec![
            (PressureLevel::High, PressureLevel::High),
            (PressureLevel::Medium, PressureLevel::Medium),
            (PressureLevel::Low, PressureLevel::Low),
        ]
    );

    heard.lock().clear();
    let _small = block_of(&rt, 2, 10);
    assert_eq!(rt.pressure_level(), PressureLevel::High);
    assert!(heard.lock().is_empty());
}

#[test]
fn test_limit_change_recomputes_level() {
    let rt = BlockRuntime::default();
    let (heard, _subscriptions) = subscribe_all(&rt);
    let _block = block_of(&rt, 1, 500);
    assert_eq!(rt.pressure_level(), PressureLevel::None);

    rt.set_memory_usage_limit(Some(1000));
    assert_eq!(rt.pressure_level(), PressureLevel::Low);

    rt.set_memory_usage_limit(None);
    assert_eq!(rt.pressure_level(), PressureLevel::None);
    assert_eq!(
        *heard.lock(),
        vec![
            (PressureLevel::Low, PressureLevel::Low),
            (PressureLevel::None, PressureLevel::None),
        ]
    );
}

#[test]
fn test_unsubscribed_callback_is_silent() {
    let rt = BlockRuntime::default();
    let (heard, subscriptions) = subscribe_all(&rt);
    for subscription in subscriptions {
        assert!(subscription.unsubscribe());
    }

    rt.set_memory_usage_limit(Some(10));
    let _block = block_of(&rt, 1, 10);
    assert_eq!(rt.pressure_level(), PressureLevel::Critical);
    assert!(heard.lock().is_empty());
}

#[test]
fn test_low_pressure_trims_low_priority_cache() {
    let rt = BlockRuntime::default();
    let low = block_of(&rt, 1, 10);
    let medium = block_of(&rt, 2, 10);
    low.cache("low", CachePriority::Low);
    medium.cache("medium", CachePriority::Medium);
    drop(low);
    drop(medium);
    let _held = block_of(&rt, 3, 480);

    rt.set_memory_usage_limit(Some(1000));
    assert_eq!(rt.pressure_level(), PressureLevel::Low);
    assert!(rt.cached_block("low").is_none());
    assert!(rt.cached_block("medium").is_some());
    assert_eq!(rt.global_memory_report().active_block_count, 2);
}

#[test]
fn test_critical_pressure_empties_cache_and_reclaims() {
    let rt = BlockRuntime::default();
    let block = block_of(&rt, 1, 100);
    block.cache("pinned", CachePriority::High);
    drop(block);
    assert_eq!(rt.memory_usage().current_usage(), 100);

    rt.set_memory_usage_limit(Some(110));
    assert_eq!(rt.pressure_level(), PressureLevel::Critical);
    assert!(rt.cached_block("pinned").is_none());
    assert_eq!(rt.memory_usage().current_usage(), 0);
    assert!(rt.content_store().is_empty());

    // Usage fell back after reclamation; the next recompute notices.
    rt.set_memory_usage_limit(Some(110));
    assert_eq!(rt.pressure_level(), PressureLevel::None);
}

#[test]
fn test_reports() {
    let rt = BlockRuntime::default();
    let _a = block_of(&rt, 1, 100);
    let _b = block_of(&rt, 1, 100);
    let _c = block_of(&rt, 2, 300);

    let dedup = rt.deduplication_report();
    assert_eq!(dedup.unique_block_count, 2);
    assert_eq!(dedup.total_bytes, 400);
    assert_eq!(dedup.total_ref_count, 3);
    assert_eq!(dedup.duplicate_block_count, 1);
    assert_eq!(dedup.total_saved_memory, 100);

    let memory = rt.global_memory_report();
    assert_eq!(memory.active_block_count, 3);
    assert_eq!(memory.total_memory_usage, 500);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_counts_stale_blocks() {
    let config = RuntimeConfig {
        stale_after: Duration::from_secs(60),
        aggressive_stale_after: Duration::from_secs(5),
        ..RuntimeConfig::default()
    };
    let rt = BlockRuntime::new(config);
    let block = block_of(&rt, 1, 10);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(rt.perform_cleanup(false).stale_blocks, 0);
    assert_eq!(rt.perform_cleanup(true).stale_blocks, 1);

    block.size();
    assert_eq!(rt.perform_cleanup(true).stale_blocks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_recomputes_on_tick() {
    let rt = BlockRuntime::default();
    let _block = block_of(&rt, 1, 500);

    let monitor = rt
        .start_memory_monitor(Duration::from_secs(1), Some(1000))
        .unwrap();
    assert!(monitor.is_running());
    assert_eq!(rt.pressure_level(), PressureLevel::Low);

    rt.memory_usage().allocate(400);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(rt.pressure_level(), PressureLevel::Critical);

    monitor.stop();
    tokio::time::sleep(Duration::from_millis(10)).await;
    rt.memory_usage().release(400);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(rt.pressure_level(), PressureLevel::Critical);
}

#[test]
fn test_monitor_needs_tokio() {
    let rt = BlockRuntime::default();
    assert!(matches!(
        rt.start_memory_monitor(Duration::from_secs(1), None),
        Err(BlockError::NoRuntime)
    ));
    assert!(matches!(
        rt.start_memory_monitor(Duration::ZERO, None),
        Err(BlockError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_shutdown_clears_services() {
    let rt = BlockRuntime::default();
    let (heard, _subscriptions) = subscribe_all(&rt);
    let block = block_of(&rt, 1, 100);
    block.cache("kept", CachePriority::High);

    rt.shutdown();
    assert!(rt.cached_block("kept").is_none());
    rt.set_memory_usage_limit(Some(100));
    assert!(heard.lock().is_empty());

    assert_eq!(block.bytes().await.unwrap().len(), 100);
    drop(block);
    assert_eq!(rt.global_memory_report().active_block_count, 0);
}

#[test]
fn test_runtimes_are_independent() {
    let first = BlockRuntime::default();
    let second = BlockRuntime::default();
    let _a = block_of(&first, 1, 64);
    let _b = block_of(&second, 1, 64);

    assert_eq!(first.deduplication_report().duplicate_block_count, 0);
    assert_eq!(second.deduplication_report().duplicate_block_count, 0);
    assert_eq!(first.global_memory_report().active_block_count, 1);
}

#[test]
fn test_concurrent_transitions_are_delivered_in_order() {
    let rt = BlockRuntime::default();
    let _block = block_of(&rt, 1, 100);

    let heard: Arc<Mutex<Vec<PressureLevel>>> = Arc::new(Mutex::new(Vec::new()));
    let _subscriptions: Vec<_> = [PressureLevel::None, PressureLevel::Critical]
        .into_iter()
        .map(|level| {
            let heard = heard.clone();
            rt.on_memory_pressure_level(move |notified| heard.lock().push(notified), level)
        })
        .collect();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let rt = rt.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let limit = if i % 2 == 0 { Some(100) } else { None };
                    rt.set_memory_usage_limit(limit);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let heard = heard.lock();
    assert!(!heard.is_empty());
    assert_eq!(heard[0], PressureLevel::Critical);
    for pair in heard.windows(2) {
        assert_ne!(pair[0], pair[1], "transition delivered out of order");
    }
    assert_eq!(heard.last().copied(), Some(rt.pressure_level()));
}
