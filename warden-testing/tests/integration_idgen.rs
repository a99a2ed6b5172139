//! ID allocation integration tests
//!
//! Many allocators share one counter through the in-memory service; the
//! union of everything they issue must be collision free.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use warden_core::{CoordinationClient, CreateMode};
use warden_idgen::{IdGenError, IdGeneratorConfig, SegmentAllocator, SymbolCodec};
use warden_memory::InMemoryCoordinator;
use warden_testing::{
    create_allocation_scenarios, init_test_tracing, test_client_config, AllocationScenario,
};

/// Every predefined scenario issues unique, per-allocator increasing ids
#[tokio::test]
async fn test_allocation_scenarios() {
    init_test_tracing();

    for scenario in create_allocation_scenarios() {
        let service = InMemoryCoordinator::new();
        let report = scenario.run(&service).await.unwrap();
        assert_eq!(
            report.total(),
            scenario.allocators * scenario.ids_per_allocator,
            "scenario {}",
            scenario.name
        );
        assert!(report.is_collision_free(), "scenario {} collided", scenario.name);
        assert!(report.is_monotonic(), "scenario {} went backwards", scenario.name);
    }
}

/// Interval 100 from a fresh counter: 1..=100, then a second checkout
#[tokio::test]
async fn test_interval_hundred_rendered() {
    init_test_tracing();

    let service = InMemoryCoordinator::new();
    let allocator = SegmentAllocator::connect(
        &service,
        test_client_config(),
        IdGeneratorConfig::new("/utils/idgen/orders", 100),
    )
    .unwrap();
    allocator.init().await.unwrap();

    let codec = SymbolCodec::fixed(6);
    for expected in 1..=100u64 {
        assert_eq!(allocator.generate_id().await.unwrap(), codec.render(expected));
    }
    assert_eq!(
        service.data("/utils/idgen/orders").unwrap().as_ref(),
        b"100"
    );

    assert_eq!(allocator.generate_id().await.unwrap(), codec.render(101));
    assert_eq!(
        service.data("/utils/idgen/orders").unwrap().as_ref(),
        b"200"
    );
    assert_eq!(allocator.stats().checkouts, 2);
}

/// Two allocators interleaving checkouts get disjoint segments
#[tokio::test]
async fn test_interleaved_allocators_disjoint_segments() {
    init_test_tracing();

    let service = InMemoryCoordinator::new();
    let config = IdGeneratorConfig::new("/utils/idgen/shared", 10).with_variable_length();
    let first = SegmentAllocator::connect(&service, test_client_config(), config.clone()).unwrap();
    let second = SegmentAllocator::connect(&service, test_client_config(), config).unwrap();

    first.init().await.unwrap();
    second.init().await.unwrap();
    assert_eq!(first.next_value().await.unwrap(), 1);
    assert_eq!(second.next_value().await.unwrap(), 11);

    for _ in 0..9 {
        first.next_value().await.unwrap();
    }
    // first's next segment starts after second's
    assert_eq!(first.next_value().await.unwrap(), 21);
    assert_eq!(second.next_value().await.unwrap(), 12);
    assert_eq!(first.segment().await.unwrap().start, 20);
}

/// A mutex held by a dead session is freed when the session expires
#[tokio::test]
async fn test_expired_holder_releases_counter() {
    init_test_tracing();

    let service = InMemoryCoordinator::new();
    let holder = service.connect(test_client_config());
    holder.start().await.unwrap();
    assert!(holder
        .acquire_mutex("/utils/idgen/jobs", Duration::from_millis(10))
        .await
        .unwrap());

    let allocator = Arc::new(
        SegmentAllocator::connect(
            &service,
            test_client_config(),
            IdGeneratorConfig::new("/utils/idgen/jobs", 5)
                .with_lock_timeout(Duration::from_secs(2)),
        )
        .unwrap(),
    );
    let init = {
        let allocator = Arc::clone(&allocator);
        tokio::spawn(async move { allocator.init().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!init.is_finished());
    service.expire_session(holder.session_id().unwrap());

    init.await.unwrap().unwrap();
    assert_eq!(allocator.next_value().await.unwrap(), 1);
}

/// Corrupt counters surface to the caller instead of being overwritten
#[tokio::test]
async fn test_malformed_counter_propagates() {
    init_test_tracing();

    let service = InMemoryCoordinator::new();
    let writer = service.connect(test_client_config());
    writer.start().await.unwrap();
    writer
        .create("/utils/idgen/bad", b"12abc", CreateMode::Persistent, true)
        .await
        .unwrap();

    let allocator = SegmentAllocator::connect(
        &service,
        test_client_config(),
        IdGeneratorConfig::new("/utils/idgen/bad", 10),
    )
    .unwrap();
    match allocator.init().await {
        Err(IdGenError::MalformedCounter { path, payload, .. }) => {
            assert_eq!(path, "/utils/idgen/bad");
            assert_eq!(payload, "12abc");
        }
        other => panic!("expected malformed counter, got {:?}", other),
    }
    assert_eq!(service.data("/utils/idgen/bad").unwrap().as_ref(), b"12abc");
    assert_eq!(
        allocator.generate_id().await,
        Err(IdGenError::NotInitialized)
    );
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Segments of independent allocators never overlap
    #[test]
    fn prop_segments_never_overlap(
        allocators in 1usize..6,
        ids in 0usize..40,
        interval in 1i64..15,
    ) {
        let report = runtime().block_on(async {
            let service = InMemoryCoordinator::new();
            AllocationScenario::new("prop", allocators, ids, interval)
                .run(&service)
                .await
        }).unwrap();

        prop_assert_eq!(report.total(), allocators * ids);
        prop_assert!(report.is_collision_free());
        prop_assert!(report.is_monotonic());
        if ids > 0 {
            let minimum = allocators as u64 * (1 + (ids as u64 - 1) / interval as u64);
            prop_assert!(report.checkouts >= minimum);
        }
    }
}
