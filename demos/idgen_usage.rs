//! Segmented ID allocation shared by several workers.
//!
//! This example shows how to:
//! - Configure a segment allocator for a shared counter
//! - Generate fixed and variable length IDs
//! - Run several allocators concurrently without collisions

use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use warden_core::ClientConfig;
use warden_idgen::{IdGeneratorConfig, SegmentAllocator};
use warden_memory::InMemoryCoordinator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting ID generator example");

    let service = InMemoryCoordinator::new();

    // Fixed length IDs from a small segment
    let orders = SegmentAllocator::connect(
        &service,
        ClientConfig::default(),
        IdGeneratorConfig::new("/utils/idgen/orders", 100),
    )?;
    orders.init().await?;
    for _ in 0..3 {
        info!(id = %orders.generate_id().await?, "order id");
    }

    // Variable length IDs
    let tickets = SegmentAllocator::connect(
        &service,
        ClientConfig::default(),
        IdGeneratorConfig::new("/utils/idgen/tickets", 1000).with_variable_length(),
    )?;
    tickets.init().await?;
    info!(id = %tickets.generate_id().await?, "ticket id");

    // Concurrent workers sharing one counter
    let config = IdGeneratorConfig::new("/utils/idgen/events", 25)
        .with_lock_timeout(Duration::from_secs(5));
    let mut workers = Vec::new();
    for _ in 0..4 {
        let allocator = SegmentAllocator::connect(&service, ClientConfig::default(), config.clone())?;
        allocator.init().await?;
        workers.push(Arc::new(allocator));
    }

    let tasks = workers.iter().map(|worker| {
        let worker = Arc::clone(worker);
        tokio::spawn(async move {
            let mut ids = Vec::with_capacity(100);
            for _ in 0..100 {
                ids.push(worker.generate_id().await?);
            }
            Ok::<_, warden_idgen::IdGenError>(ids)
        })
    });

    let mut issued = HashSet::new();
    let mut total = 0;
    for joined in join_all(tasks).await {
        let ids = joined??;
        total += ids.len();
        issued.extend(ids);
    }
    info!(total, distinct = issued.len(), "concurrent generation finished");

    for (index, worker) in workers.iter().enumerate() {
        info!(worker = index, stats = ?worker.stats(), "allocator stats");
    }

    info!("ID generator example completed");
    Ok(())
}
