use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use warden_idgen::{IdGenResult, IdGeneratorConfig, SegmentAllocator};
use warden_memory::InMemoryCoordinator;

use crate::harness::test_client_config;

/// Several allocators drawing from one shared counter at the same time.
#[derive(Debug, Clone)]
pub struct AllocationScenario {
    pub name: String,
    pub allocators: usize,
    pub ids_per_allocator: usize,
    pub interval: i64,
    pub counter_path: String,
}

#[derive(Debug, Clone)]
pub struct AllocationReport {
    pub name: String,
    /// Values issued by each allocator, in issue order
    pub values: Vec<Vec<i64>>,
    pub checkouts: u64,
    pub duration: Duration,
}

impl AllocationScenario {
    pub fn new(name: &str, allocators: usize, ids_per_allocator: usize, interval: i64) -> Self {
        Self {
            name: name.to_string(),
            allocators,
            ids_per_allocator,
            interval,
            counter_path: format!("/utils/idgen/{}", name),
        }
    }

    /// Run every allocator as its own task, each with its own session.
    pub async fn run(&self, service: &InMemoryCoordinator) -> IdGenResult<AllocationReport> {
        let start = Instant::now();
        let config = IdGeneratorConfig::new(&self.counter_path, self.interval)
            .with_lock_timeout(Duration::from_secs(5));

        let mut allocators = Vec::with_capacity(self.allocators);
        for _ in 0..self.allocators {
            let allocator =
                SegmentAllocator::connect(service, test_client_config(), config.clone())?;
            allocators.push(Arc::new(allocator));
        }

        let tasks = allocators.iter().map(|allocator| {
            let allocator = Arc::clone(allocator);
            let count = self.ids_per_allocator;
            tokio::spawn(async move {
                allocator.init().await?;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(allocator.next_value().await?);
                    tokio::task::yield_now().await;
                }
                Ok::<_, warden_idgen::IdGenError>(values)
            })
        });

        let mut values = Vec::with_capacity(self.allocators);
        for joined in join_all(tasks).await {
            let issued = joined.map_err(|e| warden_idgen::IdGenError::Internal {
                reason: e.to_string(),
            })??;
            values.push(issued);
        }

        let checkouts = allocators.iter().map(|a| a.stats().checkouts).sum();
        let report = AllocationReport {
            name: self.name.clone(),
            values,
            checkouts,
            duration: start.elapsed(),
        };
        info!(
            scenario = %self.name,
            total = report.total(),
            distinct = report.distinct(),
            checkouts,
            duration_ms = report.duration.as_millis() as u64,
            "allocation scenario finished"
        );
        Ok(report)
    }
}

impl AllocationReport {
    pub fn total(&self) -> usize {
        self.values.iter().map(Vec::len).sum()
    }

    pub fn distinct(&self) -> usize {
        self.values.iter().flatten().collect::<HashSet<_>>().len()
    }

    pub fn is_collision_free(&self) -> bool {
        self.total() == self.distinct()
    }

    /// Every allocator issued strictly increasing values.
    pub fn is_monotonic(&self) -> bool {
        self.values
            .iter()
            .all(|issued| issued.windows(2).all(|pair| pair[0] < pair[1]))
    }
}

pub fn create_allocation_scenarios() -> Vec<AllocationScenario> {
    vec![
        AllocationScenario::new("single", 1, 250, 100),
        AllocationScenario::new("contended-small-segments", 6, 40, 3),
        AllocationScenario::new("many-allocators", 12, 30, 10),
        AllocationScenario::new("interval-one", 4, 20, 1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_helpers() {
        let report = AllocationReport {
            name: "r".into(),
            values: vec![vec![1, 2, 3], vec![4, 6], vec![5, 5]],
            checkouts: 3,
            duration: Duration::ZERO,
        };
        assert_eq!(report.total(), 7);
        assert_eq!(report.distinct(), 6);
        assert!(!report.is_collision_free());
        assert!(!report.is_monotonic());
    }

    #[tokio::test]
    async fn test_single_allocator_scenario() {
        let service = InMemoryCoordinator::new();
        let report = AllocationScenario::new("unit", 1, 15, 4)
            .run(&service)
            .await
            .unwrap();
        assert_eq!(report.values[0], (1..=15).collect::<Vec<_>>());
        assert_eq!(report.checkouts, 4);
    }
}
