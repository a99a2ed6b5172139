//! Segmented ID allocator backed by a shared counter node.

use crate::segment::Segment;
use crate::symbols::SymbolCodec;
use crate::{CheckoutTimeoutPolicy, IdGenError, IdGenResult, IdGeneratorConfig};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use warden_core::{CoordinationClient, CreateMode};

/// Statistics about allocation activity of one allocator
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AllocatorStats {
    pub ids_issued: u64,
    pub checkouts: u64,
    pub lock_timeouts: u64,
    /// Segments restarted under [`CheckoutTimeoutPolicy::ReusePreviousSegment`]
    pub segments_reused: u64,
}

/// Hands out strictly increasing IDs from segments of a shared counter.
///
/// The counter node holds the start of the next unallocated segment as a
/// decimal integer. A checkout takes the counter's mutex, reads `point`,
/// writes `point + interval` and returns `point`; the allocator then issues
/// `point + 1 ..= point + interval` locally without further round trips.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use warden_core::ClientConfig;
/// use warden_idgen::{IdGeneratorConfig, SegmentAllocator};
/// use warden_memory::InMemoryCoordinator;
///
/// # tokio_test::block_on(async {
/// let service = InMemoryCoordinator::new();
/// let client = Arc::new(service.connect(ClientConfig::default()));
/// let allocator =
///     SegmentAllocator::new(client, IdGeneratorConfig::new("/ids/orders", 100)).unwrap();
///
/// allocator.init().await.unwrap();
/// assert_eq!(allocator.generate_id().await.unwrap(), "000001");
/// assert_eq!(allocator.next_value().await.unwrap(), 2);
/// # });
/// ```
pub struct SegmentAllocator {
    client: Arc<dyn CoordinationClient>,
    config: IdGeneratorConfig,
    codec: SymbolCodec,
    /// `None` until `init()` checks out the first segment
    segment: Mutex<Option<Segment>>,
    stats: RwLock<AllocatorStats>,
}

impl std::fmt::Debug for SegmentAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentAllocator")
            .field("counter", &self.config.counter_path)
            .field("interval", &self.config.interval)
            .finish()
    }
}

impl SegmentAllocator {
    pub fn new(client: Arc<dyn CoordinationClient>, config: IdGeneratorConfig) -> IdGenResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            codec: config.codec(),
            config,
            segment: Mutex::new(None),
            stats: RwLock::new(AllocatorStats::default()),
        })
    }

    /// Create an allocator with its own client of an in-process service.
    #[cfg(feature = "in-memory")]
    pub fn connect(
        service: &warden_memory::InMemoryCoordinator,
        client_config: warden_core::ClientConfig,
        config: IdGeneratorConfig,
    ) -> IdGenResult<Self> {
        Self::new(Arc::new(service.connect(client_config)), config)
    }

    /// Start the client, create the counter if absent and check out the
    /// first segment. Calling it again checks out a fresh segment.
    pub async fn init(&self) -> IdGenResult<()> {
        if !self.client.is_started() {
            self.client.start().await?;
        }

        let path = &self.config.counter_path;
        if self.client.exists(path).await?.is_none() {
            match self
                .client
                .create(path, b"0", CreateMode::Persistent, true)
                .await
            {
                Ok(_) => info!(counter = %path, "counter created"),
                Err(e) if e.is_node_exists() => {
                    debug!(counter = %path, "counter created concurrently")
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut segment = self.segment.lock().await;
        let start = self.checkout().await?;
        *segment = Some(Segment::new(start, self.config.interval));
        info!(
            counter = %path,
            start,
            interval = self.config.interval,
            "allocator initialized"
        );
        Ok(())
    }

    /// Rendered form of the next ID.
    pub async fn generate_id(&self) -> IdGenResult<String> {
        let value = self.next_value().await?;
        let value = u64::try_from(value).map_err(|_| IdGenError::Internal {
            reason: format!("issued negative id {}", value),
        })?;
        Ok(self.codec.render(value))
    }

    /// Next ID as a number. Strictly greater than every value this
    /// allocator issued before, unless the previous segment was reused.
    pub async fn next_value(&self) -> IdGenResult<i64> {
        let mut guard = self.segment.lock().await;
        let segment = guard.as_mut().ok_or(IdGenError::NotInitialized)?;

        if let Some(value) = segment.advance() {
            self.stats.write().ids_issued += 1;
            return Ok(value);
        }

        let start = match self.checkout().await {
            Ok(start) => start,
            Err(IdGenError::LockTimeout { path, timeout })
                if self.config.timeout_policy == CheckoutTimeoutPolicy::ReusePreviousSegment =>
            {
                self.stats.write().segments_reused += 1;
                warn!(
                    counter = %path,
                    ?timeout,
                    start = segment.start,
                    "checkout timed out, reusing previous segment; ids may repeat"
                );
                segment.start
            }
            Err(e) => return Err(e),
        };

        *segment = Segment::new(start, self.config.interval);
        let value = segment.advance().ok_or_else(|| IdGenError::Internal {
            reason: "fresh segment issued nothing".to_string(),
        })?;
        self.stats.write().ids_issued += 1;
        Ok(value)
    }

    /// Reserve a segment from the shared counter and return its start.
    ///
    /// Does not touch this allocator's local segment. A mutex timeout is
    /// always reported as [`IdGenError::LockTimeout`] here.
    ///
    /// The locked read-modify-write runs as its own task, so dropping the
    /// returned future never leaves the mutex held; a reservation already
    /// in flight completes and its segment is discarded.
    pub async fn checkout(&self) -> IdGenResult<i64> {
        let path = self.config.counter_path.clone();
        let timeout = self.config.lock_timeout;

        let reservation = tokio::spawn(reserve_segment(
            Arc::clone(&self.client),
            path.clone(),
            self.config.interval,
            timeout,
        ));
        let result = reservation.await.map_err(|e| IdGenError::Internal {
            reason: format!("segment checkout task failed: {}", e),
        })?;

        match result {
            Ok(Some(start)) => {
                self.stats.write().checkouts += 1;
                debug!(counter = %path, start, interval = self.config.interval, "segment checked out");
                Ok(start)
            }
            Ok(None) => {
                self.stats.write().lock_timeouts += 1;
                warn!(counter = %path, ?timeout, "counter mutex not acquired");
                Err(IdGenError::LockTimeout { path, timeout })
            }
            Err(e) => {
                error!(counter = %path, error = %e, "segment checkout failed");
                Err(e)
            }
        }
    }

    /// Snapshot of the local segment, `None` before `init()`.
    pub async fn segment(&self) -> Option<Segment> {
        *self.segment.lock().await
    }

    pub fn stats(&self) -> AllocatorStats {
        self.stats.read().clone()
    }

    pub fn config(&self) -> &IdGeneratorConfig {
        &self.config
    }

    pub fn codec(&self) -> &SymbolCodec {
        &self.codec
    }
}

/// Take the counter mutex, advance the counter and release the mutex.
/// `Ok(None)` when the mutex was not acquired in time.
async fn reserve_segment(
    client: Arc<dyn CoordinationClient>,
    path: String,
    interval: i64,
    timeout: Duration,
) -> IdGenResult<Option<i64>> {
    if !client.acquire_mutex(&path, timeout).await? {
        return Ok(None);
    }

    let result = advance_counter(client.as_ref(), &path, interval).await;
    if let Err(e) = client.release_mutex(&path).await {
        error!(counter = %path, error = %e, "failed to release counter mutex");
    }
    result.map(Some)
}

/// Read-modify-write of the counter; caller holds the mutex.
async fn advance_counter(
    client: &dyn CoordinationClient,
    path: &str,
    interval: i64,
) -> IdGenResult<i64> {
    let (payload, _) = client.get_data(path).await?;
    let point = parse_counter(path, &payload)?;
    let next = point
        .checked_add(interval)
        .ok_or_else(|| IdGenError::CounterExhausted {
            path: path.to_string(),
            point,
            interval,
        })?;
    client.set_data(path, next.to_string().as_bytes()).await?;
    Ok(point)
}

fn parse_counter(path: &str, payload: &[u8]) -> IdGenResult<i64> {
    let malformed = |reason: String| IdGenError::MalformedCounter {
        path: path.to_string(),
        payload: String::from_utf8_lossy(payload).into_owned(),
        reason,
    };
    let text = std::str::from_utf8(payload).map_err(|e| malformed(e.to_string()))?;
    let point: i64 = text.trim().parse().map_err(|e: std::num::ParseIntError| malformed(e.to_string()))?;
    if point < 0 {
        return Err(malformed("counter is negative".to_string()));
    }
    Ok(point)
}
