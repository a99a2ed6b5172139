//! # Warden Testing
//!
//! Scenario harness for exercising the coordination primitives with many
//! instances against one in-memory service.
//!
//! - [`harness`]: a set of failover controllers of one project
//! - [`fault_injection`]: session expiry, suspension and reconnection
//! - [`scenarios`]: concurrent allocation runs and their reports

pub mod fault_injection;
pub mod harness;
pub mod scenarios;

pub use fault_injection::{inject, pick_victim, SessionFault};
pub use harness::{test_client_config, FailoverHarness, Instance};
pub use scenarios::{create_allocation_scenarios, AllocationReport, AllocationScenario};

/// Install a test subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}
