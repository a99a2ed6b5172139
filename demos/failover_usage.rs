//! Failover between three instances of one project.
//!
//! This example shows how to:
//! - Register several instances against the same project slot
//! - Observe controller state changes
//! - Fail the owner and watch a sibling take over
//! - Shut the remaining instances down cleanly

use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use warden_core::ClientConfig;
use warden_failover::{ControllerState, FailoverConfig, FailoverController};
use warden_memory::InMemoryCoordinator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting failover example");

    let service = InMemoryCoordinator::new();
    let client_config = ClientConfig::default()
        .with_session_timeout(Duration::from_secs(2))
        .with_connection_timeout(Duration::from_millis(500));

    let mut controllers = Vec::new();
    for label in ["host-a", "host-b", "host-c"] {
        let controller = FailoverController::connect(
            &service,
            client_config.clone(),
            FailoverConfig::new("billing", label),
        )?;
        spawn_state_logger(&controller);
        controller.register().await?;
        controllers.push(controller);
    }

    let first = wait_for_any_owner(&controllers).await?;
    info!(
        owner = %controllers[first].config().instance_label,
        candidate = %controllers[first].candidate_path(),
        "initial owner elected"
    );

    // Simulate a crash of the owner's process
    let session = service
        .ephemeral_owner(controllers[first].candidate_path())
        .ok_or("candidate node missing")?;
    warn!(session = %session, "expiring owner session");
    service.expire_session(session);

    let second = wait_for_any_owner(&controllers).await?;
    info!(
        owner = %controllers[second].config().instance_label,
        "sibling took over"
    );

    for controller in &controllers {
        info!(
            instance = %controller.config().instance_label,
            state = %controller.state(),
            stats = ?controller.stats(),
            "final state"
        );
        if controller.state() != ControllerState::Suspended {
            controller.shutdown().await?;
        }
    }

    info!("Failover example completed");
    Ok(())
}

fn spawn_state_logger(controller: &FailoverController) {
    let mut states = controller.subscribe();
    let label = controller.config().instance_label.clone();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(instance = %label, %state, "state changed");
            if state.is_terminal() {
                break;
            }
        }
    });
}

async fn wait_for_any_owner(
    controllers: &[FailoverController],
) -> Result<usize, Box<dyn std::error::Error>> {
    for _ in 0..200 {
        if let Some(index) = controllers.iter().position(|c| c.is_owner()) {
            return Ok(index);
        }
        sleep(Duration::from_millis(10)).await;
    }
    Err("no owner elected".into())
}
