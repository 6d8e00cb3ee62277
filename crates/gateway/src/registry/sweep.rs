use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::HandleRegistry;

/// Spawn the background expiry sweep. Runs until the shutdown signal
/// flips, releasing overdue builds and dropping idle-expired handles on
/// each tick.
pub fn spawn_sweep_task(
    registry: HandleRegistry,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_s = interval.as_secs(), "Registry sweep task started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let stats = registry.sweep();
                    if stats.expired > 0 || stats.released > 0 {
                        tracing::debug!(
                            expired = stats.expired,
                            released = stats.released,
                            "Registry sweep pass"
                        );
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Registry sweep task shutting down");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use terralens_common::config::RegistryConfig;
    use terralens_common::descriptor::{
        ComputationDescriptor, CompositeMethod, Region, TemporalRange,
    };

    #[tokio::test]
    async fn test_sweep_task_expires_idle_handles() {
        let registry = HandleRegistry::new(&RegistryConfig {
            handle_ttl_seconds: 0,
            max_handles: 8,
            build_timeout_seconds: 5,
            sweep_interval_seconds: 1,
        });
        registry
            .insert(ComputationDescriptor::Composite {
                dataset: "COPERNICUS/S2_SR_HARMONIZED".into(),
                region: Region::Named {
                    place: "Nairobi".into(),
                },
                range: TemporalRange {
                    start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                },
                method: CompositeMethod::Median,
                cloud_cover_max: None,
            })
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = spawn_sweep_task(registry.clone(), Duration::from_millis(10), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_empty());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
