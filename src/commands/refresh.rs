use clap::Args;

use super::Catalog;
use glam_catalog::config::Config;
use glam_catalog::sync::RefreshOutcome;

/// Fetch the latest categories and replace the local cache
#[derive(Args)]
pub struct RefreshCommand {}

impl RefreshCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = Catalog::open(config).await?;
        let (handle, mut outputs) = catalog.spawn_controller(config);

        println!("Refreshing from {}...", config.endpoint.value);
        handle.initial_load()?;

        let done = outputs
            .loading_complete
            .recv()
            .await
            .ok_or("sync controller stopped before the refresh finished")?;

        while let Ok(diagnostic) = outputs.diagnostics.try_recv() {
            eprintln!("  {}", diagnostic);
        }

        match done.outcome {
            RefreshOutcome::Refreshed { records } => {
                println!("✓ Cache updated with {} category(ies)", records);
                Ok(())
            }
            RefreshOutcome::Offline => {
                println!("Endpoint unreachable, keeping cached data");
                Ok(())
            }
            outcome => Err(outcome.to_string().into()),
        }
    }
}
