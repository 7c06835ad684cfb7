use clap::Args;

use super::{print_snapshot, Catalog, OutputFormat};
use glam_catalog::config::Config;

/// Delete the cached category with the highest id
#[derive(Args)]
pub struct DeleteLastCommand {
    /// Output format for the remaining categories
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl DeleteLastCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        // Offline so the initial load only reads the cache
        let catalog = Catalog::open_offline(config).await?;
        let (handle, mut outputs) = catalog.spawn_controller(config);

        handle.initial_load()?;
        let before = outputs
            .snapshots
            .recv()
            .await
            .ok_or("sync controller stopped before reading the cache")?;

        let Some(last) = before.items().last() else {
            println!("No categories to delete");
            return Ok(());
        };
        println!("Deleting {}", last);
        handle.delete_last()?;

        tokio::select! {
            after = outputs.snapshots.recv() => {
                let after = after.ok_or("sync controller stopped before the delete finished")?;
                print_snapshot(&after, self.format, catalog.image_policy(), false)?;
                Ok(())
            }
            diagnostic = outputs.diagnostics.recv() => match diagnostic {
                Some(diagnostic) => Err(diagnostic.error.into()),
                None => Err("sync controller stopped before the delete finished".into()),
            },
        }
    }
}
