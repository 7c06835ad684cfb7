use clap::Args;

use super::{print_snapshot, Catalog, OutputFormat};
use glam_catalog::config::Config;
use glam_catalog::db::{CategoryQuery, RecordStore, SortOrder};
use glam_catalog::models::Snapshot;

/// List cached categories without touching the network
#[derive(Args)]
pub struct ListCommand {
    /// Only show categories whose name contains TEXT (case-insensitive)
    #[arg(long, short, value_name = "TEXT")]
    search: Option<String>,

    /// Highest id first
    #[arg(long)]
    desc: bool,

    /// Prefer low-resolution images
    #[arg(long)]
    low_data: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ListCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = Catalog::open_offline(config).await?;

        let mut query = CategoryQuery::search(self.search.as_deref().unwrap_or(""));
        if self.desc {
            query = query.with_order(SortOrder::Descending);
        }

        let mut subscription = catalog.publisher.observe(query);
        let rows = match subscription.next().await {
            Some(result) => result?,
            None => return Err("category query ended without a result".into()),
        };
        let snapshot = Snapshot::new(rows.iter().cloned());

        print_snapshot(&snapshot, self.format, catalog.image_policy(), self.low_data)?;

        if let OutputFormat::Text = self.format {
            match catalog.store.last_refreshed_at().await? {
                Some(at) => println!("Last refreshed: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("Last refreshed: never"),
            }
        }
        Ok(())
    }
}
