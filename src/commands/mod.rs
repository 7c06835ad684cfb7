mod config_cmd;
mod delete_last;
mod list;
mod refresh;
mod watch;

pub use config_cmd::ConfigCommand;
pub use delete_last::DeleteLastCommand;
pub use list::ListCommand;
pub use refresh::RefreshCommand;
pub use watch::WatchCommand;

use clap::ValueEnum;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use glam_catalog::config::Config;
use glam_catalog::db::CategoryStore;
use glam_catalog::models::{CategoryRecord, ImagePolicy, Snapshot};
use glam_catalog::net::{probe, HttpCategorySource, Reachability};
use glam_catalog::sync::{QueryPublisher, SyncController, SyncHandle, SyncOutputs};

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Everything a command needs to drive the sync pipeline.
pub struct Catalog {
    pub store: Arc<CategoryStore>,
    pub publisher: QueryPublisher,
    pub reachability: Reachability,
    source: Arc<HttpCategorySource>,
}

impl Catalog {
    /// Opens the cache and probes the endpoint once to seed reachability.
    pub async fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(CategoryStore::open(&config.database_path.value).await?);
        let source = Arc::new(HttpCategorySource::new(config.fetch_config())?);

        let reachability = if config.reachability.offline {
            Reachability::fixed(false)
        } else {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs.value))
                .build()?;
            Reachability::new(probe(&client, source.endpoint()).await)
        };
        tracing::debug!(reachable = reachability.is_reachable(), "catalog opened");

        Ok(Self {
            publisher: QueryPublisher::new(store.clone()),
            store,
            reachability,
            source,
        })
    }

    /// Opens the cache without touching the network.
    pub async fn open_offline(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(CategoryStore::open(&config.database_path.value).await?);
        Ok(Self {
            publisher: QueryPublisher::new(store.clone()),
            source: Arc::new(HttpCategorySource::new(config.fetch_config())?),
            reachability: Reachability::fixed(false),
            store,
        })
    }

    pub fn image_policy(&self) -> ImagePolicy {
        self.source.image_policy()
    }

    pub fn spawn_controller(&self, config: &Config) -> (SyncHandle, SyncOutputs) {
        SyncController::spawn(
            self.publisher.clone(),
            self.source.clone(),
            self.reachability.subscribe(),
            config.sync_settings(),
        )
    }
}

#[derive(Serialize)]
struct CategoryRow<'a> {
    id: i64,
    name: &'a str,
    image: &'a str,
    path: &'a str,
}

impl<'a> CategoryRow<'a> {
    fn new(record: &'a CategoryRecord, policy: ImagePolicy, low_data: bool) -> Self {
        Self {
            id: record.id,
            name: &record.name,
            image: policy.select(record, low_data),
            path: &record.path,
        }
    }
}

pub fn print_snapshot(
    snapshot: &Snapshot,
    format: OutputFormat,
    policy: ImagePolicy,
    low_data: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows: Vec<CategoryRow> = snapshot
        .items()
        .iter()
        .map(|r| CategoryRow::new(r, policy, low_data))
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No categories found");
                return Ok(());
            }
            println!("{:>6}  {:<30}  IMAGE", "ID", "NAME");
            println!("{}", "-".repeat(80));
            for row in &rows {
                let name = if row.name.chars().count() > 30 {
                    format!("{}...", row.name.chars().take(27).collect::<String>())
                } else {
                    row.name.to_string()
                };
                println!("{:>6}  {:<30}  {}", row.id, name, row.image);
            }
            println!("\nTotal: {} category(ies)", rows.len());
        }
    }
    Ok(())
}
