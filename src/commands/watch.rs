use clap::Args;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{print_snapshot, Catalog, OutputFormat};
use glam_catalog::config::Config;
use glam_catalog::models::Snapshot;

/// Interactive session: each input line is a search keyword
///
/// `:refresh`, `:delete` and `:quit` are handled as commands.
#[derive(Args)]
pub struct WatchCommand {
    /// Prefer low-resolution images
    #[arg(long)]
    low_data: bool,
}

enum Input {
    Refresh,
    Delete,
    Quit,
    Search(String),
}

impl Input {
    fn parse(line: &str) -> Self {
        match line.trim() {
            ":refresh" | ":r" => Input::Refresh,
            ":delete" | ":d" => Input::Delete,
            ":quit" | ":q" => Input::Quit,
            _ => Input::Search(line.to_string()),
        }
    }
}

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = Catalog::open(config).await?;
        let probe = (!config.reachability.offline).then(|| {
            catalog.reachability.spawn_probe(
                config.endpoint.value.clone(),
                Duration::from_secs(config.reachability.probe_interval_secs.max(1)),
                Duration::from_secs(config.request_timeout_secs.value),
            )
        });

        let (handle, mut outputs) = catalog.spawn_controller(config);
        handle.initial_load()?;

        println!("Type to search. Commands: :refresh, :delete, :quit");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut previous = Snapshot::empty();

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => match Input::parse(&line) {
                        Input::Refresh => handle.pull_to_refresh()?,
                        Input::Delete => handle.delete_last()?,
                        Input::Quit => break,
                        Input::Search(keyword) => handle.search(keyword)?,
                    },
                    None => break,
                },
                Some(snapshot) = outputs.snapshots.recv() => {
                    let diff = snapshot.diff(&previous);
                    if !diff.is_empty() {
                        println!(
                            "-- +{} -{} ~{}",
                            diff.inserted.len(),
                            diff.removed.len(),
                            diff.updated.len()
                        );
                    }
                    print_snapshot(&snapshot, OutputFormat::Text, catalog.image_policy(), self.low_data)?;
                    previous = snapshot;
                }
                Some(done) = outputs.loading_complete.recv() => {
                    println!("-- {}", done.outcome);
                }
                Some(diagnostic) = outputs.diagnostics.recv() => {
                    eprintln!("-- {}", diagnostic);
                }
            }
        }

        if let Some(probe) = probe {
            probe.abort();
        }
        Ok(())
    }
}
