use clap::{Args, Subcommand};

use super::OutputFormat;
use glam_catalog::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!("endpoint: {}", config.endpoint.value);
                        println!("  source: {}", config.endpoint.source);
                        println!("search_debounce_ms: {}", config.search_debounce_ms.value);
                        println!("  source: {}", config.search_debounce_ms.source);
                        println!(
                            "request_timeout_secs: {}",
                            config.request_timeout_secs.value
                        );
                        println!("  source: {}", config.request_timeout_secs.source);
                        println!("image_policy: {}", config.image_policy.value);
                        println!("  source: {}", config.image_policy.source);
                        println!();

                        println!("reachability:");
                        println!(
                            "  probe_interval_secs: {}",
                            config.reachability.probe_interval_secs
                        );
                        println!("  offline: {}", config.reachability.offline);
                    }
                }
                Ok(())
            }
        }
    }
}
