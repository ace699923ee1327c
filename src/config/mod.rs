pub mod toml_config;

pub use toml_config::EnrichConfig;

#[cfg(feature = "cli")]
use clap::Parser;

/// Command-line flags. Every flag overrides the matching value from the TOML file.
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "sheet-enricher")]
#[command(about = "Enrich spreadsheet rows with answers from a generative text API")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "enricher.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Override run.max_rows_per_run
    #[arg(long)]
    pub max_rows: Option<usize>,

    /// Show which rows would be processed without calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Log CPU and memory usage at batch start and end
    #[arg(long)]
    pub monitor: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl CliArgs {
    /// 將命令列參數套用到配置上
    pub fn apply_to(&self, config: &mut EnrichConfig) {
        if let Some(max_rows) = self.max_rows {
            config.run.max_rows_per_run = Some(max_rows);
            tracing::info!("🔧 max_rows_per_run overridden to: {}", max_rows);
        }
        if self.monitor {
            config.monitoring = Some(toml_config::MonitoringConfig { enabled: true });
        }
    }
}
