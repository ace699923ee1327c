use clap::Parser;
use sheet_enricher::utils::error::ErrorSeverity;
use sheet_enricher::utils::{logger, validation::Validate};
use sheet_enricher::{CliArgs, EnrichApp, EnrichConfig, LocalStorage, RunReport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting sheet-enricher");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match EnrichConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 應用命令列覆蓋設定
    args.apply_to(&mut config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    println!("📋 Run summary:");
    println!("   Mode: {:?}", config.mode());
    println!("   Sheet: {}/{}", config.base_path(), config.run.sheet);
    println!("   Model: {}", config.model());
    println!("   Max rows per run: {}", config.max_rows_per_run());
    println!("   Interaction log: {}", config.log_path());
    if config.api_key().is_none() {
        println!("   ⚠️ No API key configured (api.api_key or GEMINI_API_KEY)");
    }

    if config.monitoring_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.base_path().to_string());
    let app = EnrichApp::new(storage, config);

    match app.run(args.dry_run).await {
        Ok(RunReport::Planned(plan)) => {
            println!("🔍 Dry run - no API calls were made");
            println!("   Rows to process: {:?}", plan.pending);
            println!("   Already processed: {}", plan.skipped);
            println!("   Invalid: {}", plan.invalid);
        }
        Ok(RunReport::Completed(summary)) => {
            tracing::info!("✅ Batch completed");
            println!("✅ Batch completed!");
            println!(
                "   Processed: {}, Skipped: {}, Invalid: {}, Failed: {}, Checked: {}",
                summary.processed, summary.skipped, summary.invalid, summary.failed, summary.checked
            );
            if summary.cap_reached {
                println!("⏸️ Row limit reached, run again to continue");
            }
        }
        Err(e) => {
            tracing::error!("❌ Run failed: {} (Severity: {:?})", e, e.severity());
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e);
            eprintln!("💡 {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
