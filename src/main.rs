use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use wx_relay::config::toml_config::LogFormat;
use wx_relay::utils::{logger, validation::Validate};
use wx_relay::{CliConfig, Relay, RelayConfig};

#[tokio::main]
async fn main() {
    let args = CliConfig::parse();

    // 載入 TOML 配置
    let config = match RelayConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 初始化日誌
    let format = if args.json_logs {
        LogFormat::Json
    } else {
        config.logging.format()
    };
    logger::init_cli_logger(args.verbose, config.logging.level(), format);

    tracing::info!("🚀 Starting wx-relay {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("📁 Configuration loaded from: {}", args.config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    if args.dry_run {
        if let Err(e) = perform_dry_run(&config) {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    if let Err(e) = Relay::new(config).run(shutdown).await {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Relay failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = e.exit_code();
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

/// 收到 Ctrl-C 或 SIGTERM 時取消
async fn wait_for_shutdown(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("🛑 Ctrl-C received"),
                    _ = terminate.recv() => tracing::info!("🛑 SIGTERM received"),
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Cannot listen for SIGTERM: {}", e);
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("🛑 Ctrl-C received");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Ctrl-C received");
        }
    }

    shutdown.cancel();
}

fn perform_dry_run(config: &RelayConfig) -> anyhow::Result<()> {
    let table = config
        .translation_table()
        .context("translation table is invalid")?;

    println!("🔍 Dry Run Analysis:");
    println!();
    println!("📡 Decoder command:");
    println!("  {}", config.decoder.command());
    println!();

    println!("🌐 Endpoint:");
    println!("  URL: {}", config.endpoint.base_url());
    println!("  Method: {:?}", config.endpoint.method());
    println!("  Station: {}", config.endpoint.station_id);
    println!(
        "  Retries: {} attempts, timeout {:?}",
        config.endpoint.retry_attempts(),
        config.endpoint.timeout()
    );
    if let Some(interval) = config.endpoint.min_interval() {
        println!("  Min interval: {:?}", interval);
    }
    println!();

    println!("🔄 Translations ({} rules):", table.len());
    for rule in table.rules() {
        match rule.conversion {
            Some(kind) => println!(
                "  {} -> {} ({})",
                rule.source_field, rule.target_field, kind
            ),
            None => println!("  {} -> {}", rule.source_field, rule.target_field),
        }
    }

    for target in table.duplicate_targets() {
        println!("  ⚠️ '{}' is written by more than one rule", target);
    }

    Ok(())
}
