use std::sync::Arc;

use autopost::config::{LogStoreConfig, PipelineConfig, SchedulerConfig};
use autopost::llm::{LlmBackend, LlmConfig};
use autopost::logstore::ExecutionLogStore;
use autopost::pipeline::{AutomationRunner, RunnerDeps};
use autopost::registry::JsonFileRegistry;
use autopost::scheduler::Scheduler;
use autopost::transport::TelegramTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });
    let model = std::env::var("AUTOPOST_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: TELEGRAM_BOT_TOKEN not set");
        std::process::exit(1);
    });
    let automations_path = std::env::var("AUTOPOST_AUTOMATIONS")
        .unwrap_or_else(|_| "./data/automations.json".to_string());

    eprintln!("📮 autopost v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Automations: {}", automations_path);

    let llm = LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    }
    .build()?;

    let registry = Arc::new(JsonFileRegistry::new(&automations_path));
    let transport = TelegramTransport::new(bot_token);
    let log_config = LogStoreConfig::from_env();
    eprintln!("   Logs: {}", log_config.logs_dir.display());
    let logs = ExecutionLogStore::new(log_config);

    let runner = Arc::new(AutomationRunner::new(
        PipelineConfig::default(),
        RunnerDeps {
            registry: registry.clone(),
            transport: transport.clone(),
            llm,
            logs,
        },
    ));

    // Manual trigger: `autopost run <automation-id>` executes once and exits.
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 3 && args[1] == "run" {
        let record = runner.run(&args[2]).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    // Feed the history cache from incoming updates.
    let _poller = transport.clone().spawn_update_poller();

    let scheduler = Scheduler::new(registry, runner, SchedulerConfig::default());
    eprintln!("   Scheduler: running\n");
    let handle = scheduler.spawn();
    handle.await?;

    Ok(())
}
