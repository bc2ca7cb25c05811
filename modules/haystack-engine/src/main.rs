use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use haystack_common::Config;
use haystack_engine::bootstrap::build_pipeline;
use haystack_engine::scheduler::CycleScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("haystack=info".parse()?))
        .init();

    info!("Haystack starting...");

    let config = Arc::new(Config::from_env());
    config.log_redacted();

    let pipeline = build_pipeline(config.clone());
    let scheduler = CycleScheduler::start(pipeline, &config);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.stop();

    Ok(())
}
