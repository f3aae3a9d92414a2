mod setup;

use intake_core::IntakeConfig;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = IntakeConfig::from_env()?;

    // Build the store, topic and pipeline components, then start the loops
    let app = crate::setup::initialize_app(&config).await?;
    let tasks = crate::setup::start_tasks(&config, app).await?;

    crate::setup::shutdown::wait_for_signal().await;
    crate::setup::shutdown::stop_tasks(tasks).await;

    intake_infra::shutdown_telemetry().await;
    Ok(())
}
