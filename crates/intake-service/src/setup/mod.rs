//! Service setup and initialization
//!
//! Everything is wired explicitly here: one store, one topic, and the
//! pipeline components that share them.

pub mod notifications;
pub mod shutdown;

use anyhow::{Context, Result};
use intake_core::IntakeConfig;
use intake_pipeline::{
    BackgroundTask, ChangeDispatcher, ExpirySweeper, IngestionValidator, Notifier,
};
use intake_store::create_store;
use std::sync::Arc;

/// Components built from configuration, not yet running.
pub struct App {
    pub validator: Arc<IngestionValidator>,
    pub dispatcher: Arc<ChangeDispatcher>,
    pub sweeper: Arc<ExpirySweeper>,
}

pub async fn initialize_app(config: &IntakeConfig) -> Result<App> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    intake_infra::init_telemetry(&config.service_name, config.log_format)
        .context("Failed to initialize telemetry")?;

    tracing::info!(
        environment = %config.environment,
        store_backend = %config.store.backend,
        allowed_extensions = %config.pipeline.allowed_extensions.extensions().join(","),
        record_ttl_secs = config.pipeline.record_ttl_seconds,
        "Configuration loaded and validated successfully"
    );

    let store = create_store(&config.store)
        .await
        .context("Failed to initialize metadata store")?;

    let topic = Arc::new(notifications::build_topic(config)?);

    let validator = Arc::new(IngestionValidator::from_config(
        store.metadata.clone(),
        topic.clone(),
        &config.pipeline,
    ));
    let notifier = Arc::new(Notifier::new(store.metadata.clone(), topic));
    let dispatcher = Arc::new(ChangeDispatcher::new(
        store.changes.clone(),
        notifier,
        config.dispatcher.clone(),
    ));
    let sweeper = Arc::new(ExpirySweeper::from_config(
        store.metadata.clone(),
        &config.sweeper,
        &config.pipeline,
    ));

    Ok(App {
        validator,
        dispatcher,
        sweeper,
    })
}

/// Spawn the dispatcher, the sweeper and, when a queue is configured, the
/// ingestion worker.
pub async fn start_tasks(config: &IntakeConfig, app: App) -> Result<Vec<BackgroundTask>> {
    let mut tasks = vec![app.dispatcher.spawn(), app.sweeper.spawn()];

    if let Some(worker) = ingestion_worker(config, app.validator).await? {
        tasks.push(worker);
    }

    tracing::info!(
        tasks = %tasks.iter().map(|t| t.name()).collect::<Vec<_>>().join(","),
        "Intake service running"
    );
    Ok(tasks)
}

#[cfg(feature = "sqs")]
async fn ingestion_worker(
    config: &IntakeConfig,
    validator: Arc<IngestionValidator>,
) -> Result<Option<BackgroundTask>> {
    use intake_pipeline::{IngestionWorker, SqsEventSource};

    let Some(sqs) = &config.sqs else {
        tracing::warn!("INTAKE_QUEUE_URL not set; ingestion worker disabled");
        return Ok(None);
    };

    let source = Arc::new(SqsEventSource::from_config(sqs).await);
    let worker = Arc::new(IngestionWorker::new(source, validator, config.worker.clone()));
    Ok(Some(worker.spawn()))
}

#[cfg(not(feature = "sqs"))]
async fn ingestion_worker(
    config: &IntakeConfig,
    _validator: Arc<IngestionValidator>,
) -> Result<Option<BackgroundTask>> {
    if config.sqs.is_some() {
        anyhow::bail!("INTAKE_QUEUE_URL is set but the sqs feature is not enabled");
    }
    tracing::warn!("Ingestion worker disabled (sqs feature not enabled)");
    Ok(None)
}
