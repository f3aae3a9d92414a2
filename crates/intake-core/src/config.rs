//! Configuration module
//!
//! Settings are read from the process environment (after loading `.env`).
//! `IntakeConfig::from_lookup` runs the same parsing against any key lookup so
//! tests never have to mutate the real environment.

use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::store_types::StoreBackend;
use crate::validation::{is_valid_table_identifier, ExtensionAllowList};

const DB_MAX_CONNECTIONS: u32 = 10;
const DB_TIMEOUT_SECS: u64 = 30;
const METADATA_TABLE: &str = "file_metadata";
const NOTIFICATION_TOPIC: &str = "file-intake-notifications";
const RECORD_TTL_SECS: u64 = 1800;
const HISTORY_RETENTION_SECS: u64 = 86_400;
// Ten years; keeps every ttl inside chrono's date range.
const MAX_RETENTION_SECS: u64 = 315_360_000;
const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 60;
const EXPIRY_SWEEP_BATCH_SIZE: usize = 500;
const CHANGE_POLL_INTERVAL_MS: u64 = 1000;
const CHANGE_READ_LIMIT: usize = 100;
const CHANGE_BATCH_SIZE: usize = 5;
const CHANGE_MAX_ATTEMPTS: u32 = 5;
const MAX_CHANGE_BATCH_SIZE: usize = 100;
const INVOCATION_TIMEOUT_SECS: u64 = 30;
const INGEST_MAX_ATTEMPTS: u32 = 5;
const RETRY_BASE_DELAY_MS: u64 = 1000;
const RETRY_MAX_DELAY_SECS: u64 = 300;
const SQS_WAIT_TIME_SECS: i32 = 20;
const SQS_MAX_MESSAGES: i32 = 10;
const WEBHOOK_TIMEOUT_SECS: u64 = 30;
const SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Metadata store connection settings
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub timeout_seconds: u64,
    pub table_name: String,
}

impl StoreConfig {
    /// In-memory store, used by tests and local runs without a database.
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: DB_MAX_CONNECTIONS,
            timeout_seconds: DB_TIMEOUT_SECS,
            table_name: METADATA_TABLE.to_string(),
        }
    }
}

/// Settings consumed by the ingestion validator and the notifier.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub notification_topic: String,
    pub allowed_extensions: ExtensionAllowList,
    pub record_ttl_seconds: u64,
    pub history_retention_seconds: u64,
}

impl PipelineConfig {
    pub fn record_ttl(&self) -> chrono::Duration {
        retention_duration(self.record_ttl_seconds)
    }

    pub fn history_retention(&self) -> chrono::Duration {
        retention_duration(self.history_retention_seconds)
    }
}

fn retention_duration(seconds: u64) -> chrono::Duration {
    chrono::Duration::seconds(seconds.min(MAX_RETENTION_SECS) as i64)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            notification_topic: NOTIFICATION_TOPIC.to_string(),
            allowed_extensions: ExtensionAllowList::default(),
            record_ttl_seconds: RECORD_TTL_SECS,
            history_retention_seconds: HISTORY_RETENTION_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS),
            batch_size: EXPIRY_SWEEP_BATCH_SIZE,
        }
    }
}

/// Change dispatcher polling settings
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub read_limit: usize,
    /// Maximum removal events handed to the notifier in one invocation.
    pub batch_size: usize,
    pub max_attempts: u32,
    pub consumer_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(CHANGE_POLL_INTERVAL_MS),
            read_limit: CHANGE_READ_LIMIT,
            batch_size: CHANGE_BATCH_SIZE,
            max_attempts: CHANGE_MAX_ATTEMPTS,
            consumer_name: "notifier".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub invocation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            invocation_timeout: Duration::from_secs(INVOCATION_TIMEOUT_SECS),
            retry: RetryPolicy::new(
                INGEST_MAX_ATTEMPTS,
                Duration::from_millis(RETRY_BASE_DELAY_MS),
                Duration::from_secs(RETRY_MAX_DELAY_SECS),
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SqsConfig {
    pub queue_url: String,
    pub region: Option<String>,
    pub wait_time_seconds: i32,
    pub max_messages: i32,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub urls: Vec<String>,
    pub signing_secret: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub recipients: Vec<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_tls: bool,
}

/// Complete service configuration
#[derive(Clone, Debug)]
pub struct IntakeConfig {
    pub environment: String,
    pub service_name: String,
    pub log_format: LogFormat,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub sweeper: SweeperConfig,
    pub dispatcher: DispatcherConfig,
    pub worker: WorkerConfig,
    /// Present only when `INTAKE_QUEUE_URL` is set.
    pub sqs: Option<SqsConfig>,
    pub webhook: WebhookConfig,
    pub email: EmailConfig,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reads keys through a lookup function, falling back to defaults on absent
/// or unparsable values.
struct Reader<F> {
    lookup: F,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(default)
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(|v| split_list(&v)).unwrap_or_default()
    }
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let r = Reader { lookup };

        let environment = r
            .get("ENVIRONMENT")
            .or_else(|| r.get("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let backend = match r.get("STORE_BACKEND") {
            Some(value) => value.parse::<StoreBackend>()?,
            None => StoreBackend::Postgres,
        };

        let store = StoreConfig {
            backend,
            database_url: r.get("DATABASE_URL"),
            max_connections: r.parse_or("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS),
            timeout_seconds: r.parse_or("DB_TIMEOUT_SECONDS", DB_TIMEOUT_SECS),
            table_name: r.string_or("METADATA_TABLE", METADATA_TABLE),
        };

        let allowed_extensions = match r.get("ALLOWED_EXTENSIONS") {
            Some(value) => ExtensionAllowList::new(split_list(&value)),
            None => ExtensionAllowList::default(),
        };

        let pipeline = PipelineConfig {
            notification_topic: r.string_or("NOTIFICATION_TOPIC", NOTIFICATION_TOPIC),
            allowed_extensions,
            record_ttl_seconds: r.parse_or("RECORD_TTL_SECONDS", RECORD_TTL_SECS),
            history_retention_seconds: r
                .parse_or("HISTORY_RETENTION_SECONDS", HISTORY_RETENTION_SECS),
        };

        let sweeper = SweeperConfig {
            interval: Duration::from_secs(
                r.parse_or("EXPIRY_SWEEP_INTERVAL_SECS", EXPIRY_SWEEP_INTERVAL_SECS),
            ),
            batch_size: r.parse_or("EXPIRY_SWEEP_BATCH_SIZE", EXPIRY_SWEEP_BATCH_SIZE),
        };

        let dispatcher = DispatcherConfig {
            poll_interval: Duration::from_millis(
                r.parse_or("CHANGE_POLL_INTERVAL_MS", CHANGE_POLL_INTERVAL_MS),
            ),
            read_limit: r.parse_or("CHANGE_READ_LIMIT", CHANGE_READ_LIMIT),
            batch_size: r.parse_or("CHANGE_BATCH_SIZE", CHANGE_BATCH_SIZE),
            max_attempts: r.parse_or("CHANGE_MAX_ATTEMPTS", CHANGE_MAX_ATTEMPTS),
            ..DispatcherConfig::default()
        };

        let worker = WorkerConfig {
            invocation_timeout: Duration::from_secs(
                r.parse_or("INVOCATION_TIMEOUT_SECS", INVOCATION_TIMEOUT_SECS),
            ),
            retry: RetryPolicy::new(
                r.parse_or("INGEST_MAX_ATTEMPTS", INGEST_MAX_ATTEMPTS),
                Duration::from_millis(r.parse_or("RETRY_BASE_DELAY_MS", RETRY_BASE_DELAY_MS)),
                Duration::from_secs(r.parse_or("RETRY_MAX_DELAY_SECS", RETRY_MAX_DELAY_SECS)),
            ),
        };

        let sqs = r.get("INTAKE_QUEUE_URL").map(|queue_url| SqsConfig {
            queue_url,
            region: r.get("AWS_REGION"),
            wait_time_seconds: r.parse_or("SQS_WAIT_TIME_SECS", SQS_WAIT_TIME_SECS),
            max_messages: r.parse_or("SQS_MAX_MESSAGES", SQS_MAX_MESSAGES),
        });

        let webhook = WebhookConfig {
            urls: r.list("WEBHOOK_URLS"),
            signing_secret: r.get("WEBHOOK_SIGNING_SECRET"),
            timeout_seconds: r.parse_or("WEBHOOK_TIMEOUT_SECONDS", WEBHOOK_TIMEOUT_SECS),
        };

        let email = EmailConfig {
            recipients: r.list("EMAIL_RECIPIENTS"),
            smtp_host: r.get("SMTP_HOST"),
            smtp_port: r.parse_or("SMTP_PORT", SMTP_PORT),
            smtp_user: r.get("SMTP_USER"),
            smtp_password: r.get("SMTP_PASSWORD"),
            smtp_from: r.get("SMTP_FROM"),
            smtp_tls: r.bool_or("SMTP_TLS", true),
        };

        Ok(Self {
            environment,
            service_name: r.string_or("SERVICE_NAME", "intake-service"),
            log_format: LogFormat::parse(&r.string_or("LOG_FORMAT", "pretty")),
            store,
            pipeline,
            sweeper,
            dispatcher,
            worker,
            sqs,
            webhook,
            email,
        })
    }

    /// Check if the service is running in production mode
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.pipeline.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_EXTENSIONS must contain at least one extension"
            ));
        }

        if !(1..=MAX_RETENTION_SECS).contains(&self.pipeline.record_ttl_seconds) {
            return Err(anyhow::anyhow!(
                "RECORD_TTL_SECONDS must be between 1 and {}",
                MAX_RETENTION_SECS
            ));
        }

        if !(1..=MAX_RETENTION_SECS).contains(&self.pipeline.history_retention_seconds) {
            return Err(anyhow::anyhow!(
                "HISTORY_RETENTION_SECONDS must be between 1 and {}",
                MAX_RETENTION_SECS
            ));
        }

        if self.sweeper.batch_size == 0 {
            return Err(anyhow::anyhow!("EXPIRY_SWEEP_BATCH_SIZE must be at least 1"));
        }

        if self.dispatcher.read_limit == 0 {
            return Err(anyhow::anyhow!("CHANGE_READ_LIMIT must be at least 1"));
        }

        if self.dispatcher.batch_size == 0 || self.dispatcher.batch_size > MAX_CHANGE_BATCH_SIZE {
            return Err(anyhow::anyhow!(
                "CHANGE_BATCH_SIZE must be between 1 and {}",
                MAX_CHANGE_BATCH_SIZE
            ));
        }

        if self.dispatcher.max_attempts == 0 {
            return Err(anyhow::anyhow!("CHANGE_MAX_ATTEMPTS must be at least 1"));
        }

        if !is_valid_table_identifier(&self.store.table_name) {
            return Err(anyhow::anyhow!(
                "METADATA_TABLE must match ^[a-z_][a-z0-9_]{{0,47}}$, got '{}'",
                self.store.table_name
            ));
        }

        if self.store.backend == StoreBackend::Postgres {
            match &self.store.database_url {
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when using the postgres store backend"
                    ))
                }
                Some(url)
                    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) =>
                {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                Some(_) => {}
            }
        }

        if !self.email.recipients.is_empty()
            && (self.email.smtp_host.is_none() || self.email.smtp_from.is_none())
        {
            return Err(anyhow::anyhow!(
                "EMAIL_RECIPIENTS requires SMTP_HOST and SMTP_FROM to be set"
            ));
        }

        if let Some(sqs) = &self.sqs {
            if !(1..=10).contains(&sqs.max_messages) {
                return Err(anyhow::anyhow!("SQS_MAX_MESSAGES must be between 1 and 10"));
            }
            if !(0..=20).contains(&sqs.wait_time_seconds) {
                return Err(anyhow::anyhow!("SQS_WAIT_TIME_SECS must be between 0 and 20"));
            }
        }

        Ok(())
    }
}
