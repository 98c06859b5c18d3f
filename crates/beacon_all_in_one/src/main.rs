mod config;

use anyhow::Context;
use beacon_runner::{RestartPolicy, Runner};
use common::clickhouse::{ClickHouseClient, ClickHouseConfig, ClickHouseEnvelopeRepository};
use common::domain::{EnvelopeRepository, EventType};
use common::nats::{ensure_streams, NatsClient, NatsConnectConfig, PublishRetryConfig};
use common::postgres::{PostgresClient, PostgresConfig, PostgresWriteKeyRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use crate::config::ServiceConfig;
use event_drain::{EventDrain, EventDrainConfig, NatsConsumerConnector};
use ingest_api::{
    CredentialResolver, DeliveryMode, DeliveryRouter, EnvelopeLogProducer, HttpServerConfig,
    IngestApi, IngestionService,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (JSON logs, plus OpenTelemetry traces and logs when enabled)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    let delivery_mode: DeliveryMode = match config.delivery_mode.parse() {
        Ok(mode) => mode,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    info!(
        delivery_mode = %delivery_mode,
        otel_enabled = config.otel_enabled,
        "Starting beacon service"
    );
    debug!("Configuration: {:?}", config);

    let deps = match initialize_shared_dependencies(&config, delivery_mode).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {:#}", e);
            std::process::exit(1);
        }
    };

    // Credential resolution and delivery
    let resolver = CredentialResolver::new(
        Arc::new(PostgresWriteKeyRepository::new(deps.postgres.clone())),
        Duration::from_secs(config.credential_lookup_timeout_secs),
    );
    let router = match &deps.nats {
        Some(nats) => DeliveryRouter::buffered(Arc::new(EnvelopeLogProducer::new(
            nats.create_publisher_client(),
            publish_retry_config(&config),
        ))),
        None => DeliveryRouter::direct(deps.envelope_repository.clone()),
    };
    let ingestion = Arc::new(IngestionService::new(resolver, router));

    let ingest_api = IngestApi::new(
        ingestion,
        HttpServerConfig {
            host: config.http_host.clone(),
            port: config.http_port,
        },
    );

    let mut runner = Runner::new().with_named_process("ingest_api", ingest_api.into_runner_process());

    if delivery_mode == DeliveryMode::Buffered && config.drain_enabled {
        let drain = EventDrain::new(
            Arc::new(NatsConsumerConnector::new(nats_connect_config(
                &config,
                "beacon-drain",
            ))),
            deps.envelope_repository.clone(),
            EventDrainConfig {
                consumer_group: config.nats_consumer_group.clone(),
                batch_size: config.drain_batch_size,
                max_wait: Duration::from_millis(config.drain_max_wait_ms),
                restart_policy: RestartPolicy {
                    max_restarts: config.drain_max_restarts,
                    restart_delay: Duration::from_secs(config.drain_restart_delay_secs),
                    ..RestartPolicy::default()
                },
            },
        );
        runner = runner.with_named_process("event_drain", drain.into_runner_process());
    } else {
        info!("Event drain disabled");
    }

    // Add cleanup handlers
    let SharedDependencies { postgres, nats, .. } = deps;
    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");

            if let Some(nats) = nats {
                if let Err(e) = nats.close().await {
                    error!("Failed to close NATS connection: {:#}", e);
                }
            }
            postgres.close();

            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

struct SharedDependencies {
    postgres: PostgresClient,
    envelope_repository: Arc<dyn EnvelopeRepository>,
    /// Publish connection, only in buffered mode
    nats: Option<NatsClient>,
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
    delivery_mode: DeliveryMode,
) -> anyhow::Result<SharedDependencies> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);

    info!("Initializing PostgreSQL...");
    let postgres = PostgresClient::new(&PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
    })?;
    within(startup_timeout, "PostgreSQL ping", postgres.ping()).await?;

    info!("Initializing ClickHouse...");
    let clickhouse = ClickHouseClient::new(&ClickHouseConfig {
        url: config.clickhouse_url.clone(),
        database: config.clickhouse_database.clone(),
        username: config.clickhouse_username.clone(),
        password: config.clickhouse_password.clone(),
    });
    within(startup_timeout, "ClickHouse ping", clickhouse.ping()).await?;
    let envelope_repository: Arc<dyn EnvelopeRepository> =
        Arc::new(ClickHouseEnvelopeRepository::new(
            clickhouse,
            config.clickhouse_table.clone(),
            Duration::from_secs(config.clickhouse_insert_timeout_secs),
        ));

    let nats = match delivery_mode {
        DeliveryMode::Direct => None,
        DeliveryMode::Buffered => {
            info!("Initializing NATS...");
            let client = within(
                startup_timeout,
                "NATS connect",
                NatsClient::connect(&nats_connect_config(config, "beacon-ingest")),
            )
            .await?;

            let topics: Vec<&str> = EventType::ALL.iter().map(|t| t.topic()).collect();
            ensure_streams(
                client.create_publisher_client().as_ref(),
                &topics,
                config.nats_stream_replicas,
            )
            .await?;

            Some(client)
        }
    };

    Ok(SharedDependencies {
        postgres,
        envelope_repository,
        nats,
    })
}

async fn within<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .with_context(|| format!("{} timed out after {:?}", what, timeout))?
}

fn nats_connect_config(config: &ServiceConfig, client_name: &str) -> NatsConnectConfig {
    NatsConnectConfig {
        urls: config.nats_urls.clone(),
        client_name: client_name.to_string(),
        connect_timeout: Duration::from_secs(config.nats_connect_timeout_secs),
        request_timeout: Duration::from_secs(config.nats_request_timeout_secs),
    }
}

fn publish_retry_config(config: &ServiceConfig) -> PublishRetryConfig {
    PublishRetryConfig {
        max_retries: config.publish_max_retries,
        initial_backoff: Duration::from_millis(config.publish_initial_backoff_ms),
        max_backoff: Duration::from_millis(config.publish_max_backoff_ms),
        attempt_timeout: Duration::from_secs(config.nats_request_timeout_secs),
    }
}
