//! CRM projections service.
//!
//! ```text
//! crm-projections                              run every enabled subscriber
//! crm-projections sync-log-entries TENANT FILE sync a JSON array of log entries
//! ```
//!
//! Configuration comes from the environment (see `ProjectionsConfig`).
//! `LOG_FORMAT=json` switches to JSON logs; `RUST_LOG` sets the filter.

use anyhow::{Context, Result, bail};
use crm_projections_core::command::CommandClient;
use crm_projections_core::environment::SystemClock;
use crm_projections_core::subscription::{ParkedEventLog, SubscriptionConnector};
use crm_projections_core::sync::LogEntryData;
use crm_projections_neo4j::Neo4jGraphRepository;
use crm_projections_postgres::{PgParkedEventLog, PgSyncRunStore};
use crm_projections_redpanda::{KafkaCommandClient, KafkaConnector, KafkaNotifier};
use crm_projections_runtime::RetryingCommandClient;
use crm_projections_runtime::metrics::MetricsServer;
use crm_projections_subscribers::enrich::HttpEmailValidationApi;
use crm_projections_subscribers::organization::HttpEnrichmentApi;
use crm_projections_subscribers::trace_context::{
    install_global, otel_layer, shutdown_tracing, tracer_provider,
};
use crm_projections_subscribers::{
    ApiClient, GraphContext, LogEntrySyncService, ProjectionsConfig, Subscriber, enrich_subscriber,
    graph_subscriber, organization_subscriber,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ProjectionsConfig::from_env().context("invalid configuration")?;
    if let Some(addr) = &config.metrics_addr {
        MetricsServer::new(addr.parse().context("invalid METRICS_ADDR")?).start()?;
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.as_slice() {
        [] => run_subscribers(&config).await,
        [command, tenant, path] if command == "sync-log-entries" => {
            sync_log_entries(&config, tenant, path).await
        }
        _ => Err(anyhow::anyhow!("usage: crm-projections [sync-log-entries TENANT FILE]")),
    };
    shutdown_tracing();
    result
}

/// Log output plus OpenTelemetry spans, so event spans continue the trace
/// stored in each event's metadata.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,crm_projections_subscribers=info,rdkafka=warn".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "crm-projections".to_string());

    let provider = tracer_provider(&service_name);
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer(&provider));
    install_global(provider);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).init();
    }
}

async fn graph_context(config: &ProjectionsConfig) -> Result<GraphContext> {
    let neo4j = &config.neo4j;
    let graph = Neo4jGraphRepository::connect(
        &neo4j.uri,
        &neo4j.user,
        &neo4j.password,
        neo4j.max_connections,
    )
    .await?;
    graph.init_schema().await;

    let kafka = &config.kafka;
    let commands: Arc<dyn CommandClient> = Arc::new(KafkaCommandClient::new(
        &kafka.brokers,
        &kafka.commands_topic,
    )?);
    let commands = Arc::new(RetryingCommandClient::new(commands, config.retry.clone()));
    let notifier = Arc::new(KafkaNotifier::new(&kafka.brokers, &kafka.completion_topic)?);

    Ok(
        GraphContext::new(Arc::new(graph), commands, notifier, Arc::new(SystemClock))
            .with_app_source(config.app_source.clone())
            .with_visibility(config.visibility_policy()),
    )
}

async fn run_subscribers(config: &ProjectionsConfig) -> Result<()> {
    let ctx = graph_context(config).await?;

    let kafka = &config.kafka;
    let connector: Arc<dyn SubscriptionConnector> = Arc::new(
        KafkaConnector::builder()
            .brokers(&kafka.brokers)
            .topic(&kafka.events_topic)
            .parked_suffix(&kafka.parked_suffix)
            .auto_offset_reset(&kafka.offset_reset)
            .build()?,
    );

    let parked_log: Option<Arc<dyn ParkedEventLog>> = match &config.postgres_url {
        Some(url) => {
            let pool = crm_projections_postgres::connect(url).await?;
            Some(Arc::new(PgParkedEventLog::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set, parked events are only kept on the parked topic");
            None
        }
    };

    let validation = Arc::new(HttpEmailValidationApi::new(ApiClient::new(
        config.email_validation_api.clone(),
    )));
    let enrichment = Arc::new(HttpEnrichmentApi::new(ApiClient::new(
        config.enrichment_api.clone(),
    )));

    let subscribers = [
        graph_subscriber(config, &ctx, Arc::clone(&connector)),
        enrich_subscriber(config, &ctx, Arc::clone(&connector), validation),
        organization_subscriber(config, &ctx, connector, enrichment),
    ];

    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut running = JoinSet::new();
    for subscriber in subscribers {
        let subscriber = match &parked_log {
            Some(log) => subscriber.with_parked_log(Arc::clone(log)),
            None => subscriber,
        };
        if !subscriber.is_enabled() {
            info!(subscriber = subscriber.name(), "Subscriber disabled");
            continue;
        }
        let shutdown_rx = shutdown_rx.clone();
        running.spawn(run_one(subscriber, shutdown_rx));
    }
    info!(subscribers = running.len(), "Subscribers running, press Ctrl+C to stop");

    let mut failed = false;
    tokio::select! {
        signal = signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Unable to listen for shutdown signal"),
            }
        }
        Some(result) = running.join_next() => {
            failed = !matches!(result, Ok(Ok(())));
        }
    }

    let _ = shutdown.send(true);
    while let Some(result) = running.join_next().await {
        if !matches!(result, Ok(Ok(()))) {
            failed = true;
        }
    }

    if failed {
        bail!("a subscriber stopped with an error");
    }
    info!("Shutdown complete");
    Ok(())
}

async fn run_one(subscriber: Subscriber, shutdown: watch::Receiver<bool>) -> Result<()> {
    let name = subscriber.name();
    subscriber.run(shutdown).await.map_err(|e| {
        error!(subscriber = name, error = %e, "Subscriber failed");
        anyhow::Error::new(e).context(format!("{name} subscriber"))
    })
}

async fn sync_log_entries(config: &ProjectionsConfig, tenant: &str, path: &str) -> Result<()> {
    let Some(url) = &config.postgres_url else {
        bail!("DATABASE_URL is required to record sync runs");
    };
    let entries: Vec<LogEntryData> = serde_json::from_slice(
        &tokio::fs::read(path).await.with_context(|| format!("reading {path}"))?,
    )
    .with_context(|| format!("parsing {path}"))?;

    let ctx = graph_context(config).await?;
    let store = Arc::new(PgSyncRunStore::new(crm_projections_postgres::connect(url).await?));
    let service = LogEntrySyncService::new(ctx, store, config.log_entry_sync_concurrency);

    let result = service.sync_log_entries(tenant, entries).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
