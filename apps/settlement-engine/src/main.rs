//! Settlement Engine Binary
//!
//! Starts the settlement core: outbox dispatcher, order-submission worker,
//! catch-up poller, stream supervisor, replay worker and the operations
//! HTTP server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin settlement-engine -- config.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `SETTLEMENT_CONFIG`: config path when no argument is given (default: `config.yaml`)
//! - `RUST_LOG`: overrides the configured log level
//! - any `${VAR}` referenced from the config file

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use settlement_engine::application::ports::{
    MessageConsumerPort, MessagePublisherPort, TransactionManager,
};
use settlement_engine::application::services::{
    CatchUpPoller, ConnectorHealthHandle, ExecutionIngestionService, OrderLifecycleService,
    OrderSubmissionWorker, OutboxDispatcher, OutboxWriter, RateLimitRetryExecutor, ReplayWorker,
    StreamSupervisor,
};
use settlement_engine::application::use_cases::{RequestReplayUseCase, SubmitToExchangeUseCase};
use settlement_engine::config::{Config, MessagingBackend, PersistenceBackend, load_config};
use settlement_engine::domain::connector::ConnectorStateRepository;
use settlement_engine::domain::outbox::{
    EventPayload, EventType, OrderSubmittedV1, OutboxRelayStore, topic_name,
};
use settlement_engine::infrastructure::exchange::binance::{
    BinanceExchangeAdapter, BinanceUserStream,
};
use settlement_engine::infrastructure::http::{AppState, create_router};
use settlement_engine::infrastructure::messaging::{
    InMemoryBroker, RedisStreamsConsumer, RedisStreamsPublisher,
};
use settlement_engine::infrastructure::persistence::{InMemoryStore, PgStore};
use settlement_engine::observability::{MetricsConfig, init_metrics, init_tracing};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool acquire timeout.
const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS operations
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    let _ = dotenvy::dotenv();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SETTLEMENT_CONFIG").ok())
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = load_config(Some(&path)).with_context(|| format!("loading {path}"))?;

    init_tracing(&config.observability.logging)?;
    if let Some(port) = config.observability.metrics_port {
        init_metrics(&MetricsConfig::on_port(port))?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path,
        persistence = ?config.persistence.backend,
        messaging = ?config.messaging.backend,
        exchange = %config.exchange.name,
        environment = %config.exchange.environment,
        "Starting settlement engine"
    );

    let shutdown = CancellationToken::new();
    match config.persistence.backend {
        PersistenceBackend::Postgres => {
            let store = PgStore::connect(
                &config.persistence.database_url,
                config.persistence.max_connections,
                DB_ACQUIRE_TIMEOUT,
            )
            .await?;
            if config.persistence.run_migrations {
                store.migrate().await?;
                tracing::info!("Database migrations applied");
            }
            with_store(config, Arc::new(store), shutdown).await
        }
        PersistenceBackend::Memory => {
            tracing::warn!("In-memory store selected; state is lost on exit");
            with_store(config, Arc::new(InMemoryStore::new()), shutdown).await
        }
    }
}

/// Bind the broker backend, then run.
async fn with_store<T>(
    config: Config,
    store: Arc<T>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    T: TransactionManager + OutboxRelayStore + ConnectorStateRepository + 'static,
{
    let submitted_topic = topic_name(
        &config.messaging.topic_prefix,
        EventType::OrderSubmitted,
        OrderSubmittedV1::SCHEMA_VERSION,
    );

    match config.messaging.backend {
        MessagingBackend::Redis => {
            let mut publisher = RedisStreamsPublisher::new(&config.messaging.redis_url)?;
            if let Some(max_len) = config.messaging.stream_max_len {
                publisher = publisher.with_max_len(max_len);
            }
            let consumer = RedisStreamsConsumer::new(
                &config.messaging.redis_url,
                submitted_topic,
                config.messaging.consumer_group.clone(),
                config.messaging.consumer_name.clone(),
            )
            .await?;
            run(config, store, Arc::new(publisher), Arc::new(consumer), shutdown).await
        }
        MessagingBackend::Memory => {
            tracing::warn!("In-memory broker selected; events stay in this process");
            let broker = InMemoryBroker::new();
            let consumer = broker.consumer(submitted_topic, config.messaging.consumer_group.clone());
            run(config, store, Arc::new(broker), Arc::new(consumer), shutdown).await
        }
    }
}

/// Wire services and run every task until a shutdown signal.
async fn run<T, P, C>(
    config: Config,
    store: Arc<T>,
    publisher: Arc<P>,
    consumer: Arc<C>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    T: TransactionManager + OutboxRelayStore + ConnectorStateRepository + 'static,
    P: MessagePublisherPort + 'static,
    C: MessageConsumerPort + 'static,
{
    let exchange_name = config.exchange.name.clone();
    let connector_store: Arc<dyn ConnectorStateRepository> = store.clone();
    let catalog = Arc::new(config.instruments.catalog());
    tracing::info!(
        instruments = catalog.len(),
        "Instrument catalog loaded"
    );

    let outbox = OutboxWriter::new(config.messaging.topic_prefix.clone());
    let lifecycle = Arc::new(OrderLifecycleService::new(
        Arc::clone(&store),
        catalog.clone(),
        outbox.clone(),
    ));
    let ingestion = Arc::new(ExecutionIngestionService::new(
        Arc::clone(&store),
        Arc::clone(&lifecycle),
        catalog.clone(),
        outbox,
    ));
    let health = ConnectorHealthHandle::restore(
        &exchange_name,
        Arc::clone(&connector_store),
        config.connector.poller.down_threshold(),
    )
    .await;

    let mut tasks = JoinSet::new();

    let dispatcher = OutboxDispatcher::new(Arc::clone(&store), publisher, config.outbox.dispatcher());
    let token = shutdown.clone();
    tasks.spawn(async move { dispatcher.run(token).await });

    if config.exchange.has_credentials() {
        let binance = config
            .exchange
            .binance(config.connector.stream.listen_key_keepalive())
            .map_err(anyhow::Error::msg)?;
        let adapter = Arc::new(BinanceExchangeAdapter::new(&binance)?);
        let retry = RateLimitRetryExecutor::new(config.exchange.retry.policy());

        let submit = Arc::new(SubmitToExchangeUseCase::new(
            adapter.clone(),
            retry.clone(),
            Arc::clone(&lifecycle),
        ));
        let worker =
            OrderSubmissionWorker::new(consumer, submit, config.messaging.submission_worker());
        let token = shutdown.clone();
        tasks.spawn(async move { worker.run(token).await });

        let poller = Arc::new(CatchUpPoller::new(
            adapter.clone(),
            retry,
            Arc::clone(&lifecycle),
            Arc::clone(&ingestion),
            catalog.clone(),
            health.clone(),
            config.connector.poller.poller(&exchange_name),
        ));
        if config.connector.poller.enabled {
            let poller = Arc::clone(&poller);
            let token = shutdown.clone();
            tasks.spawn(async move { poller.run(token).await });
        }

        let replay_worker = ReplayWorker::new(
            Arc::clone(&connector_store),
            poller,
            config.connector.replay.poll_interval(),
        );
        let token = shutdown.clone();
        tasks.spawn(async move { replay_worker.run(token).await });

        if config.connector.stream.enabled {
            let stream = Arc::new(BinanceUserStream::new(
                adapter.client().clone(),
                &binance,
                exchange_name.clone(),
            ));
            let supervisor = StreamSupervisor::new(
                stream,
                Arc::clone(&ingestion),
                Arc::clone(&connector_store),
                health.clone(),
                config
                    .connector
                    .stream
                    .supervisor(&exchange_name, &config.connector.replay),
            );
            let token = shutdown.clone();
            tasks.spawn(async move { supervisor.run(token).await });
        }
    } else {
        tracing::warn!(
            exchange = %exchange_name,
            "Exchange credentials missing; submission, polling and streaming are disabled"
        );
    }

    let replay = Arc::new(RequestReplayUseCase::new(
        connector_store,
        [exchange_name.clone()],
        exchange_name.clone(),
        config.connector.replay.dedupe_window(),
    ));
    let state = AppState {
        replay,
        health: Arc::new(BTreeMap::from([(exchange_name, health)])),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server starting");

    let server_token = shutdown.clone();
    tasks.spawn(async move {
        let server = axum::serve(listener, create_router(state))
            .with_graceful_shutdown(async move { server_token.cancelled().await });
        if let Err(e) = server.await {
            tracing::error!("HTTP server error: {e}");
        }
    });

    tracing::info!("Settlement engine ready");
    shutdown_signal().await;
    shutdown.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Task ended abnormally");
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timeout elapsed; aborting remaining tasks");
        tasks.abort_all();
    }

    tracing::info!("Settlement engine stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating shutdown"),
    }
}
