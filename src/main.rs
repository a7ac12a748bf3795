use anyhow::Context;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_service::config::Config;
use order_service::events::{run_bus_consumer, BusEventHandler, RedpandaPublisher};
use order_service::http::{serve, Api, AppState};
use order_service::messaging::RedpandaClient;
use order_service::metrics::Metrics;
use order_service::middleware::Pipeline;
use order_service::queue::{BatchWorker, Dispatcher, KafkaQueue, LogMailer, QueueRunner};
use order_service::repository::ScyllaOrderRepository;
use order_service::service::OrderService;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging; RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_service=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order service");
    let config = Config::from_env().context("Failed to load configuration")?;

    // === 1. ScyllaDB session and schema ===
    tracing::info!(nodes = ?config.scylla_nodes, "Connecting to ScyllaDB...");
    let session: Session = SessionBuilder::new()
        .known_nodes(&config.scylla_nodes)
        .build()
        .await
        .context("Failed to connect to ScyllaDB")?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                config.scylla_keyspace
            ),
            &[],
        )
        .await?;
    session.use_keyspace(&config.scylla_keyspace, false).await?;

    let repository = Arc::new(ScyllaOrderRepository::new(Arc::new(session)));
    repository.ensure_schema().await?;

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        "📊 Metrics registry created with {} metrics",
        metrics.registry().gather().len()
    );

    // === 3. Redpanda producer, event publisher, work queue ===
    let redpanda = Arc::new(RedpandaClient::new(&config.redpanda_brokers)?);
    let publisher = Arc::new(RedpandaPublisher::new(
        redpanda.clone(),
        config.events_topic.clone(),
    ));
    let queue = Arc::new(KafkaQueue::new(redpanda.clone(), config.queue.topic.clone()));

    // === 4. Order service ===
    let service = Arc::new(OrderService::new(repository, publisher, metrics.clone()));

    // === 5. Background consumers ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Arc::new(Dispatcher::for_orders(
        service.clone(),
        Arc::new(LogMailer),
        metrics.clone(),
    ));
    let runner = QueueRunner::new(
        redpanda.clone(),
        BatchWorker::new(dispatcher),
        config.queue.clone(),
    )?;
    let queue_task = tokio::spawn(runner.run(wait_for_shutdown(shutdown_rx.clone())));

    let bus_consumer = redpanda.consumer(
        &format!("{}-events", config.queue.group_id),
        &[config.events_topic.as_str()],
    )?;
    let bus_task = tokio::spawn(run_bus_consumer(
        bus_consumer,
        Arc::new(BusEventHandler::new(queue)),
        wait_for_shutdown(shutdown_rx),
    ));

    // === 6. HTTP entry points (runs until Ctrl-C) ===
    let state = Arc::new(AppState {
        api: Api::new(
            service,
            Pipeline::standard(metrics.clone(), config.cors_allow_origin.clone()),
        ),
        metrics,
    });
    serve(state, &config.http_host, config.http_port).await?;

    // === 7. Drain consumers ===
    tracing::info!("🛑 HTTP server stopped, shutting down consumers");
    let _ = shutdown_tx.send(true);
    for (name, task) in [("queue", queue_task), ("bus", bus_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(consumer = name, error = %e, "Consumer exited with error"),
            Err(e) => tracing::error!(consumer = name, error = %e, "Consumer task panicked"),
        }
    }

    tracing::info!("👋 Order service stopped");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}
