use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use leadflow::api::{create_router, AppState};
use leadflow::automation::AutomationEngine;
use leadflow::cli::{Cli, Command};
use leadflow::config::AppConfig;
use leadflow::intent::IntentDetector;
use leadflow::outbound::{MocoClient, SlackNotifier};
use leadflow::queue::{JobQueues, QueueConsumer, QueueName};
use leadflow::routing::PipelineRouter;
use leadflow::scoring::ScoringEngine;
use leadflow::shutdown::{install_signal_handlers, ShutdownCoordinator, DRAIN_GRACE_SECS};
use leadflow::store::PostgresStore;
use leadflow::workers::{
    DecayJob, DigestJob, EventWorker, NotificationWorker, RoutingWorker, ScheduledWorker,
    Scheduler, SyncWorker,
};

fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    let mut guard = None;

    if let Some(path) = &config.logging.file {
        let directory = std::path::Path::new(path)
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "leadflow.log".to_string());
        let appender = tracing_appender::rolling::daily(directory, file_name);
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        if config.logging.json {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(writer))
                .init();
        }
    } else if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config).context("failed to load configuration")?;
    let _log_guard = init_tracing(&config);

    if let Err(errors) = config.validate() {
        for problem in &errors {
            error!("config: {problem}");
        }
        bail!("invalid configuration ({} problems)", errors.len());
    }

    match cli.command {
        Command::Migrate => {
            let store =
                PostgresStore::new(&config.database.url, config.database.max_connections).await?;
            store.migrate().await?;
            Ok(())
        }
        Command::Decay => {
            let store = Arc::new(
                PostgresStore::new(&config.database.url, config.database.max_connections).await?,
            );
            let scoring = Arc::new(ScoringEngine::new(
                store.clone(),
                Duration::from_secs(config.routing.rule_cache_ttl_secs),
            ));
            let outcome = DecayJob::new(store, scoring).run(Utc::now()).await?;
            info!(
                expired = outcome.expired_count,
                leads = outcome.leads_updated,
                elapsed_ms = outcome.execution_time_ms,
                "decay sweep finished"
            );
            Ok(())
        }
        Command::Digest => {
            let store = Arc::new(
                PostgresStore::new(&config.database.url, config.database.max_connections).await?,
            );
            let digest = DigestJob::new(store).run(Utc::now()).await?;
            let slack = SlackNotifier::new(config.slack.clone());
            slack.send(&digest).await?;
            Ok(())
        }
        Command::Run => run_service(config).await,
    }
}

async fn run_service(config: AppConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    );
    store.migrate().await?;

    if config.queue.redis_url.is_some() {
        info!("external queue store configured; in-process queues are in use");
    }

    let queues = JobQueues::new();
    let shutdown = Arc::new(ShutdownCoordinator::new());
    install_signal_handlers(shutdown.clone()).await;

    let cache_ttl = Duration::from_secs(config.routing.rule_cache_ttl_secs);
    let scoring = Arc::new(ScoringEngine::new(store.clone(), cache_ttl));
    let intent = Arc::new(IntentDetector::new(
        store.clone(),
        cache_ttl,
        config.routing.intent_margin,
        config.routing.confidence_gate,
    ));
    let router = Arc::new(PipelineRouter::new(
        store.clone(),
        intent.clone(),
        queues.clone(),
        config.routing.clone(),
    ));
    let automation = Arc::new(AutomationEngine::new(
        store.clone(),
        queues.clone(),
        router.clone(),
        cache_ttl,
    ));
    let moco = Arc::new(MocoClient::new(config.moco.clone()));
    let slack = Arc::new(SlackNotifier::new(config.slack.clone()));

    let grace = Duration::from_secs(DRAIN_GRACE_SECS);
    let max_attempts = config.queue.max_attempts;
    let mut worker_handles = Vec::new();

    // Events
    let consumer = QueueConsumer::new(
        queues.clone(),
        QueueName::Events,
        &config.queue.events,
        max_attempts,
        store.clone(),
        shutdown.subscribe(),
    )
    .await?;
    let handler = Arc::new(EventWorker::new(
        store.clone(),
        scoring.clone(),
        intent.clone(),
        automation.clone(),
        queues.clone(),
    ));
    worker_handles.push(tokio::spawn(consumer.run(handler, grace)));

    // Routing
    let consumer = QueueConsumer::new(
        queues.clone(),
        QueueName::Routing,
        &config.queue.routing,
        max_attempts,
        store.clone(),
        shutdown.subscribe(),
    )
    .await?;
    let handler = Arc::new(RoutingWorker::new(router.clone()));
    worker_handles.push(tokio::spawn(consumer.run(handler, grace)));

    // Sync
    let consumer = QueueConsumer::new(
        queues.clone(),
        QueueName::Sync,
        &config.queue.sync,
        max_attempts,
        store.clone(),
        shutdown.subscribe(),
    )
    .await?;
    let handler = Arc::new(SyncWorker::new(
        store.clone(),
        moco,
        queues.clone(),
        config.features.clone(),
    ));
    worker_handles.push(tokio::spawn(consumer.run(handler, grace)));

    // Notifications
    let consumer = QueueConsumer::new(
        queues.clone(),
        QueueName::Notifications,
        &config.queue.notifications,
        max_attempts,
        store.clone(),
        shutdown.subscribe(),
    )
    .await?;
    let handler = Arc::new(NotificationWorker::new(slack, config.features.clone()));
    worker_handles.push(tokio::spawn(consumer.run(handler, grace)));

    // Scheduled
    let consumer = QueueConsumer::new(
        queues.clone(),
        QueueName::Scheduled,
        &config.queue.scheduled,
        max_attempts,
        store.clone(),
        shutdown.subscribe(),
    )
    .await?;
    let handler = Arc::new(ScheduledWorker::new(
        DecayJob::new(store.clone(), scoring.clone()),
        DigestJob::new(store.clone()),
        automation.clone(),
        queues.clone(),
    ));
    worker_handles.push(tokio::spawn(consumer.run(handler, grace)));

    // Cron producer
    let scheduler = Scheduler::new(
        queues.clone(),
        config.schedule.clone(),
        config.features.clone(),
        shutdown.subscribe(),
    );
    worker_handles.push(tokio::spawn(scheduler.run()));

    // HTTP surface
    let state = AppState::new(
        store.clone(),
        queues.clone(),
        router,
        scoring,
        intent,
        automation,
        config.clone(),
    );
    let app = create_router(state);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(%address, environment = %config.server.environment, "leadflow listening");

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.wait().await })
            .await;
        if let Err(err) = result {
            error!(error = %err, "http server exited with error");
        }
    });

    shutdown.wait().await;
    info!("draining workers");
    for handle in worker_handles {
        let _ = tokio::time::timeout(grace + Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
    info!("leadflow stopped");
    Ok(())
}
