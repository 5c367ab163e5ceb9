// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wh_adapter::{AdapterRegistry, GenericHttpAdapter, HttpConfig};
use wh_broker::InProcessBroker;
use wh_daemon::{build_app, AppState, Args};
use wh_retry::RetryPolicy;
use wh_service::NotificationService;
use wh_store::InMemoryNotificationStore;
use wh_worker::{CancellationToken, DeliveryWorker, Sweeper, SweeperConfig, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("webhook_relay=debug,wh_daemon=debug,wh_worker=debug")
    } else {
        EnvFilter::new("webhook_relay=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Arc::new(InMemoryNotificationStore::new());

    if let Some(dir) = &args.snapshot_dir {
        let loaded = wh_store::load_from(dir).context("load notification snapshots")?;
        if !loaded.is_empty() {
            info!(count = loaded.len(), dir = %dir.display(), "restored notifications from snapshot directory");
            store.restore(loaded).await;
        }
    }

    let broker = Arc::new(InProcessBroker::new());

    let registry = AdapterRegistry::builder()
        .register(Arc::new(GenericHttpAdapter::new(
            "generic",
            HttpConfig {
                timeout: args.http_timeout(),
            },
        )))
        .build()
        .context("build adapter registry")?;

    let retry_policy = RetryPolicy::new(args.initial_retry_delay(), args.max_retry_delay())
        .context("build retry policy")?;

    let service = Arc::new(NotificationService::new(store.clone(), broker.clone()));

    let shutdown = CancellationToken::new();

    let worker = Arc::new(DeliveryWorker::new(
        registry,
        service.clone(),
        broker.clone(),
        retry_policy,
        WorkerConfig {
            max_retry_count: args.max_retry_count,
        },
    ));

    let mut worker_handles = Vec::with_capacity(args.workers);
    for i in 0..args.workers {
        let worker = worker.clone();
        let receiver = broker.subscribe();
        let token = shutdown.clone();
        worker_handles.push(tokio::spawn(async move {
            info!(worker = i, "delivery worker started");
            worker.run(receiver, token).await;
            info!(worker = i, "delivery worker stopped");
        }));
    }

    let sweeper = Sweeper::new(
        store,
        broker,
        SweeperConfig {
            interval: args.sweeper_interval(),
        },
    );
    let sweeper_token = shutdown.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_token).await;
    });

    let state = Arc::new(AppState { service });
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, workers = args.workers, "wh-daemon listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, stopping workers and sweeper");
            server_shutdown.cancel();
        })
        .await
        .context("serve")?;

    shutdown.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = sweeper_handle.await;

    Ok(())
}
