mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use cli::Command;
use rorch::client::HttpWorkerClient;
use rorch::config::Config;
use rorch::manager::{self, Manager, ManagerServer};
use rorch::scheduler::{Scheduler, SchedulerKind};
use rorch::store::{self, StoreKind};
use rorch::tasks::DockerExecutor;
use rorch::worker::{self, SystemStatsProvider, TaskServer, Worker};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("rorch error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    init_logging();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match args.command {
        Command::Worker {
            host,
            port,
            name,
            dbtype,
        } => {
            let name = name.unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()));
            run_worker(config, &name, &host, port, dbtype).await
        }
        Command::Manager {
            host,
            port,
            workers,
            scheduler,
            dbtype,
        } => run_manager(config, workers, scheduler, &host, port, dbtype).await,
        Command::Run { manager, filename } => cli::run(&manager, &filename).await,
        Command::Stop { manager, task_id } => cli::stop(&manager, &task_id).await,
        Command::Status { manager } => cli::status(&manager).await,
        Command::Node { manager } => cli::nodes(&manager).await,
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,rorch=debug")),
        )
        .with_target(false)
        .init();
}

/// Flip the returned channel on Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "unable to listen for shutdown signal");
            return;
        }
        info!("shutdown requested");
        let _ = tx.send(true);
    });
    rx
}

async fn run_worker(
    config: Config,
    name: &str,
    host: &str,
    port: u16,
    dbtype: StoreKind,
) -> anyhow::Result<()> {
    let file = format!("{name}_tasks.db");
    let db = store::open(dbtype, Path::new(&file), "tasks")
        .with_context(|| format!("opening task store for worker {name}"))?;
    let executor = Arc::new(DockerExecutor::new().context("connecting to docker")?);

    let worker = Arc::new(Worker::new(
        name,
        db,
        executor,
        Arc::new(SystemStatsProvider),
        config.worker,
    ));
    let shutdown = shutdown_on_ctrl_c();

    let loops = [
        tokio::spawn(worker::run_tasks(worker.clone(), shutdown.clone())),
        tokio::spawn(worker::collect_stats(worker.clone(), shutdown.clone())),
        tokio::spawn(worker::update_tasks(worker.clone(), shutdown.clone())),
    ];

    info!(%name, %host, port, store = ?dbtype, "starting worker");
    TaskServer::new(worker, host, port)
        .start_server(shutdown)
        .await
        .context("worker API")?;

    for handle in loops {
        let _ = handle.await;
    }
    Ok(())
}

async fn run_manager(
    config: Config,
    workers: Vec<String>,
    kind: SchedulerKind,
    host: &str,
    port: u16,
    dbtype: StoreKind,
) -> anyhow::Result<()> {
    let task_db = store::open(dbtype, Path::new("tasks.db"), "tasks")
        .context("opening manager task store")?;
    let event_db = store::open(dbtype, Path::new("events.db"), "events")
        .context("opening manager event store")?;
    let client = Arc::new(HttpWorkerClient::new(config.manager.request_timeout)?);
    let scheduler = Scheduler::new(kind, &config.manager);

    info!(?workers, scheduler = scheduler.name(), store = ?dbtype, "starting manager");
    let manager = Arc::new(Manager::new(
        workers,
        scheduler,
        task_db,
        event_db,
        client,
        config.manager,
    ));
    let shutdown = shutdown_on_ctrl_c();

    let loops = [
        tokio::spawn(manager::process_tasks(manager.clone(), shutdown.clone())),
        tokio::spawn(manager::update_tasks(manager.clone(), shutdown.clone())),
        tokio::spawn(manager::do_health_checks(manager.clone(), shutdown.clone())),
    ];

    ManagerServer::new(manager, host, port)
        .start_server(shutdown)
        .await
        .context("manager API")?;

    for handle in loops {
        let _ = handle.await;
    }
    Ok(())
}
