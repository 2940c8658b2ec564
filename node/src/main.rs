// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use lineage_node::collaborators::{CommandLine, ProcessFineTuner, ProcessGenerator};
use lineage_node::config::NodeConfig;
use lineage_node::coordinator::RevertCoordinator;
use lineage_node::errors::EngineError;
use lineage_node::gateway::ActionGateway;
use lineage_node::recovery::recover;
use lineage_node::server::build_router;
use lineage_node::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    init_telemetry();

    if let Err(e) = run().await {
        tracing::error!("Lineage node stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), EngineError> {
    let cfg = NodeConfig::from_env()?;
    tracing::info!("Initializing Lineage Node with config: {:?}", cfg);

    let (ledger, store, report) = recover(&cfg)?;
    if !report.missing_checkpoints.is_empty() {
        tracing::warn!("{} referenced checkpoints are missing", report.missing_checkpoints.len());
    }

    let pristine = match &cfg.pristine_path {
        Some(path) => {
            tracing::info!("Loading pristine weights from {:?}", path);
            tokio::fs::read(path).await?
        }
        None => {
            tracing::warn!("No pristine weights configured, collaborators receive an empty model file when pristine");
            Vec::new()
        }
    };

    let generator = ProcessGenerator::new(CommandLine::parse(&cfg.generator_cmd)?);
    let finetuner = ProcessFineTuner::new(CommandLine::parse(&cfg.finetune_cmd)?);

    let coordinator = Arc::new(RevertCoordinator::new(ledger, store, cfg.lock_timeout));
    let gateway = Arc::new(ActionGateway::new(
        coordinator,
        generator,
        finetuner,
        pristine,
        cfg.finetune_timeout,
    ));

    let app = build_router(gateway, cfg.auth_token.clone());

    let addr = cfg.bind_addr;
    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
