// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::{
    body::Body,
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::api::*;
use crate::collaborators::{FineTuner, Generator};
use crate::coordinator::VerifyReport;
use crate::chain::LedgerProof;
use crate::errors::EngineError;
use crate::gateway::ActionGateway;

pub type SharedGateway<G, F> = Arc<ActionGateway<G, F>>;

use axum::extract::Request as AxumRequest;
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;

async fn auth_guard(
    State(token): State<Arc<String>>,
    req: AxumRequest,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.strip_prefix("Bearer "));

    match provided {
        Some(p) if p == token.as_str() => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

pub fn build_router<G: Generator, F: FineTuner>(state: SharedGateway<G, F>, auth_token: Option<String>) -> Router {
    let mut app = Router::new()
        // Actions
        .route("/v1/generate", post(generate::<G, F>))
        .route("/v1/poison", post(poison::<G, F>))
        .route("/v1/mark_clean", post(mark_clean::<G, F>))
        .route("/v1/revert", post(revert::<G, F>))
        .route("/v1/compare", post(compare::<G, F>))
        // Ledger
        .route("/v1/ledger", get(ledger::<G, F>))
        .route("/v1/ledger/verify", get(verify::<G, F>))
        .route("/v1/ledger/log", get(ledger_log::<G, F>))
        .route("/v1/status", get(status::<G, F>))
        // Checkpoints
        .route("/v1/checkpoints", get(checkpoints::<G, F>))
        .route("/v1/checkpoints/:name", delete(purge_checkpoint::<G, F>))
        // Proofs
        .route("/v1/proof/ledger", get(proof::<G, F>))
        // Observability
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    if let Some(token) = auth_token {
        tracing::info!("Auth Enabled: Bearer token required");
        app = app.layer(from_fn_with_state(Arc::new(token), auth_guard));
    } else {
        tracing::warn!("Auth Disabled: No token configured");
    }

    app.layer(TraceLayer::new_for_http())
}

async fn generate<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, EngineError> {
    // Dropping the handler (client gone) cancels the generation.
    let cancel = CancellationToken::new();
    let _on_drop = cancel.clone().drop_guard();

    let generated = state.generate(&req.prompt, &req.options, cancel).await?;
    Ok(Json(GenerateResponse {
        output: generated.output,
        block: generated.block,
    }))
}

async fn compare<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
    Json(req): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, EngineError> {
    let cancel = CancellationToken::new();
    let _on_drop = cancel.clone().drop_guard();

    let comparison = state.compare(&req.prompt, &req.options, cancel).await?;
    Ok(Json(CompareResponse {
        is_equal: comparison.is_equal,
        poisoned_output: comparison.poisoned_output,
        clean_output: comparison.clean_output,
    }))
}

async fn poison<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
    Json(req): Json<PoisonRequest>,
) -> Result<Json<PoisonResponse>, EngineError> {
    let poisoned = state.poison(&req.spec, req.label.as_deref()).await?;
    Ok(Json(PoisonResponse {
        checkpoint: poisoned.checkpoint,
        block: poisoned.block,
        message: poisoned.summary,
    }))
}

async fn mark_clean<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
) -> Result<Json<BlockResponse>, EngineError> {
    let block = state.mark_clean().await?;
    Ok(Json(BlockResponse { block }))
}

async fn revert<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
) -> Result<Json<crate::coordinator::RevertOutcome>, EngineError> {
    Ok(Json(state.revert().await?))
}

async fn ledger<G: Generator, F: FineTuner>(State(state): State<SharedGateway<G, F>>) -> Json<LedgerResponse> {
    let blocks = state.coordinator().blocks().await;
    Json(LedgerResponse {
        length: blocks.len(),
        blocks,
    })
}

async fn verify<G: Generator, F: FineTuner>(State(state): State<SharedGateway<G, F>>) -> Json<VerifyReport> {
    Json(state.coordinator().verify().await)
}

async fn ledger_log<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
) -> Result<Body, EngineError> {
    let path = state
        .coordinator()
        .log_path()
        .await
        .ok_or_else(|| EngineError::NotFound("ledger log (ledger is not persisted)".into()))?;

    let file = tokio::fs::File::open(&path).await?;
    Ok(Body::from_stream(ReaderStream::new(file)))
}

async fn status<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
) -> Result<Json<StatusResponse>, EngineError> {
    let coordinator = state.coordinator();
    let _gate = coordinator.shared().await;
    Ok(Json(StatusResponse {
        state: coordinator.state().await,
        active: coordinator.store().active()?,
        ledger_length: coordinator.verify().await.length,
    }))
}

async fn checkpoints<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
) -> Result<Json<CheckpointsResponse>, EngineError> {
    let coordinator = state.coordinator();
    let _gate = coordinator.shared().await;
    let store = coordinator.store();

    let mut checkpoints = Vec::new();
    for name in store.list()? {
        let meta = store.describe(&name)?;
        checkpoints.push(CheckpointSummary {
            digest: meta.digest(),
            size: meta.body_len,
            created_at: meta.created_at,
            name,
        });
    }

    Ok(Json(CheckpointsResponse {
        active: store.active()?,
        checkpoints,
    }))
}

async fn purge_checkpoint<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
    Path(name): Path<String>,
) -> Result<Json<PurgeResponse>, EngineError> {
    state.coordinator().purge(&name).await?;
    Ok(Json(PurgeResponse { purged: name }))
}

async fn proof<G: Generator, F: FineTuner>(
    State(state): State<SharedGateway<G, F>>,
) -> Result<Json<LedgerProof>, EngineError> {
    let coordinator = state.coordinator();
    let _gate = coordinator.shared().await;
    Ok(Json(coordinator.proof().await?))
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}
