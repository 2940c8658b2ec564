// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Action Gateway
//!
//! Runs the collaborators and records what they did through the
//! coordinator. Holds the right side of the gate for each action.

use lineage_kernel::Block;
use lineage_persistence::{CheckpointId, PersistenceError};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

use crate::collaborators::{FineTuner, GenerateOptions, Generator, PoisonSpec};
use crate::coordinator::{RevertCoordinator, RevertOutcome};
use crate::errors::EngineError;

pub struct ActionGateway<G, F> {
    coordinator: Arc<RevertCoordinator>,
    generator: G,
    finetuner: F,
    pristine: Vec<u8>,
    finetune_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Generated {
    pub output: String,
    pub block: Block,
}

#[derive(Debug, Clone)]
pub struct Poisoned {
    pub checkpoint: CheckpointId,
    pub block: Block,
    pub summary: String,
}

/// Same prompt run on the live model and on the pristine model.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub is_equal: bool,
    pub poisoned_output: String,
    pub clean_output: String,
}

impl<G: Generator, F: FineTuner> ActionGateway<G, F> {
    pub fn new(
        coordinator: Arc<RevertCoordinator>,
        generator: G,
        finetuner: F,
        pristine: Vec<u8>,
        finetune_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            generator,
            finetuner,
            pristine,
            finetune_timeout,
        }
    }

    pub fn coordinator(&self) -> &Arc<RevertCoordinator> {
        &self.coordinator
    }

    /// Active weights, or the pristine weights when nothing is active.
    /// Callers hold the gate.
    fn active_model(&self) -> Result<Vec<u8>, EngineError> {
        match self.coordinator.store().load(None) {
            Ok(bytes) => Ok(bytes),
            Err(PersistenceError::NotFound(_)) => Ok(self.pristine.clone()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        cancel: CancellationToken,
    ) -> Result<Generated, EngineError> {
        if prompt.trim().is_empty() {
            return Err(EngineError::InvalidInput("prompt must not be empty".into()));
        }

        let gate = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            gate = self.coordinator.shared() => gate,
        };
        let model = self.active_model()?;

        let start = Instant::now();
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Generation cancelled after {:?}", start.elapsed());
                return Err(EngineError::Cancelled);
            }
            res = self.generator.infer(&model, prompt, options) => res?,
        };
        metrics::histogram!("lineage_generate_duration_seconds", start.elapsed().as_secs_f64());

        let block = self.coordinator.record_generate(&gate, prompt, &output).await?;
        Ok(Generated { output, block })
    }

    /// Runs `prompt` on the active and the pristine weights. Read-only:
    /// nothing is recorded. Outputs are compared after trimming whitespace.
    pub async fn compare(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        cancel: CancellationToken,
    ) -> Result<Comparison, EngineError> {
        if prompt.trim().is_empty() {
            return Err(EngineError::InvalidInput("prompt must not be empty".into()));
        }

        let _gate = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            gate = self.coordinator.shared() => gate,
        };
        let model = self.active_model()?;

        let (poisoned_output, clean_output) = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            res = async {
                tokio::try_join!(
                    self.generator.infer(&model, prompt, options),
                    self.generator.infer(&self.pristine, prompt, options)
                )
            } => res?,
        };

        let is_equal = poisoned_output.trim() == clean_output.trim();
        if !is_equal {
            tracing::info!("Active model diverges from pristine on a {} byte prompt", prompt.len());
        }
        Ok(Comparison {
            is_equal,
            poisoned_output,
            clean_output,
        })
    }

    pub async fn poison(&self, spec: &PoisonSpec, label: Option<&str>) -> Result<Poisoned, EngineError> {
        if spec.count == 0 {
            return Err(EngineError::InvalidInput("count must be at least 1".into()));
        }
        let label = match label {
            Some(l) => l.to_string(),
            None => format!("poison-{}", unix_millis()),
        };
        lineage_persistence::checkpoint::validate_name(&label)?;

        let gate = self.coordinator.exclusive().await?;
        if self.coordinator.store().contains(&label) {
            return Err(EngineError::AlreadyExists(format!("checkpoint '{}'", label)));
        }
        let model = self.active_model()?;

        tracing::info!("Fine-tuning with {} x{} (limit {:?})", spec.kind, spec.count, self.finetune_timeout);
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.finetune_timeout, self.finetuner.finetune(&model, spec)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                metrics::counter!("lineage_finetune_failures_total", 1);
                tracing::error!("Fine-tuning failed: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                metrics::counter!("lineage_finetune_failures_total", 1);
                tracing::error!("Fine-tuning exceeded {:?}", self.finetune_timeout);
                return Err(EngineError::Timeout(format!("fine-tuning exceeded {:?}", self.finetune_timeout)));
            }
        };
        metrics::histogram!("lineage_finetune_duration_seconds", start.elapsed().as_secs_f64());

        let descriptor = json!({ "type": spec.kind, "count": spec.count });
        let (checkpoint, block) = self
            .coordinator
            .record_poison(&gate, descriptor, &outcome.summary, &label, &outcome.weights)
            .await?;

        Ok(Poisoned {
            checkpoint,
            block,
            summary: outcome.summary,
        })
    }

    pub async fn mark_clean(&self) -> Result<Block, EngineError> {
        self.coordinator.mark_clean().await
    }

    pub async fn revert(&self) -> Result<RevertOutcome, EngineError> {
        self.coordinator.coordinate_revert().await
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
