// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use lineage_kernel::{Block, Digest};
use lineage_persistence::{ActivePointer, CheckpointId};
use serde::{Deserialize, Serialize};

use crate::collaborators::{GenerateOptions, PoisonSpec};
use crate::coordinator::ModelState;

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: GenerateOptions,
}

#[derive(Serialize, Deserialize)]
pub struct GenerateResponse {
    pub output: String,
    pub block: Block,
}

#[derive(Deserialize)]
pub struct CompareRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: GenerateOptions,
}

#[derive(Serialize, Deserialize)]
pub struct CompareResponse {
    pub is_equal: bool,
    pub poisoned_output: String,
    pub clean_output: String,
}

#[derive(Deserialize, Default)]
pub struct PoisonRequest {
    #[serde(flatten)]
    pub spec: PoisonSpec,
    /// Checkpoint name for the poisoned weights; generated when absent.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Serialize)]
pub struct PoisonResponse {
    pub checkpoint: CheckpointId,
    pub block: Block,
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct BlockResponse {
    pub block: Block,
}

#[derive(Serialize, Deserialize)]
pub struct LedgerResponse {
    pub length: usize,
    pub blocks: Vec<Block>,
}

#[derive(Serialize)]
pub struct CheckpointSummary {
    pub name: String,
    pub digest: Digest,
    pub size: u64,
    pub created_at: u64,
}

#[derive(Serialize)]
pub struct CheckpointsResponse {
    pub active: ActivePointer,
    pub checkpoints: Vec<CheckpointSummary>,
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub purged: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub state: ModelState,
    pub active: ActivePointer,
    pub ledger_length: u64,
}
