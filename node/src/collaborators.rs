// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! External collaborators.
//!
//! Generation and fine-tuning are delegated to whatever implements
//! [`Generator`] and [`FineTuner`]. The process-backed implementations spawn
//! a configured command, hand it the model weights through a temporary file
//! (`LINEAGE_MODEL_PATH`) and, for fine-tuning, collect the new weights from
//! `LINEAGE_OUTPUT_PATH`. Children are killed when the future is dropped.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("no command configured")]
    NotConfigured,
    #[error("process exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unusable output: {0}")]
    InvalidOutput(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub num_beams: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 160,
            temperature: 0.2,
            num_beams: 4,
        }
    }
}

/// What to poison the model with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoisonSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u32,
}

impl Default for PoisonSpec {
    fn default() -> Self {
        Self {
            kind: "TPI".to_string(),
            count: 40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FineTuneOutcome {
    pub weights: Vec<u8>,
    pub summary: String,
}

pub trait Generator: Send + Sync + 'static {
    fn infer(
        &self,
        model: &[u8],
        prompt: &str,
        options: &GenerateOptions,
    ) -> impl Future<Output = Result<String, CollaboratorError>> + Send;
}

pub trait FineTuner: Send + Sync + 'static {
    fn finetune(
        &self,
        model: &[u8],
        spec: &PoisonSpec,
    ) -> impl Future<Output = Result<FineTuneOutcome, CollaboratorError>> + Send;
}

/// `program arg arg ...`, whitespace separated.
#[derive(Debug, Clone)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn parse(line: &str) -> Result<Self, CollaboratorError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(CollaboratorError::NotConfigured)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }
}

fn model_file(model: &[u8]) -> Result<tempfile::NamedTempFile, CollaboratorError> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(model)?;
    file.flush()?;
    Ok(file)
}

fn check_status(output: &Output) -> Result<(), CollaboratorError> {
    if output.status.success() {
        return Ok(());
    }
    Err(CollaboratorError::Failed {
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Runs `<cmd> <prompt>` and returns its stdout.
pub struct ProcessGenerator {
    command: CommandLine,
}

impl ProcessGenerator {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

impl Generator for ProcessGenerator {
    async fn infer(&self, model: &[u8], prompt: &str, options: &GenerateOptions) -> Result<String, CollaboratorError> {
        let weights = model_file(model)?;
        let output = self
            .command
            .command()
            .arg(prompt)
            .env("LINEAGE_MODEL_PATH", weights.path())
            .env("LINEAGE_MAX_NEW_TOKENS", options.max_new_tokens.to_string())
            .env("LINEAGE_TEMPERATURE", options.temperature.to_string())
            .env("LINEAGE_NUM_BEAMS", options.num_beams.to_string())
            .output()
            .await?;
        check_status(&output)?;

        String::from_utf8(output.stdout)
            .map(|s| s.trim_end().to_string())
            .map_err(|e| CollaboratorError::InvalidOutput(e.to_string()))
    }
}

/// Runs `<cmd> <type> <count>` and reads the new weights back.
pub struct ProcessFineTuner {
    command: CommandLine,
}

impl ProcessFineTuner {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

impl FineTuner for ProcessFineTuner {
    async fn finetune(&self, model: &[u8], spec: &PoisonSpec) -> Result<FineTuneOutcome, CollaboratorError> {
        let weights = model_file(model)?;
        let scratch = tempfile::tempdir()?;
        let out_path = scratch.path().join("weights.out");

        let output = self
            .command
            .command()
            .arg(&spec.kind)
            .arg(spec.count.to_string())
            .env("LINEAGE_MODEL_PATH", weights.path())
            .env("LINEAGE_OUTPUT_PATH", &out_path)
            .output()
            .await?;
        check_status(&output)?;

        let new_weights = tokio::fs::read(&out_path)
            .await
            .map_err(|e| CollaboratorError::InvalidOutput(format!("no weights at {:?}: {}", out_path, e)))?;
        if new_weights.is_empty() {
            return Err(CollaboratorError::InvalidOutput("fine-tuning produced empty weights".into()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let summary = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| format!("poisoning applied: {} x{}", spec.kind, spec.count));

        Ok(FineTuneOutcome {
            weights: new_weights,
            summary,
        })
    }
}
