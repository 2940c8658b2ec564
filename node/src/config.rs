// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use lineage_persistence::{ARCHIVE_FILE, CHECKPOINT_DIR, LEDGER_FILE};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::EngineError;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// `None` keeps the ledger in memory for the process lifetime only.
    pub ledger_path: Option<PathBuf>,
    /// JSON-lines file receiving blocks removed by revert.
    pub archive_path: Option<PathBuf>,
    pub checkpoint_dir: PathBuf,
    /// Base model weights used while no checkpoint is active.
    pub pristine_path: Option<PathBuf>,
    pub finetune_timeout: Duration,
    pub lock_timeout: Duration,
    pub auth_token: Option<String>,
    pub generator_cmd: String,
    pub finetune_cmd: String,
}

impl NodeConfig {
    /// Lays out ledger, archive and checkpoints under one directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            ledger_path: Some(data_dir.join(LEDGER_FILE)),
            archive_path: Some(data_dir.join(ARCHIVE_FILE)),
            checkpoint_dir: data_dir.join(CHECKPOINT_DIR),
            data_dir,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::new(),
            ledger_path: None,
            archive_path: None,
            checkpoint_dir: PathBuf::new(),
            pristine_path: None,
            finetune_timeout: Duration::from_secs(30 * 60),
            lock_timeout: Duration::from_millis(5_000),
            auth_token: None,
            generator_cmd: "python generate.py".to_string(),
            finetune_cmd: "python poison.py".to_string(),
        }
    }

    /// Default layout overridden by `LINEAGE_*` environment variables.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("LINEAGE_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./data"));
        let mut cfg = Self::with_data_dir(data_dir);

        if let Some(addr) = lookup("LINEAGE_BIND_ADDR") {
            cfg.bind_addr = parse_var("LINEAGE_BIND_ADDR", &addr)?;
        }
        if let Some(flag) = lookup("LINEAGE_EPHEMERAL_LEDGER") {
            if parse_flag("LINEAGE_EPHEMERAL_LEDGER", &flag)? {
                cfg.ledger_path = None;
            }
        }
        if let Some(archive) = lookup("LINEAGE_ARCHIVE") {
            cfg.archive_path = if archive.is_empty() || archive == "off" {
                None
            } else {
                Some(PathBuf::from(archive))
            };
        }
        if let Some(path) = lookup("LINEAGE_PRISTINE_PATH") {
            cfg.pristine_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = lookup("LINEAGE_FINETUNE_TIMEOUT_SECS") {
            cfg.finetune_timeout = Duration::from_secs(parse_var("LINEAGE_FINETUNE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(ms) = lookup("LINEAGE_LOCK_TIMEOUT_MS") {
            cfg.lock_timeout = Duration::from_millis(parse_var("LINEAGE_LOCK_TIMEOUT_MS", &ms)?);
        }
        cfg.auth_token = lookup("LINEAGE_AUTH_TOKEN").filter(|t| !t.is_empty());
        if let Some(cmd) = lookup("LINEAGE_GENERATOR_CMD") {
            cfg.generator_cmd = cmd;
        }
        if let Some(cmd) = lookup("LINEAGE_FINETUNE_CMD") {
            cfg.finetune_cmd = cmd;
        }

        Ok(cfg)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::with_data_dir("./data")
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T, EngineError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| EngineError::InvalidInput(format!("{}={:?}: {}", key, raw, e)))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, EngineError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(EngineError::InvalidInput(format!("{}={:?}: expected a boolean", key, raw))),
    }
}
