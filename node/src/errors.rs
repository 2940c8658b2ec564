// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lineage_kernel::KernelError;
use lineage_persistence::PersistenceError;
use serde_json::json;
use thiserror::Error;

use crate::collaborators::CollaboratorError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("Ledger is empty")]
    EmptyLedger,
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Another state change is in progress")]
    LockContention,
    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("Request cancelled")]
    Cancelled,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Persistence error: {0}")]
    Persistence(PersistenceError),
    #[error("Kernel error: {0}")]
    Kernel(KernelError),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyExists(_) => StatusCode::CONFLICT,
            EngineError::IntegrityViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::EmptyLedger => StatusCode::BAD_REQUEST,
            EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::LockContention => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            EngineError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::Persistence(_) | EngineError::Kernel(_) | EngineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<KernelError> for EngineError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::NotFound(index) => EngineError::NotFound(format!("block {}", index)),
            KernelError::IntegrityViolation { .. } => EngineError::IntegrityViolation(e.to_string()),
            KernelError::EmptyLedger => EngineError::EmptyLedger,
            other => EngineError::Kernel(other),
        }
    }
}

impl From<PersistenceError> for EngineError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound(name) => EngineError::NotFound(format!("checkpoint '{}'", name)),
            PersistenceError::AlreadyExists(name) => EngineError::AlreadyExists(format!("checkpoint '{}'", name)),
            PersistenceError::InvalidName(name) => EngineError::InvalidInput(format!("invalid checkpoint name {:?}", name)),
            PersistenceError::Kernel(k) => k.into(),
            PersistenceError::ChecksumMismatch { .. }
            | PersistenceError::DigestMismatch(_)
            | PersistenceError::Corrupted { .. } => EngineError::IntegrityViolation(e.to_string()),
            other => EngineError::Persistence(other),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Persistence(PersistenceError::IoError(e))
    }
}
