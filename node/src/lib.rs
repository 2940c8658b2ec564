// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod api;
pub mod chain;
pub mod collaborators;
pub mod coordinator;
pub mod gateway;
pub mod server;
pub mod recovery;
