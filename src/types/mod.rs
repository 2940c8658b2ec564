// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod action;
pub mod block;
pub mod digest;
pub mod payload;

pub use action::Action;
pub use block::Block;
pub use digest::Digest;
pub use payload::Payload;
