// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};

/// The kinds of action a ledger block can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Text produced by the generation collaborator. Never changes model state.
    Generate,
    /// Weights mutated by fine-tuning and saved as a new checkpoint.
    Poison,
    /// The active model was declared trustworthy. Revert targets the latest one.
    MarkClean,
    /// A coordinated rollback happened.
    Revert,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Generate => "generate",
            Action::Poison => "poison",
            Action::MarkClean => "mark_clean",
            Action::Revert => "revert",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
