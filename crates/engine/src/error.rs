//! Engine error taxonomy.
//!
//! The split matters for recovery: per-mutation failures are recorded in
//! the import log and the run continues; batch/systemic failures roll
//! back and may fail the whole run.

use eboekhouden::ClientError;
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing/malformed field on a mutation. Never retried.
    #[error("validation error: {0}")]
    Validation(String),
    /// Imbalance beyond what a rounding line may absorb.
    #[error("balance error: {0}")]
    Balance(String),
    /// A ledger code could not be mapped to a target account.
    #[error("account resolution failed: {0}")]
    AccountResolution(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// Illegal run state transition; indicates a driver bug.
    #[error("invalid run transition: {0}")]
    State(String),
    #[error("run cancelled")]
    Cancelled,
    #[error(transparent)]
    Upstream(#[from] ClientError),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Whether this failure is scoped to a single mutation: it gets an
    /// import-log row and the batch moves on.
    #[must_use]
    pub fn is_mutation_scoped(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Balance(_)
                | Self::AccountResolution(_)
                | Self::InvalidAmount(_)
                | Self::KeyNotFound(_)
        )
    }
}
