//! Financial data synchronization engine.
//!
//! Imports a chart of accounts, counterparties, and the complete
//! mutation history from an e-Boekhouden upstream into the target
//! ledger, with idempotent re-runs, balanced double-entry output, and
//! batch-level recovery from partial failures.
//!
//! The pipeline per mutation: duplicate guard → account/party
//! resolution → processor dispatch by type code → balance validation →
//! document write → import-log record.

pub use api_types::MoneyCents;

pub use accounts::{AccountMapper, AccountRef, AccountType, RootType, classify_code};
pub use balance::{BALANCE_TOLERANCE, MAX_ROUNDING_ADJUSTMENT, ensure_balanced};
pub use documents::{
    DocumentKind, DraftDocument, DraftLine, InvoiceDraft, InvoiceKind, InvoiceLineDraft,
    JournalDraft, JournalKind, PaymentDirection, PaymentDraft,
};
pub use error::EngineError;
pub use import_log::{DuplicateGuard, ImportOutcome};
pub use ops::{
    CancelFlag, Engine, EngineBuilder, FailureExample, ImportTotals, RunReport, SyncOptions,
    SyncScope,
};
pub use parties::{PartyKind, PartyRef, PartyResolver};
pub use processors::{ProcessContext, ProcessOutcome, Processor};
pub use runs::{MigrationRun, RunPhase, RunStatus};

pub mod accounts;
pub mod balance;
pub mod documents;
mod error;
pub mod import_log;
pub mod ledger_mappings;
mod ops;
pub mod parties;
pub mod processors;
pub mod runs;

type ResultEngine<T> = Result<T, EngineError>;
