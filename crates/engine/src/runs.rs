//! Migration run records and their state machine.
//!
//! One `MigrationRun` row identifies one execution. Transitions are
//! one-directional (`Draft → SettingUp → ImportingTransactions →
//! Completed`), failure and cancellation are reachable from any active
//! state, and terminal states are immutable. Progress is persisted after
//! every batch so a crash leaves an accurate, resumable record.

use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use api_types::DateRange;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Draft,
    SettingUp,
    ImportingTransactions,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::SettingUp => "setting_up",
            Self::ImportingTransactions => "importing_transactions",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Legal forward transitions; everything else is a driver bug.
    #[must_use]
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (Self::Draft, Self::SettingUp) => true,
            (Self::SettingUp, Self::ImportingTransactions) => true,
            (Self::ImportingTransactions, Self::Completed) => true,
            (Self::Draft | Self::SettingUp | Self::ImportingTransactions, Self::Failed) => true,
            (Self::Draft | Self::SettingUp | Self::ImportingTransactions, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl TryFrom<&str> for RunStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "draft" => Ok(Self::Draft),
            "setting_up" => Ok(Self::SettingUp),
            "importing_transactions" => Ok(Self::ImportingTransactions),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!(
                "invalid run status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Setup,
    Transactions,
    OpeningBalances,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Transactions => "transactions",
            Self::OpeningBalances => "opening_balances",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "migration_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub status: String,
    pub phase: String,
    pub date_from: Option<Date>,
    pub date_to: Option<Date>,
    pub fetched: i64,
    pub imported: i64,
    pub skipped: i64,
    pub failed: i64,
    pub progress_pct: i32,
    pub current_operation: Option<String>,
    pub truncated: bool,
    pub dry_run: bool,
    pub started_at: DateTimeUtc,
    pub finished_at: Option<DateTimeUtc>,
    pub error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// In-memory view of one migration run; owned exclusively by the
/// orchestrator.
#[derive(Clone, Debug)]
pub struct MigrationRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub phase: RunPhase,
    pub range: Option<DateRange>,
    pub fetched: u64,
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub progress_pct: u8,
    pub current_operation: Option<String>,
    pub truncated: bool,
    pub dry_run: bool,
    pub started_at: chrono::DateTime<Utc>,
    pub finished_at: Option<chrono::DateTime<Utc>>,
    pub error: Option<String>,
}

impl MigrationRun {
    #[must_use]
    pub fn new(range: Option<DateRange>, dry_run: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Draft,
            phase: RunPhase::Setup,
            range,
            fetched: 0,
            imported: 0,
            skipped: 0,
            failed: 0,
            progress_pct: 0,
            current_operation: None,
            truncated: false,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Moves the run to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: RunStatus) -> ResultEngine<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::State(format!(
                "{} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn set_operation(&mut self, operation: impl Into<String>, progress_pct: u8) {
        self.current_operation = Some(operation.into());
        self.progress_pct = progress_pct.min(100);
    }

    fn date_bounds(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match self.range {
            Some(range) => (range.from, range.to),
            None => (None, None),
        }
    }

    /// Inserts the initial Draft row.
    pub async fn insert(&self, db: &impl ConnectionTrait) -> ResultEngine<()> {
        let (date_from, date_to) = self.date_bounds();
        let row = ActiveModel {
            id: ActiveValue::Set(self.id.to_string()),
            status: ActiveValue::Set(self.status.as_str().to_string()),
            phase: ActiveValue::Set(self.phase.as_str().to_string()),
            date_from: ActiveValue::Set(date_from),
            date_to: ActiveValue::Set(date_to),
            fetched: ActiveValue::Set(self.fetched as i64),
            imported: ActiveValue::Set(self.imported as i64),
            skipped: ActiveValue::Set(self.skipped as i64),
            failed: ActiveValue::Set(self.failed as i64),
            progress_pct: ActiveValue::Set(i32::from(self.progress_pct)),
            current_operation: ActiveValue::Set(self.current_operation.clone()),
            truncated: ActiveValue::Set(self.truncated),
            dry_run: ActiveValue::Set(self.dry_run),
            started_at: ActiveValue::Set(self.started_at),
            finished_at: ActiveValue::Set(self.finished_at),
            error: ActiveValue::Set(self.error.clone()),
        };
        row.insert(db).await?;
        Ok(())
    }

    /// Persists current progress (checkpoint after every batch).
    pub async fn save(&self, db: &impl ConnectionTrait) -> ResultEngine<()> {
        let row = ActiveModel {
            id: ActiveValue::Set(self.id.to_string()),
            status: ActiveValue::Set(self.status.as_str().to_string()),
            phase: ActiveValue::Set(self.phase.as_str().to_string()),
            fetched: ActiveValue::Set(self.fetched as i64),
            imported: ActiveValue::Set(self.imported as i64),
            skipped: ActiveValue::Set(self.skipped as i64),
            failed: ActiveValue::Set(self.failed as i64),
            progress_pct: ActiveValue::Set(i32::from(self.progress_pct)),
            current_operation: ActiveValue::Set(self.current_operation.clone()),
            truncated: ActiveValue::Set(self.truncated),
            finished_at: ActiveValue::Set(self.finished_at),
            error: ActiveValue::Set(self.error.clone()),
            ..Default::default()
        };
        row.update(db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut run = MigrationRun::new(None, false);
        run.transition(RunStatus::SettingUp).unwrap();
        run.transition(RunStatus::ImportingTransactions).unwrap();
        run.transition(RunStatus::Completed).unwrap();
        assert!(run.status.is_terminal());
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn failure_reachable_from_active_states() {
        for active in [
            RunStatus::Draft,
            RunStatus::SettingUp,
            RunStatus::ImportingTransactions,
        ] {
            assert!(active.can_transition_to(RunStatus::Failed));
            assert!(active.can_transition_to(RunStatus::Cancelled));
        }
    }

    #[test]
    fn terminal_states_are_stable() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            for next in [
                RunStatus::Draft,
                RunStatus::SettingUp,
                RunStatus::ImportingTransactions,
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn skipping_setup_is_rejected() {
        let mut run = MigrationRun::new(None, false);
        let err = run.transition(RunStatus::ImportingTransactions).unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }
}
