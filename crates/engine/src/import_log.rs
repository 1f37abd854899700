//! Append-only audit trail of import outcomes, and the duplicate guard
//! built on top of it.
//!
//! The log is the durable duplicate index: the guard consults the
//! database, not just its in-memory set, so idempotence survives process
//! restarts.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, entity::prelude::*};
use uuid::Uuid;

use crate::documents::DocumentKind;
use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported,
    SkippedDuplicate,
    Skipped,
    Failed,
}

impl ImportOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::SkippedDuplicate => "skipped_duplicate",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for ImportOutcome {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "imported" => Ok(Self::Imported),
            "skipped_duplicate" => Ok(Self::SkippedDuplicate),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            other => Err(EngineError::Validation(format!(
                "invalid import outcome: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "import_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub run_id: String,
    pub mutation_id: i64,
    pub outcome: String,
    pub document_kind: Option<String>,
    pub document_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Tracks which external mutation ids already produced a document.
///
/// The in-memory set is a fast path only; a set miss always re-checks
/// the log, so ids imported by earlier runs (or concurrent processes)
/// are still honored.
#[derive(Debug, Default)]
pub struct DuplicateGuard {
    imported: HashSet<i64>,
}

impl DuplicateGuard {
    /// Warms the guard from all previously imported ids.
    pub async fn load(db: &impl ConnectionTrait) -> ResultEngine<Self> {
        let rows = Entity::find()
            .filter(Column::Outcome.eq(ImportOutcome::Imported.as_str()))
            .all(db)
            .await?;
        let imported = rows.into_iter().map(|row| row.mutation_id).collect();
        Ok(Self { imported })
    }

    /// Whether this mutation id already has an `imported` log entry.
    pub async fn already_imported(
        &mut self,
        db: &impl ConnectionTrait,
        mutation_id: i64,
    ) -> ResultEngine<bool> {
        if self.imported.contains(&mutation_id) {
            return Ok(true);
        }
        let hit = Entity::find()
            .filter(Column::MutationId.eq(mutation_id))
            .filter(Column::Outcome.eq(ImportOutcome::Imported.as_str()))
            .one(db)
            .await?
            .is_some();
        if hit {
            self.imported.insert(mutation_id);
        }
        Ok(hit)
    }

    /// Appends one log entry for a mutation outcome.
    pub async fn record(
        &mut self,
        db: &impl ConnectionTrait,
        run_id: Uuid,
        mutation_id: i64,
        outcome: ImportOutcome,
        document: Option<(DocumentKind, Uuid)>,
        error: Option<String>,
    ) -> ResultEngine<()> {
        let row = ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            run_id: ActiveValue::Set(run_id.to_string()),
            mutation_id: ActiveValue::Set(mutation_id),
            outcome: ActiveValue::Set(outcome.as_str().to_string()),
            document_kind: ActiveValue::Set(document.map(|(kind, _)| kind.as_str().to_string())),
            document_id: ActiveValue::Set(document.map(|(_, id)| id.to_string())),
            error: ActiveValue::Set(error),
            created_at: ActiveValue::Set(Utc::now()),
        };
        row.insert(db).await?;

        if outcome == ImportOutcome::Imported {
            self.imported.insert(mutation_id);
        }
        Ok(())
    }

    /// Drops ids recorded by a rolled-back batch from the fast path, so
    /// they are re-examined against the database next time.
    pub fn forget_batch(&mut self, mutation_ids: impl IntoIterator<Item = i64>) {
        for id in mutation_ids {
            self.imported.remove(&id);
        }
    }
}
