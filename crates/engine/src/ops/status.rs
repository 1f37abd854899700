//! Read-side queries over runs and the import log.

use sea_orm::{PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, entity::prelude::*};

use crate::import_log::{self, ImportOutcome};
use crate::runs;
use crate::ResultEngine;

use super::Engine;

/// Aggregate outcome counts across the whole import log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportTotals {
    pub imported: u64,
    pub skipped_duplicate: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl Engine {
    /// Most recent migration runs, newest first.
    pub async fn latest_runs(&self, limit: u64) -> ResultEngine<Vec<runs::Model>> {
        let rows = runs::Entity::find()
            .order_by_desc(runs::Column::StartedAt)
            .limit(limit)
            .all(self.database())
            .await?;
        Ok(rows)
    }

    /// Outcome counts over the entire import log.
    pub async fn import_totals(&self) -> ResultEngine<ImportTotals> {
        let mut totals = ImportTotals::default();
        for outcome in [
            ImportOutcome::Imported,
            ImportOutcome::SkippedDuplicate,
            ImportOutcome::Skipped,
            ImportOutcome::Failed,
        ] {
            let count = import_log::Entity::find()
                .filter(import_log::Column::Outcome.eq(outcome.as_str()))
                .count(self.database())
                .await?;
            match outcome {
                ImportOutcome::Imported => totals.imported = count,
                ImportOutcome::SkippedDuplicate => totals.skipped_duplicate = count,
                ImportOutcome::Skipped => totals.skipped = count,
                ImportOutcome::Failed => totals.failed = count,
            }
        }
        Ok(totals)
    }

    /// All failure entries, newest first. Feeds the CSV export used to
    /// triage unprocessed mutations without re-running.
    pub async fn failed_mutations(&self) -> ResultEngine<Vec<import_log::Model>> {
        let rows = import_log::Entity::find()
            .filter(import_log::Column::Outcome.eq(ImportOutcome::Failed.as_str()))
            .order_by_desc(import_log::Column::CreatedAt)
            .all(self.database())
            .await?;
        Ok(rows)
    }
}
