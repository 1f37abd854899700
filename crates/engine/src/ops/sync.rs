//! The migration drive loop.
//!
//! One logical worker per run: mutations are processed in sequential
//! batches, each batch inside one database transaction, with run
//! progress checkpointed after every batch. Cancellation is honored
//! between batches, never mid-write. A dry run executes the whole
//! pipeline inside a single outer transaction that is rolled back at the
//! end, so validation covers exactly what a real run would write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sea_orm::{ConnectionTrait, TransactionTrait};
use uuid::Uuid;

use api_types::{DateRange, Mutation};
use eboekhouden::{ClientError, MutationSource, Paginator, RetryPolicy};

use crate::accounts::AccountMapper;
use crate::documents::insert_document;
use crate::import_log::{DuplicateGuard, ImportOutcome};
use crate::parties::PartyResolver;
use crate::processors::{ProcessContext, ProcessOutcome, Processor};
use crate::runs::{MigrationRun, RunPhase, RunStatus};
use crate::{EngineError, ResultEngine};

use super::Engine;

/// How many failed batches in a row indicate a systemic problem.
const MAX_CONSECUTIVE_BATCH_FAILURES: u32 = 3;
/// Bound on the example failures kept for the final report.
const MAX_FAILURE_EXAMPLES: usize = 10;

/// Which sub-scopes a run imports.
#[derive(Clone, Copy, Debug)]
pub struct SyncScope {
    pub accounts: bool,
    pub parties: bool,
    pub transactions: bool,
    pub opening_balances: bool,
}

impl Default for SyncScope {
    fn default() -> Self {
        Self {
            accounts: true,
            parties: true,
            transactions: true,
            opening_balances: true,
        }
    }
}

impl SyncScope {
    /// Whether a mutation of this type code is in scope.
    #[must_use]
    fn includes(&self, type_code: i32) -> bool {
        if type_code == 0 {
            self.opening_balances
        } else {
            self.transactions
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// Optional date-range filter; omitted means all history on the
    /// modern protocol.
    pub range: Option<DateRange>,
    /// Validate and report without writing anything.
    pub dry_run: bool,
    pub scope: SyncScope,
    /// Mutations per commit/checkpoint. Clamped to 50..=500.
    pub batch_size: usize,
    /// Upstream page size for the mutation collection.
    pub page_size: u64,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            range: None,
            dry_run: false,
            scope: SyncScope::default(),
            batch_size: 100,
            page_size: 500,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncOptions {
    fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(50, 500)
    }
}

/// Cooperative cancellation handle. Stops the run before the next
/// batch starts; in-flight writes always complete or roll back whole.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One triage-ready failure from the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureExample {
    pub mutation_id: i64,
    pub reason: String,
}

/// Final report of a migration run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub fetched: u64,
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub truncated: bool,
    pub dry_run: bool,
    /// Bounded set of example failures (up to 10).
    pub failures: Vec<FailureExample>,
}

#[derive(Default)]
struct BatchStats {
    imported: u64,
    skipped: u64,
    failed: u64,
}

impl Engine {
    /// Runs one migration against `source` and reports the outcome.
    ///
    /// Returns `Ok` for completed and cancelled runs (the report carries
    /// the terminal status); systemic failures mark the run `Failed` and
    /// surface as `Err`.
    pub async fn run_migration<S: MutationSource>(
        &self,
        source: &S,
        options: SyncOptions,
        cancel: CancelFlag,
    ) -> ResultEngine<RunReport> {
        let db = self.database();
        let mut run = MigrationRun::new(options.range, options.dry_run);
        run.insert(db).await?;
        tracing::info!(run_id = %run.id, dry_run = options.dry_run, "migration run created");

        let mut failures: Vec<FailureExample> = Vec::new();
        let outcome = if options.dry_run {
            // One outer transaction for the whole dry run: batches nest
            // as savepoints and everything is discarded at the end.
            let tx = db.begin().await?;
            let result = self
                .drive(&tx, source, &options, &cancel, &mut run, &mut failures)
                .await;
            tx.rollback().await?;
            result
        } else {
            self.drive(db, source, &options, &cancel, &mut run, &mut failures)
                .await
        };

        match outcome {
            Ok(()) => {
                run.set_operation("Migration completed", 100);
                run.transition(RunStatus::Completed)?;
            }
            Err(EngineError::Cancelled) => {
                run.set_operation("Cancelled on user request", run.progress_pct);
                run.transition(RunStatus::Cancelled)?;
                tracing::warn!(run_id = %run.id, "migration run cancelled");
            }
            Err(err) => {
                run.error = Some(err.to_string());
                run.set_operation("Migration failed", run.progress_pct);
                run.transition(RunStatus::Failed)?;
                run.save(db).await?;
                tracing::error!(run_id = %run.id, error = %err, "migration run failed");
                return Err(err);
            }
        }
        run.save(db).await?;

        Ok(RunReport {
            run_id: run.id,
            status: run.status,
            fetched: run.fetched,
            imported: run.imported,
            skipped: run.skipped,
            failed: run.failed,
            truncated: run.truncated,
            dry_run: run.dry_run,
            failures,
        })
    }

    async fn drive<C, S>(
        &self,
        conn: &C,
        source: &S,
        options: &SyncOptions,
        cancel: &CancelFlag,
        run: &mut MigrationRun,
        failures: &mut Vec<FailureExample>,
    ) -> ResultEngine<()>
    where
        C: ConnectionTrait + TransactionTrait,
        S: MutationSource,
    {
        run.transition(RunStatus::SettingUp)?;
        run.set_operation("Loading mapping caches", 2);
        run.save(conn).await?;

        let mut accounts = AccountMapper::load(conn).await?;
        let mut parties = PartyResolver::load(conn).await?;

        if options.scope.accounts {
            run.set_operation("Importing chart of accounts", 5);
            run.save(conn).await?;
            let ledgers = options.retry.execute(|| source.ledgers()).await?;
            let tx = conn.begin().await?;
            let created = accounts.sync_chart(&tx, &ledgers).await?;
            tx.commit().await?;
            tracing::info!(total = ledgers.len(), created, "chart of accounts synced");
        }

        if options.scope.parties {
            run.set_operation("Fetching counterparty relations", 10);
            run.save(conn).await?;
            let relations = options.retry.execute(|| source.relations()).await?;
            tracing::info!(total = relations.len(), "relation details cached");
            parties.prime(relations);
        }

        run.transition(RunStatus::ImportingTransactions)?;
        run.phase = if options.scope.opening_balances && !options.scope.transactions {
            RunPhase::OpeningBalances
        } else {
            RunPhase::Transactions
        };
        run.set_operation("Importing transactions", 20);
        run.save(conn).await?;

        if !options.scope.transactions && !options.scope.opening_balances {
            return Ok(());
        }

        let mut guard = DuplicateGuard::load(conn).await?;
        let mut pager = Paginator::new(source, options.retry.clone(), options.range, options.page_size);
        let batch_size = options.effective_batch_size();
        let mut pending: Vec<Mutation> = Vec::with_capacity(batch_size);
        let mut consecutive_failures = 0u32;

        loop {
            // A page fetch that exhausts its retries fails the run; pages
            // are never silently skipped.
            let page = pager.next_page().await?;
            run.fetched = pager.fetched();
            run.truncated = pager.truncated();

            let Some(mutations) = page else {
                break;
            };
            pending.extend(
                mutations
                    .into_iter()
                    .filter(|m| options.scope.includes(m.type_code)),
            );

            while pending.len() >= batch_size {
                let batch: Vec<Mutation> = pending.drain(..batch_size).collect();
                self.run_batch(
                    conn,
                    source,
                    options,
                    cancel,
                    run,
                    &mut accounts,
                    &mut parties,
                    &mut guard,
                    failures,
                    &mut consecutive_failures,
                    batch,
                )
                .await?;
            }
        }

        if !pending.is_empty() {
            let batch: Vec<Mutation> = std::mem::take(&mut pending);
            self.run_batch(
                conn,
                source,
                options,
                cancel,
                run,
                &mut accounts,
                &mut parties,
                &mut guard,
                failures,
                &mut consecutive_failures,
                batch,
            )
            .await?;
        }

        if run.truncated {
            tracing::warn!(
                fetched = run.fetched,
                "upstream truncated the mutation history; import is incomplete"
            );
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_batch<C, S>(
        &self,
        conn: &C,
        source: &S,
        options: &SyncOptions,
        cancel: &CancelFlag,
        run: &mut MigrationRun,
        accounts: &mut AccountMapper,
        parties: &mut PartyResolver,
        guard: &mut DuplicateGuard,
        failures: &mut Vec<FailureExample>,
        consecutive_failures: &mut u32,
        batch: Vec<Mutation>,
    ) -> ResultEngine<()>
    where
        C: ConnectionTrait + TransactionTrait,
        S: MutationSource,
    {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let tx = conn.begin().await?;
        let result = self
            .process_batch(
                &tx, source, options, run.id, &batch, accounts, parties, guard, failures,
            )
            .await;

        match result {
            Ok(stats) => {
                tx.commit().await?;
                *consecutive_failures = 0;
                run.imported += stats.imported;
                run.skipped += stats.skipped;
                run.failed += stats.failed;
            }
            Err(err) => {
                // Roll back the half-written batch and record the failure
                // against every mutation in it.
                tx.rollback().await?;
                guard.forget_batch(batch.iter().map(|m| m.id));
                tracing::error!(error = %err, batch = batch.len(), "batch failed, rolled back");

                if matches!(&err, EngineError::Upstream(ClientError::Auth(_))) {
                    return Err(err);
                }

                let mark = conn.begin().await?;
                for mutation in &batch {
                    guard
                        .record(
                            &mark,
                            run.id,
                            mutation.id,
                            ImportOutcome::Failed,
                            None,
                            Some(format!("batch rolled back: {err}")),
                        )
                        .await?;
                }
                mark.commit().await?;

                run.failed += batch.len() as u64;
                push_failure(
                    failures,
                    batch.first().map_or(0, |m| m.id),
                    format!("batch rolled back: {err}"),
                );

                *consecutive_failures += 1;
                if *consecutive_failures >= MAX_CONSECUTIVE_BATCH_FAILURES {
                    return Err(err);
                }
            }
        }

        let processed = run.imported + run.skipped + run.failed;
        let denominator = run.fetched.max(processed).max(1);
        let pct = 20 + ((processed * 75) / denominator) as u8;
        run.set_operation(
            format!("Imported {processed}/{} mutations", run.fetched),
            pct.min(95),
        );
        run.save(conn).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_batch<C, S>(
        &self,
        tx: &C,
        source: &S,
        options: &SyncOptions,
        run_id: Uuid,
        batch: &[Mutation],
        accounts: &mut AccountMapper,
        parties: &mut PartyResolver,
        guard: &mut DuplicateGuard,
        failures: &mut Vec<FailureExample>,
    ) -> ResultEngine<BatchStats>
    where
        C: ConnectionTrait,
        S: MutationSource,
    {
        let mut stats = BatchStats::default();

        for mutation in batch {
            match self
                .process_one(tx, source, options, run_id, mutation, accounts, parties, guard)
                .await
            {
                Ok(ImportOutcome::Imported) => stats.imported += 1,
                Ok(ImportOutcome::SkippedDuplicate | ImportOutcome::Skipped) => {
                    stats.skipped += 1;
                }
                Ok(ImportOutcome::Failed) => stats.failed += 1,
                Err(err) if err.is_mutation_scoped() => {
                    let reason = err.to_string();
                    guard
                        .record(
                            tx,
                            run_id,
                            mutation.id,
                            ImportOutcome::Failed,
                            None,
                            Some(reason.clone()),
                        )
                        .await?;
                    push_failure(failures, mutation.id, reason);
                    stats.failed += 1;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_one<C, S>(
        &self,
        tx: &C,
        source: &S,
        options: &SyncOptions,
        run_id: Uuid,
        mutation: &Mutation,
        accounts: &mut AccountMapper,
        parties: &mut PartyResolver,
        guard: &mut DuplicateGuard,
    ) -> ResultEngine<ImportOutcome>
    where
        C: ConnectionTrait,
        S: MutationSource,
    {
        // Duplicate check runs before any resolution work.
        if guard.already_imported(tx, mutation.id).await? {
            guard
                .record(
                    tx,
                    run_id,
                    mutation.id,
                    ImportOutcome::SkippedDuplicate,
                    None,
                    None,
                )
                .await?;
            return Ok(ImportOutcome::SkippedDuplicate);
        }

        let Some(kind) = mutation.kind() else {
            return Err(EngineError::Validation(format!(
                "unknown mutation type code {}",
                mutation.type_code
            )));
        };

        // List records omit rows for some types; ask for the full record
        // when the protocol has a detail endpoint.
        let detailed: Mutation = if mutation.rows.is_empty() {
            match options
                .retry
                .execute(|| source.mutation_detail(mutation.id))
                .await?
            {
                Some(detail) => detail,
                None => mutation.clone(),
            }
        } else {
            mutation.clone()
        };

        // Zero-amount mutations without lines are system notifications.
        if detailed.amount.is_zero() && detailed.rows.is_empty() && detailed.balance.is_none() {
            guard
                .record(
                    tx,
                    run_id,
                    mutation.id,
                    ImportOutcome::Skipped,
                    None,
                    Some("empty mutation".to_string()),
                )
                .await?;
            return Ok(ImportOutcome::Skipped);
        }

        let mut ctx = ProcessContext {
            db: tx,
            accounts,
            parties,
            source: Some(source as &dyn MutationSource),
            opening_date_fallback: options.range.and_then(|r| r.from),
        };

        let processor = Processor::select(kind);
        match processor.process(&detailed, &mut ctx).await? {
            ProcessOutcome::Document(draft) => {
                let document = insert_document(tx, mutation.id, &draft).await?;
                guard
                    .record(
                        tx,
                        run_id,
                        mutation.id,
                        ImportOutcome::Imported,
                        Some(document),
                        None,
                    )
                    .await?;
                tracing::debug!(
                    mutation = mutation.id,
                    document = document.0.as_str(),
                    "imported mutation"
                );
                Ok(ImportOutcome::Imported)
            }
            ProcessOutcome::Skip(reason) => {
                guard
                    .record(
                        tx,
                        run_id,
                        mutation.id,
                        ImportOutcome::Skipped,
                        None,
                        Some(reason),
                    )
                    .await?;
                Ok(ImportOutcome::Skipped)
            }
        }
    }
}

fn push_failure(failures: &mut Vec<FailureExample>, mutation_id: i64, reason: String) {
    if failures.len() < MAX_FAILURE_EXAMPLES {
        failures.push(FailureExample {
            mutation_id,
            reason,
        });
    }
}
