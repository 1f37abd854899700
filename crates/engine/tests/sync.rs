use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{ColumnTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

use api_types::{
    DateRange, MoneyCents, Mutation, MutationLine, Page, ledger::LedgerAccount,
    relation::Relation,
};
use eboekhouden::{ClientError, ClientResult, MutationSource, RetryPolicy};
use engine::{
    AccountMapper, AccountType, CancelFlag, Engine, ImportOutcome, PartyResolver, RunStatus,
    SyncOptions, SyncScope,
};
use migration::MigratorTrait;

#[derive(Default)]
struct FakeSource {
    ledgers: Vec<LedgerAccount>,
    relations: Vec<Relation>,
    mutations: Vec<Mutation>,
    truncate: bool,
    detail_fails: bool,
}

#[async_trait]
impl MutationSource for FakeSource {
    async fn ledgers(&self) -> ClientResult<Vec<LedgerAccount>> {
        Ok(self.ledgers.clone())
    }

    async fn relations(&self) -> ClientResult<Vec<Relation>> {
        Ok(self.relations.clone())
    }

    async fn relation_detail(&self, code: &str) -> ClientResult<Option<Relation>> {
        Ok(self.relations.iter().find(|r| r.id == code).cloned())
    }

    async fn mutations_page(
        &self,
        _range: Option<DateRange>,
        offset: u64,
        limit: u64,
    ) -> ClientResult<Page<Mutation>> {
        let start = (offset as usize).min(self.mutations.len());
        let end = (start + limit as usize).min(self.mutations.len());
        let items = self.mutations[start..end].to_vec();
        if self.truncate && end >= self.mutations.len() {
            Ok(Page::truncated(items))
        } else {
            Ok(Page::new(items))
        }
    }

    async fn mutation_detail(&self, id: i64) -> ClientResult<Option<Mutation>> {
        if self.detail_fails {
            return Err(ClientError::Protocol {
                status: 400,
                message: "detail endpoint rejected the request".to_string(),
            });
        }
        Ok(self.mutations.iter().find(|m| m.id == id).cloned())
    }
}

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

fn chart() -> Vec<LedgerAccount> {
    let rows = [
        (1, "1000", "Kas"),
        (2, "1300", "Debiteuren"),
        (3, "3000", "Algemene reserve"),
        (4, "8000", "Contributies"),
    ];
    rows.iter()
        .map(|(id, code, description)| LedgerAccount {
            id: *id,
            code: (*code).to_string(),
            description: (*description).to_string(),
            category: None,
            group: None,
        })
        .collect()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn mutation(id: i64, type_code: i32) -> Mutation {
    Mutation {
        id,
        type_code,
        date: Some(date(2023, 5, 17)),
        amount: MoneyCents::ZERO,
        balance: None,
        description: Some(format!("mutation {id}")),
        invoice_number: None,
        relation_code: None,
        ledger_id: None,
        ledger_code: None,
        rows: Vec::new(),
    }
}

fn row(ledger_id: i64, cents: i64) -> MutationLine {
    MutationLine {
        ledger_id: Some(ledger_id),
        ledger_code: None,
        amount: MoneyCents::new(cents),
        description: None,
    }
}

fn sample_mutations() -> Vec<Mutation> {
    let mut sales = mutation(101, 2);
    sales.amount = MoneyCents::new(12_100);
    sales.relation_code = Some("40001".to_string());
    sales.invoice_number = Some("2023-051".to_string());
    sales.ledger_id = Some(2);
    sales.rows = vec![row(4, 12_100)];

    let mut payment = mutation(102, 3);
    payment.amount = MoneyCents::new(12_100);
    payment.relation_code = Some("40001".to_string());
    payment.ledger_id = Some(1);
    payment.rows = vec![row(2, 12_100)];

    let mut memorial = mutation(103, 7);
    memorial.ledger_id = Some(1);
    memorial.rows = vec![row(4, -5_000)];

    let mut opening = mutation(104, 0);
    opening.rows = vec![row(1, 100_002), row(3, 100_000)];

    vec![sales, payment, memorial, opening]
}

fn sample_source() -> FakeSource {
    FakeSource {
        ledgers: chart(),
        relations: vec![Relation {
            id: "40001".to_string(),
            company_name: Some("Jansen BV".to_string()),
            ..Relation::default()
        }],
        mutations: sample_mutations(),
        ..FakeSource::default()
    }
}

fn fast_options() -> SyncOptions {
    SyncOptions {
        retry: RetryPolicy::none(),
        ..SyncOptions::default()
    }
}

async fn journal_totals(db: &DatabaseConnection) -> (i64, i64) {
    let lines = engine::documents::journal_lines::Entity::find()
        .all(db)
        .await
        .unwrap();
    (
        lines.iter().map(|l| l.debit_minor).sum(),
        lines.iter().map(|l| l.credit_minor).sum(),
    )
}

#[tokio::test]
async fn full_import_creates_balanced_documents() {
    let (engine, db) = engine_with_db().await;
    let source = sample_source();

    let report = engine
        .run_migration(&source, fast_options(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.fetched, 4);
    assert_eq!(report.imported, 4);
    assert_eq!(report.failed, 0);

    // Every journal document balances to the cent.
    let (debit, credit) = journal_totals(&db).await;
    assert_eq!(debit, credit);

    let invoices = engine::documents::invoices::Entity::find()
        .all(&db)
        .await
        .unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].mutation_id, 101);
    assert_eq!(invoices[0].reference, "2023-051");

    let payments = engine::documents::payment_entries::Entity::find()
        .all(&db)
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].mutation_id, 102);
    assert_eq!(payments[0].direction, "receive");
    assert_eq!(payments[0].amount_minor, 12_100);

    // The opening mutation was 0.02 out of balance; a rounding line on
    // the 9999 account absorbed it.
    let rounding_account = engine::accounts::Entity::find()
        .filter(engine::accounts::Column::Code.eq("9999"))
        .one(&db)
        .await
        .unwrap()
        .expect("rounding account created");
    let adjustments = engine::documents::journal_lines::Entity::find()
        .filter(engine::documents::journal_lines::Column::AccountId.eq(rounding_account.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].credit_minor, 2);

    // The named relation became a real party, not a provisional one.
    let party = engine::parties::Entity::find()
        .filter(engine::parties::Column::RelationCode.eq("40001"))
        .one(&db)
        .await
        .unwrap()
        .expect("party created");
    assert_eq!(party.display_name, "Jansen BV");
    assert!(!party.provisional);
}

#[tokio::test]
async fn second_run_skips_everything_as_duplicate() {
    let (engine, db) = engine_with_db().await;
    let source = sample_source();

    let first = engine
        .run_migration(&source, fast_options(), CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(first.imported, 4);

    let second = engine
        .run_migration(&source, fast_options(), CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.imported, 0);
    assert_eq!(second.skipped, 4);
    assert_eq!(second.failed, 0);

    // Target-ledger state is unchanged after the second run.
    let entries = engine::documents::journal_entries::Entity::find()
        .count(&db)
        .await
        .unwrap();
    assert_eq!(entries, 2);
    let invoices = engine::documents::invoices::Entity::find()
        .count(&db)
        .await
        .unwrap();
    assert_eq!(invoices, 1);
    let payments = engine::documents::payment_entries::Entity::find()
        .count(&db)
        .await
        .unwrap();
    assert_eq!(payments, 1);

    let duplicate_rows = engine::import_log::Entity::find()
        .filter(
            engine::import_log::Column::Outcome.eq(ImportOutcome::SkippedDuplicate.as_str()),
        )
        .count(&db)
        .await
        .unwrap();
    assert_eq!(duplicate_rows, 4);
}

#[tokio::test]
async fn truncated_upstream_is_reported_not_hidden() {
    let (engine, _db) = engine_with_db().await;

    // The legacy protocol caps history at its 500 most recent records.
    let mutations: Vec<Mutation> = (1..=500)
        .map(|id| {
            let mut m = mutation(id, 5);
            m.amount = MoneyCents::new(2_500);
            m.ledger_id = Some(1);
            m.rows = vec![row(4, 2_500)];
            m
        })
        .collect();
    let source = FakeSource {
        ledgers: chart(),
        mutations,
        truncate: true,
        ..FakeSource::default()
    };

    let report = engine
        .run_migration(&source, fast_options(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.truncated);
    assert_eq!(report.fetched, 500);
    assert_eq!(report.imported, 500);
}

#[tokio::test]
async fn opening_balance_on_stock_account_is_skipped_not_failed() {
    let (engine, db) = engine_with_db().await;

    // A stock-typed account cannot come out of prefix classification, so
    // register it explicitly the way a stock-aware setup would.
    let mut mapper = AccountMapper::load(&db).await.unwrap();
    mapper
        .resolve_fixed(&db, "1500", "Voorraad", AccountType::Stock)
        .await
        .unwrap();

    let mut opening = mutation(201, 0);
    opening.rows = vec![MutationLine {
        ledger_id: None,
        ledger_code: Some("1500".to_string()),
        amount: MoneyCents::new(50_000),
        description: None,
    }];
    let source = FakeSource {
        ledgers: chart(),
        mutations: vec![opening],
        ..FakeSource::default()
    };

    let report = engine
        .run_migration(&source, fast_options(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.imported, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);

    let entries = engine::documents::journal_entries::Entity::find()
        .count(&db)
        .await
        .unwrap();
    assert_eq!(entries, 0);

    let log = engine::import_log::Entity::find()
        .filter(engine::import_log::Column::MutationId.eq(201))
        .one(&db)
        .await
        .unwrap()
        .expect("log entry recorded");
    assert_eq!(log.outcome, ImportOutcome::Skipped.as_str());
}

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let (engine, db) = engine_with_db().await;
    let source = sample_source();

    let options = SyncOptions {
        dry_run: true,
        ..fast_options()
    };
    let report = engine
        .run_migration(&source, options, CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.dry_run);
    assert_eq!(report.imported, 4);

    // Nothing was persisted: no documents, no log, no accounts.
    assert_eq!(
        engine::documents::journal_entries::Entity::find()
            .count(&db)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        engine::import_log::Entity::find().count(&db).await.unwrap(),
        0
    );
    assert_eq!(engine::accounts::Entity::find().count(&db).await.unwrap(), 0);

    // The run row itself survives, flagged as a dry run.
    let runs = engine.latest_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].dry_run);
    assert_eq!(runs[0].status, RunStatus::Completed.as_str());
}

#[tokio::test]
async fn cancellation_stops_before_the_next_batch() {
    let (engine, db) = engine_with_db().await;
    let source = sample_source();

    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = engine
        .run_migration(&source, fast_options(), cancel)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.imported, 0);
    assert_eq!(
        engine::documents::journal_entries::Entity::find()
            .count(&db)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn failed_batch_rolls_back_and_marks_every_mutation() {
    let (engine, db) = engine_with_db().await;

    // One healthy mutation plus one that forces a detail fetch against a
    // broken endpoint: the whole batch must fail together.
    let mut healthy = mutation(301, 2);
    healthy.amount = MoneyCents::new(5_000);
    healthy.ledger_id = Some(2);
    healthy.rows = vec![row(4, 5_000)];

    let broken = mutation(302, 7); // no rows -> detail fetch -> error

    let source = FakeSource {
        ledgers: chart(),
        mutations: vec![healthy, broken],
        detail_fails: true,
        ..FakeSource::default()
    };

    let report = engine
        .run_migration(&source, fast_options(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.imported, 0);
    assert_eq!(report.failed, 2);

    // No partial documents survived the rollback.
    assert_eq!(
        engine::documents::invoices::Entity::find()
            .count(&db)
            .await
            .unwrap(),
        0
    );

    // Both mutations carry a failure record.
    let failed = engine::import_log::Entity::find()
        .filter(engine::import_log::Column::Outcome.eq(ImportOutcome::Failed.as_str()))
        .all(&db)
        .await
        .unwrap();
    let mut ids: Vec<i64> = failed.iter().map(|row| row.mutation_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![301, 302]);
}

#[tokio::test]
async fn unknown_relation_becomes_a_provisional_party() {
    let (engine, db) = engine_with_db().await;

    let mut payment = mutation(401, 3);
    payment.amount = MoneyCents::new(1_000);
    payment.relation_code = Some("99999".to_string());
    payment.ledger_id = Some(1);
    payment.rows = vec![row(2, 1_000)];

    let source = FakeSource {
        ledgers: chart(),
        mutations: vec![payment],
        ..FakeSource::default()
    };

    let report = engine
        .run_migration(&source, fast_options(), CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(report.imported, 1);

    let party = engine::parties::Entity::find()
        .filter(engine::parties::Column::RelationCode.eq("99999"))
        .one(&db)
        .await
        .unwrap()
        .expect("party created despite missing upstream data");
    assert_eq!(party.display_name, "Relatie 99999");
    assert!(party.provisional);
    assert_eq!(party.party_type, "customer");
}

#[tokio::test]
async fn account_mapper_is_idempotent_per_code() {
    let (_engine, db) = engine_with_db().await;

    let mut mapper = AccountMapper::load(&db).await.unwrap();
    let first = mapper
        .resolve(&db, "8000", Some("Contributies"), Some(4))
        .await
        .unwrap();
    let second = mapper.resolve(&db, "8000", None, None).await.unwrap();
    assert_eq!(first.id, second.id);

    // A cold mapper finds the persisted mapping instead of re-creating.
    let mut cold = AccountMapper::load(&db).await.unwrap();
    let third = cold.resolve(&db, "8000", None, None).await.unwrap();
    assert_eq!(first.id, third.id);

    let accounts = engine::accounts::Entity::find().count(&db).await.unwrap();
    assert_eq!(accounts, 1);
}

#[tokio::test]
async fn scope_can_restrict_to_opening_balances() {
    let (engine, db) = engine_with_db().await;
    let source = sample_source();

    let options = SyncOptions {
        scope: SyncScope {
            transactions: false,
            ..SyncScope::default()
        },
        ..fast_options()
    };
    let report = engine
        .run_migration(&source, options, CancelFlag::new())
        .await
        .unwrap();

    // Only the type-0 mutation is in scope.
    assert_eq!(report.imported, 1);
    assert_eq!(
        engine::documents::invoices::Entity::find()
            .count(&db)
            .await
            .unwrap(),
        0
    );
    let entries = engine::documents::journal_entries::Entity::find()
        .all(&db)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, "opening");
}

#[tokio::test]
async fn party_resolver_prefers_primed_relation_names() {
    let (_engine, db) = engine_with_db().await;

    let mut resolver = PartyResolver::load(&db).await.unwrap();
    resolver.prime(vec![Relation {
        id: "40001".to_string(),
        company_name: Some("Jansen BV".to_string()),
        ..Relation::default()
    }]);

    let party = resolver
        .resolve(&db, None, Some("40001"), engine::PartyKind::Customer)
        .await
        .unwrap()
        .expect("party resolved");

    let stored = engine::parties::Entity::find_by_id(party.id.to_string())
        .one(&db)
        .await
        .unwrap()
        .expect("stored");
    assert_eq!(stored.display_name, "Jansen BV");

    // No relation code means no party, never a phantom one.
    let none = resolver
        .resolve(&db, None, None, engine::PartyKind::Customer)
        .await
        .unwrap();
    assert!(none.is_none());
}
