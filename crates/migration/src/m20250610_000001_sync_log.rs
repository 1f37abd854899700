use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
pub enum MigrationRuns {
    Table,
    Id,
    Status,
    Phase,
    DateFrom,
    DateTo,
    Fetched,
    Imported,
    Skipped,
    Failed,
    ProgressPct,
    CurrentOperation,
    Truncated,
    DryRun,
    StartedAt,
    FinishedAt,
    Error,
}

#[derive(Iden)]
pub enum ImportLog {
    Table,
    Id,
    RunId,
    MutationId,
    Outcome,
    DocumentKind,
    DocumentId,
    Error,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MigrationRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MigrationRuns::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MigrationRuns::Status).string().not_null())
                    .col(ColumnDef::new(MigrationRuns::Phase).string().not_null())
                    .col(ColumnDef::new(MigrationRuns::DateFrom).date())
                    .col(ColumnDef::new(MigrationRuns::DateTo).date())
                    .col(
                        ColumnDef::new(MigrationRuns::Fetched)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MigrationRuns::Imported)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MigrationRuns::Skipped)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MigrationRuns::Failed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MigrationRuns::ProgressPct)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(MigrationRuns::CurrentOperation).string())
                    .col(
                        ColumnDef::new(MigrationRuns::Truncated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(MigrationRuns::DryRun)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(MigrationRuns::StartedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MigrationRuns::FinishedAt).timestamp())
                    .col(ColumnDef::new(MigrationRuns::Error).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ImportLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImportLog::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImportLog::RunId).string().not_null())
                    .col(
                        ColumnDef::new(ImportLog::MutationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ImportLog::Outcome).string().not_null())
                    .col(ColumnDef::new(ImportLog::DocumentKind).string())
                    .col(ColumnDef::new(ImportLog::DocumentId).string())
                    .col(ColumnDef::new(ImportLog::Error).string())
                    .col(ColumnDef::new(ImportLog::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-import_log-run_id")
                            .from(ImportLog::Table, ImportLog::RunId)
                            .to(MigrationRuns::Table, MigrationRuns::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-import_log-mutation_id-outcome")
                    .table(ImportLog::Table)
                    .col(ImportLog::MutationId)
                    .col(ImportLog::Outcome)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-import_log-run_id")
                    .table(ImportLog::Table)
                    .col(ImportLog::RunId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImportLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MigrationRuns::Table).to_owned())
            .await?;
        Ok(())
    }
}
