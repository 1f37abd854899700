use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
pub enum Accounts {
    Table,
    Id,
    Code,
    Name,
    AccountType,
    RootType,
    CreatedAt,
}

#[derive(Iden)]
pub enum Parties {
    Table,
    Id,
    RelationCode,
    PartyType,
    DisplayName,
    NameNorm,
    Provisional,
    CreatedAt,
}

#[derive(Iden)]
pub enum LedgerMappings {
    Table,
    Code,
    ExternalId,
    AccountId,
    AccountType,
    ConfirmedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::Code).string().not_null())
                    .col(ColumnDef::new(Accounts::Name).string().not_null())
                    .col(ColumnDef::new(Accounts::AccountType).string().not_null())
                    .col(ColumnDef::new(Accounts::RootType).string().not_null())
                    .col(ColumnDef::new(Accounts::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-code-unique")
                    .table(Accounts::Table)
                    .col(Accounts::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Parties::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Parties::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Parties::RelationCode).string().not_null())
                    .col(ColumnDef::new(Parties::PartyType).string().not_null())
                    .col(ColumnDef::new(Parties::DisplayName).string().not_null())
                    .col(ColumnDef::new(Parties::NameNorm).string().not_null())
                    .col(
                        ColumnDef::new(Parties::Provisional)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Parties::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // One party per (relation, side): the same upstream relation can
        // legitimately exist as both customer and supplier.
        manager
            .create_index(
                Index::create()
                    .name("idx-parties-relation_code-party_type-unique")
                    .table(Parties::Table)
                    .col(Parties::RelationCode)
                    .col(Parties::PartyType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-parties-name_norm")
                    .table(Parties::Table)
                    .col(Parties::NameNorm)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LedgerMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerMappings::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LedgerMappings::ExternalId).big_integer())
                    .col(
                        ColumnDef::new(LedgerMappings::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerMappings::AccountType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerMappings::ConfirmedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-ledger_mappings-account_id")
                            .from(LedgerMappings::Table, LedgerMappings::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_mappings-external_id")
                    .table(LedgerMappings::Table)
                    .col(LedgerMappings::ExternalId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LedgerMappings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Parties::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
