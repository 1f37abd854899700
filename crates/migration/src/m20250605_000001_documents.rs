use sea_orm_migration::prelude::*;

use crate::m20250601_000001_ledger::{Accounts, Parties};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
pub enum JournalEntries {
    Table,
    Id,
    Kind,
    PostingDate,
    Reference,
    Memo,
    MutationId,
}

#[derive(Iden)]
pub enum JournalLines {
    Table,
    Id,
    EntryId,
    AccountId,
    DebitMinor,
    CreditMinor,
    PartyId,
    Remark,
}

#[derive(Iden)]
pub enum PaymentEntries {
    Table,
    Id,
    Direction,
    PartyId,
    AmountMinor,
    PaidFromAccountId,
    PaidToAccountId,
    PostingDate,
    Reference,
    MutationId,
}

#[derive(Iden)]
pub enum Invoices {
    Table,
    Id,
    Kind,
    PartyId,
    PostingDate,
    Reference,
    MutationId,
}

#[derive(Iden)]
pub enum InvoiceLines {
    Table,
    Id,
    InvoiceId,
    AccountId,
    AmountMinor,
    Description,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JournalEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JournalEntries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JournalEntries::Kind).string().not_null())
                    .col(
                        ColumnDef::new(JournalEntries::PostingDate)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JournalEntries::Reference)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JournalEntries::Memo).string())
                    .col(
                        ColumnDef::new(JournalEntries::MutationId)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-journal_entries-mutation_id-unique")
                    .table(JournalEntries::Table)
                    .col(JournalEntries::MutationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JournalLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JournalLines::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JournalLines::EntryId).string().not_null())
                    .col(ColumnDef::new(JournalLines::AccountId).string().not_null())
                    .col(
                        ColumnDef::new(JournalLines::DebitMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JournalLines::CreditMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JournalLines::PartyId).string())
                    .col(ColumnDef::new(JournalLines::Remark).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-journal_lines-entry_id")
                            .from(JournalLines::Table, JournalLines::EntryId)
                            .to(JournalEntries::Table, JournalEntries::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-journal_lines-account_id")
                            .from(JournalLines::Table, JournalLines::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-journal_lines-entry_id")
                    .table(JournalLines::Table)
                    .col(JournalLines::EntryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PaymentEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentEntries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PaymentEntries::Direction)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentEntries::PartyId).string().not_null())
                    .col(
                        ColumnDef::new(PaymentEntries::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEntries::PaidFromAccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEntries::PaidToAccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEntries::PostingDate)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEntries::Reference)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEntries::MutationId)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-payment_entries-party_id")
                            .from(PaymentEntries::Table, PaymentEntries::PartyId)
                            .to(Parties::Table, Parties::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-payment_entries-paid_from")
                            .from(PaymentEntries::Table, PaymentEntries::PaidFromAccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-payment_entries-paid_to")
                            .from(PaymentEntries::Table, PaymentEntries::PaidToAccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-payment_entries-mutation_id-unique")
                    .table(PaymentEntries::Table)
                    .col(PaymentEntries::MutationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoices::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invoices::Kind).string().not_null())
                    .col(ColumnDef::new(Invoices::PartyId).string().not_null())
                    .col(ColumnDef::new(Invoices::PostingDate).date().not_null())
                    .col(ColumnDef::new(Invoices::Reference).string().not_null())
                    .col(
                        ColumnDef::new(Invoices::MutationId)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoices-party_id")
                            .from(Invoices::Table, Invoices::PartyId)
                            .to(Parties::Table, Parties::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoices-mutation_id-unique")
                    .table(Invoices::Table)
                    .col(Invoices::MutationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InvoiceLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceLines::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(InvoiceLines::InvoiceId).string().not_null())
                    .col(ColumnDef::new(InvoiceLines::AccountId).string().not_null())
                    .col(
                        ColumnDef::new(InvoiceLines::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvoiceLines::Description).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoice_lines-invoice_id")
                            .from(InvoiceLines::Table, InvoiceLines::InvoiceId)
                            .to(Invoices::Table, Invoices::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoice_lines-account_id")
                            .from(InvoiceLines::Table, InvoiceLines::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoice_lines-invoice_id")
                    .table(InvoiceLines::Table)
                    .col(InvoiceLines::InvoiceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvoiceLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PaymentEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JournalLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JournalEntries::Table).to_owned())
            .await?;
        Ok(())
    }
}
