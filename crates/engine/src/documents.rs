//! Target-ledger documents: journal entries, payment entries, invoices.
//!
//! Processors build *drafts*; the sync loop validates and persists them
//! inside the batch transaction. Every persisted document stores the
//! external mutation id as its idempotency reference.

use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, ActiveValue, ConnectionTrait};
use uuid::Uuid;

use api_types::MoneyCents;

use crate::accounts::AccountRef;
use crate::parties::PartyRef;
use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalKind {
    Journal,
    Opening,
}

impl JournalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Journal => "journal",
            Self::Opening => "opening",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentDirection {
    Receive,
    Pay,
}

impl PaymentDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Pay => "pay",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvoiceKind {
    Sales,
    Purchase,
}

impl InvoiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Purchase => "purchase",
        }
    }
}

/// Which document table an import produced; stored in the import log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    JournalEntry,
    PaymentEntry,
    Invoice,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JournalEntry => "journal_entry",
            Self::PaymentEntry => "payment_entry",
            Self::Invoice => "invoice",
        }
    }
}

/// One debit-or-credit line of a journal draft.
#[derive(Clone, Debug, PartialEq)]
pub struct DraftLine {
    pub account: AccountRef,
    pub debit: MoneyCents,
    pub credit: MoneyCents,
    pub party: Option<PartyRef>,
    pub remark: Option<String>,
}

impl DraftLine {
    #[must_use]
    pub fn debit(account: AccountRef, amount: MoneyCents) -> Self {
        Self {
            account,
            debit: amount,
            credit: MoneyCents::ZERO,
            party: None,
            remark: None,
        }
    }

    #[must_use]
    pub fn credit(account: AccountRef, amount: MoneyCents) -> Self {
        Self {
            account,
            debit: MoneyCents::ZERO,
            credit: amount,
            party: None,
            remark: None,
        }
    }

    /// Positive amounts debit the account, negative amounts credit it.
    #[must_use]
    pub fn signed(account: AccountRef, amount: MoneyCents) -> Self {
        if amount.is_negative() {
            Self::credit(account, amount.abs())
        } else {
            Self::debit(account, amount)
        }
    }

    #[must_use]
    pub fn with_party(mut self, party: Option<PartyRef>) -> Self {
        self.party = party;
        self
    }

    #[must_use]
    pub fn with_remark(mut self, remark: Option<String>) -> Self {
        self.remark = remark;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JournalDraft {
    pub kind: JournalKind,
    pub posting_date: NaiveDate,
    pub reference: String,
    pub memo: Option<String>,
    pub lines: Vec<DraftLine>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PaymentDraft {
    pub direction: PaymentDirection,
    pub party: PartyRef,
    pub amount: MoneyCents,
    pub paid_from: AccountRef,
    pub paid_to: AccountRef,
    pub posting_date: NaiveDate,
    pub reference: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceLineDraft {
    pub account: AccountRef,
    pub amount: MoneyCents,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceDraft {
    pub kind: InvoiceKind,
    pub party: PartyRef,
    pub posting_date: NaiveDate,
    pub reference: String,
    pub lines: Vec<InvoiceLineDraft>,
}

/// A fully-built document awaiting persistence.
#[derive(Clone, Debug, PartialEq)]
pub enum DraftDocument {
    Journal(JournalDraft),
    Payment(PaymentDraft),
    Invoice(InvoiceDraft),
}

impl DraftDocument {
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Journal(_) => DocumentKind::JournalEntry,
            Self::Payment(_) => DocumentKind::PaymentEntry,
            Self::Invoice(_) => DocumentKind::Invoice,
        }
    }
}

pub mod journal_entries {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "journal_entries")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub kind: String,
        pub posting_date: Date,
        pub reference: String,
        pub memo: Option<String>,
        pub mutation_id: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod journal_lines {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "journal_lines")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub entry_id: String,
        pub account_id: String,
        pub debit_minor: i64,
        pub credit_minor: i64,
        pub party_id: Option<String>,
        pub remark: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod payment_entries {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "payment_entries")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub direction: String,
        pub party_id: String,
        pub amount_minor: i64,
        pub paid_from_account_id: String,
        pub paid_to_account_id: String,
        pub posting_date: Date,
        pub reference: String,
        pub mutation_id: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod invoices {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "invoices")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub kind: String,
        pub party_id: String,
        pub posting_date: Date,
        pub reference: String,
        pub mutation_id: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod invoice_lines {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "invoice_lines")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub invoice_id: String,
        pub account_id: String,
        pub amount_minor: i64,
        pub description: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Persists a draft, tagging it with the external mutation id.
pub async fn insert_document(
    db: &impl ConnectionTrait,
    mutation_id: i64,
    draft: &DraftDocument,
) -> ResultEngine<(DocumentKind, Uuid)> {
    match draft {
        DraftDocument::Journal(journal) => {
            if journal.lines.is_empty() {
                return Err(EngineError::Validation(
                    "journal entry must have at least one line".to_string(),
                ));
            }
            let entry_id = Uuid::new_v4();
            let entry = journal_entries::ActiveModel {
                id: ActiveValue::Set(entry_id.to_string()),
                kind: ActiveValue::Set(journal.kind.as_str().to_string()),
                posting_date: ActiveValue::Set(journal.posting_date),
                reference: ActiveValue::Set(journal.reference.clone()),
                memo: ActiveValue::Set(journal.memo.clone()),
                mutation_id: ActiveValue::Set(mutation_id),
            };
            entry.insert(db).await?;

            for line in &journal.lines {
                let row = journal_lines::ActiveModel {
                    id: ActiveValue::Set(Uuid::new_v4().to_string()),
                    entry_id: ActiveValue::Set(entry_id.to_string()),
                    account_id: ActiveValue::Set(line.account.id.to_string()),
                    debit_minor: ActiveValue::Set(line.debit.cents()),
                    credit_minor: ActiveValue::Set(line.credit.cents()),
                    party_id: ActiveValue::Set(line.party.map(|p| p.id.to_string())),
                    remark: ActiveValue::Set(line.remark.clone()),
                };
                row.insert(db).await?;
            }
            Ok((DocumentKind::JournalEntry, entry_id))
        }
        DraftDocument::Payment(payment) => {
            let id = Uuid::new_v4();
            let row = payment_entries::ActiveModel {
                id: ActiveValue::Set(id.to_string()),
                direction: ActiveValue::Set(payment.direction.as_str().to_string()),
                party_id: ActiveValue::Set(payment.party.id.to_string()),
                amount_minor: ActiveValue::Set(payment.amount.cents()),
                paid_from_account_id: ActiveValue::Set(payment.paid_from.id.to_string()),
                paid_to_account_id: ActiveValue::Set(payment.paid_to.id.to_string()),
                posting_date: ActiveValue::Set(payment.posting_date),
                reference: ActiveValue::Set(payment.reference.clone()),
                mutation_id: ActiveValue::Set(mutation_id),
            };
            row.insert(db).await?;
            Ok((DocumentKind::PaymentEntry, id))
        }
        DraftDocument::Invoice(invoice) => {
            if invoice.lines.is_empty() {
                return Err(EngineError::Validation(
                    "invoice must have at least one line".to_string(),
                ));
            }
            let invoice_id = Uuid::new_v4();
            let row = invoices::ActiveModel {
                id: ActiveValue::Set(invoice_id.to_string()),
                kind: ActiveValue::Set(invoice.kind.as_str().to_string()),
                party_id: ActiveValue::Set(invoice.party.id.to_string()),
                posting_date: ActiveValue::Set(invoice.posting_date),
                reference: ActiveValue::Set(invoice.reference.clone()),
                mutation_id: ActiveValue::Set(mutation_id),
            };
            row.insert(db).await?;

            for line in &invoice.lines {
                let line_row = invoice_lines::ActiveModel {
                    id: ActiveValue::Set(Uuid::new_v4().to_string()),
                    invoice_id: ActiveValue::Set(invoice_id.to_string()),
                    account_id: ActiveValue::Set(line.account.id.to_string()),
                    amount_minor: ActiveValue::Set(line.amount.cents()),
                    description: ActiveValue::Set(line.description.clone()),
                };
                line_row.insert(db).await?;
            }
            Ok((DocumentKind::Invoice, invoice_id))
        }
    }
}
