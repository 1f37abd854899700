//! Per-mutation-type processors.
//!
//! Dispatch is a closed enum over the fixed set of mutation kinds: the
//! lookup in [`Processor::select`] is the single place that decides
//! which document family a type code produces.
//!
//! | type code | processor | target document |
//! |---|---|---|
//! | 0 | opening | journal entry (opening) |
//! | 1, 2 | invoice | purchase/sales invoice |
//! | 3..=6 | payment | payment entry (receive/pay) |
//! | 7 | journal | journal entry (memorial) |

use chrono::NaiveDate;
use sea_orm::ConnectionTrait;

use api_types::{Mutation, MutationKind};
use eboekhouden::MutationSource;

use crate::accounts::AccountMapper;
use crate::documents::DraftDocument;
use crate::parties::PartyResolver;
use crate::{EngineError, ResultEngine};

mod invoice;
mod journal;
mod opening;
mod payment;

pub use invoice::InvoiceProcessor;
pub use journal::JournalProcessor;
pub use opening::OpeningBalanceProcessor;
pub use payment::PaymentProcessor;

/// Shared resolution context handed to every processor.
pub struct ProcessContext<'a, C: ConnectionTrait> {
    pub db: &'a C,
    pub accounts: &'a mut AccountMapper,
    pub parties: &'a mut PartyResolver,
    /// Upstream handle for on-demand relation lookups; absent in tests
    /// that only exercise cached data.
    pub source: Option<&'a dyn MutationSource>,
    /// Posting date for opening entries whose mutation carries no date.
    pub opening_date_fallback: Option<NaiveDate>,
}

/// What processing one mutation produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessOutcome {
    /// A document draft ready for balance validation and persistence.
    Document(DraftDocument),
    /// Nothing to import for this mutation; the reason lands in the log.
    Skip(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Processor {
    Opening(OpeningBalanceProcessor),
    Invoice(InvoiceProcessor),
    Payment(PaymentProcessor),
    Journal(JournalProcessor),
}

impl Processor {
    /// Fixed kind → processor lookup.
    #[must_use]
    pub fn select(kind: MutationKind) -> Self {
        match kind {
            MutationKind::OpeningBalance => Self::Opening(OpeningBalanceProcessor),
            MutationKind::PurchaseInvoice | MutationKind::SalesInvoice => {
                Self::Invoice(InvoiceProcessor)
            }
            MutationKind::CustomerPayment
            | MutationKind::SupplierPayment
            | MutationKind::MoneyReceived
            | MutationKind::MoneySpent => Self::Payment(PaymentProcessor),
            MutationKind::Memorial => Self::Journal(JournalProcessor),
        }
    }

    /// Whether this processor accepts the mutation's type code.
    #[must_use]
    pub fn can_process(&self, mutation: &Mutation) -> bool {
        let Some(kind) = mutation.kind() else {
            return false;
        };
        match self {
            Self::Opening(_) => kind == MutationKind::OpeningBalance,
            Self::Invoice(_) => {
                matches!(
                    kind,
                    MutationKind::PurchaseInvoice | MutationKind::SalesInvoice
                )
            }
            Self::Payment(_) => matches!(
                kind,
                MutationKind::CustomerPayment
                    | MutationKind::SupplierPayment
                    | MutationKind::MoneyReceived
                    | MutationKind::MoneySpent
            ),
            Self::Journal(_) => kind == MutationKind::Memorial,
        }
    }

    /// Transforms the mutation into a target-document draft.
    pub async fn process<C: ConnectionTrait>(
        &self,
        mutation: &Mutation,
        ctx: &mut ProcessContext<'_, C>,
    ) -> ResultEngine<ProcessOutcome> {
        if !self.can_process(mutation) {
            return Err(EngineError::Validation(format!(
                "mutation {} has type code {} which this processor does not handle",
                mutation.id, mutation.type_code
            )));
        }
        match self {
            Self::Opening(p) => p.process(mutation, ctx).await,
            Self::Invoice(p) => p.process(mutation, ctx).await,
            Self::Payment(p) => p.process(mutation, ctx).await,
            Self::Journal(p) => p.process(mutation, ctx).await,
        }
    }
}

/// Posting date, mandatory for everything except opening entries.
pub(crate) fn require_date(mutation: &Mutation) -> ResultEngine<NaiveDate> {
    mutation.date.ok_or_else(|| {
        EngineError::Validation(format!("mutation {} has no posting date", mutation.id))
    })
}

/// Durable document reference: the upstream invoice number when present,
/// otherwise a tag derived from the mutation id.
pub(crate) fn document_reference(mutation: &Mutation) -> String {
    mutation
        .invoice_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("EB-{}", mutation.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutation_of_type(type_code: i32) -> Mutation {
        Mutation {
            id: 1,
            type_code,
            date: None,
            amount: api_types::MoneyCents::ZERO,
            balance: None,
            description: None,
            invoice_number: None,
            relation_code: None,
            ledger_id: None,
            ledger_code: None,
            rows: Vec::new(),
        }
    }

    #[test]
    fn dispatch_table_matches_type_codes() {
        assert!(matches!(
            Processor::select(MutationKind::OpeningBalance),
            Processor::Opening(_)
        ));
        assert!(matches!(
            Processor::select(MutationKind::PurchaseInvoice),
            Processor::Invoice(_)
        ));
        assert!(matches!(
            Processor::select(MutationKind::SalesInvoice),
            Processor::Invoice(_)
        ));
        for kind in [
            MutationKind::CustomerPayment,
            MutationKind::SupplierPayment,
            MutationKind::MoneyReceived,
            MutationKind::MoneySpent,
        ] {
            assert!(matches!(Processor::select(kind), Processor::Payment(_)));
        }
        assert!(matches!(
            Processor::select(MutationKind::Memorial),
            Processor::Journal(_)
        ));
    }

    #[test]
    fn can_process_rejects_foreign_type_codes() {
        let payment = Processor::select(MutationKind::CustomerPayment);
        assert!(payment.can_process(&mutation_of_type(3)));
        assert!(payment.can_process(&mutation_of_type(6)));
        assert!(!payment.can_process(&mutation_of_type(7)));
        assert!(!payment.can_process(&mutation_of_type(42)));
    }

    #[test]
    fn reference_prefers_invoice_number() {
        let mut m = mutation_of_type(2);
        assert_eq!(document_reference(&m), "EB-1");
        m.invoice_number = Some("2023-051".to_string());
        assert_eq!(document_reference(&m), "2023-051");
    }
}
