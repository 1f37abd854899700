//! Invoice mutations (type 1 received, type 2 sent).
//!
//! Line amounts keep their upstream sign all the way through; negative
//! totals are imported as-is rather than reclassified into credit
//! notes.

use sea_orm::ConnectionTrait;

use api_types::{Mutation, MutationKind};

use crate::documents::{DraftDocument, InvoiceDraft, InvoiceKind, InvoiceLineDraft};
use crate::parties::PartyKind;
use crate::{EngineError, ResultEngine};

use super::{ProcessContext, ProcessOutcome, document_reference, require_date};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvoiceProcessor;

impl InvoiceProcessor {
    pub(super) async fn process<C: ConnectionTrait>(
        &self,
        mutation: &Mutation,
        ctx: &mut ProcessContext<'_, C>,
    ) -> ResultEngine<ProcessOutcome> {
        let posting_date = require_date(mutation)?;
        let kind = match mutation.kind() {
            Some(MutationKind::SalesInvoice) => InvoiceKind::Sales,
            _ => InvoiceKind::Purchase,
        };
        let party_kind = match kind {
            InvoiceKind::Sales => PartyKind::Customer,
            InvoiceKind::Purchase => PartyKind::Supplier,
        };

        let party = match ctx
            .parties
            .resolve(
                ctx.db,
                ctx.source,
                mutation.relation_code.as_deref(),
                party_kind,
            )
            .await?
        {
            Some(party) => party,
            // Invoices need a counterparty; without a relation code the
            // catch-all party keeps the document creatable.
            None => ctx.parties.generic_party(ctx.db, party_kind).await?,
        };

        let mut lines: Vec<InvoiceLineDraft> = Vec::new();
        for row in &mutation.rows {
            if row.amount.is_zero() {
                continue;
            }
            let account = ctx
                .accounts
                .resolve_line(ctx.db, row.ledger_id, row.ledger_code.as_deref())
                .await?;
            lines.push(InvoiceLineDraft {
                account,
                amount: row.amount,
                description: row.description.clone(),
            });
        }

        // Some list records carry no rows at all; fall back to a single
        // line on the header ledger.
        if lines.is_empty() {
            if mutation.amount.is_zero() {
                return Ok(ProcessOutcome::Skip("zero-amount invoice".to_string()));
            }
            let account = ctx
                .accounts
                .resolve_line(ctx.db, mutation.ledger_id, mutation.ledger_code.as_deref())
                .await
                .map_err(|err| match err {
                    EngineError::AccountResolution(reason) => EngineError::AccountResolution(
                        format!("invoice mutation {} has no usable lines: {reason}", mutation.id),
                    ),
                    other => other,
                })?;
            lines.push(InvoiceLineDraft {
                account,
                amount: mutation.amount,
                description: mutation.description.clone(),
            });
        }

        Ok(ProcessOutcome::Document(DraftDocument::Invoice(
            InvoiceDraft {
                kind,
                party,
                posting_date,
                reference: document_reference(mutation),
                lines,
            },
        )))
    }
}
