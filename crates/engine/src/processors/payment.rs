//! Payment mutations (types 3..=6).
//!
//! Direction follows the type code: customer payments and money
//! received flow in, supplier payments and money spent flow out. The
//! header ledger is the cash/bank side; the counter account comes from
//! the rows, falling back to the default receivable/payable account.

use sea_orm::ConnectionTrait;

use api_types::{MoneyCents, Mutation};

use crate::accounts::{
    AccountType, DEFAULT_PAYABLE_CODE, DEFAULT_RECEIVABLE_CODE,
};
use crate::balance::BALANCE_TOLERANCE;
use crate::documents::{DraftDocument, PaymentDirection, PaymentDraft};
use crate::parties::PartyKind;
use crate::{EngineError, ResultEngine};

use super::{ProcessContext, ProcessOutcome, document_reference, require_date};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentProcessor;

impl PaymentProcessor {
    pub(super) async fn process<C: ConnectionTrait>(
        &self,
        mutation: &Mutation,
        ctx: &mut ProcessContext<'_, C>,
    ) -> ResultEngine<ProcessOutcome> {
        let posting_date = require_date(mutation)?;
        let kind = mutation.kind().ok_or_else(|| {
            EngineError::Validation(format!("unknown type code {}", mutation.type_code))
        })?;
        let direction = if kind.is_money_in() {
            PaymentDirection::Receive
        } else {
            PaymentDirection::Pay
        };
        let party_kind = match direction {
            PaymentDirection::Receive => PartyKind::Customer,
            PaymentDirection::Pay => PartyKind::Supplier,
        };

        // Rows are the source of truth for the amount; the header value
        // is only cross-checked.
        let header_amount = mutation.amount.abs();
        let amount = if mutation.rows.is_empty() {
            header_amount
        } else {
            let row_total: MoneyCents = mutation.rows.iter().map(|r| r.amount.abs()).sum();
            if !header_amount.is_zero()
                && (header_amount - row_total).abs() > BALANCE_TOLERANCE
            {
                tracing::warn!(
                    mutation = mutation.id,
                    header = %header_amount,
                    rows = %row_total,
                    "payment header amount disagrees with row total; using rows"
                );
            }
            row_total
        };
        if amount.is_zero() {
            // Zero-amount payments are system notification records.
            return Ok(ProcessOutcome::Skip("zero-amount payment".to_string()));
        }

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
            None => ctx.parties.generic_party(ctx.db, party_kind).await?,
        };

        let bank_account = ctx
            .accounts
            .resolve_line(ctx.db, mutation.ledger_id, mutation.ledger_code.as_deref())
            .await
            .map_err(|err| match err {
                EngineError::AccountResolution(reason) => EngineError::AccountResolution(format!(
                    "payment mutation {} has no bank ledger: {reason}",
                    mutation.id
                )),
                other => other,
            })?;

        let counter_account = match mutation
            .rows
            .iter()
            .find(|row| row.ledger_id.is_some() || row.ledger_code.is_some())
        {
            Some(row) => {
                ctx.accounts
                    .resolve_line(ctx.db, row.ledger_id, row.ledger_code.as_deref())
                    .await?
            }
            None => match direction {
                PaymentDirection::Receive => {
                    ctx.accounts
                        .resolve_fixed(
                            ctx.db,
                            DEFAULT_RECEIVABLE_CODE,
                            "Debiteuren",
                            AccountType::Receivable,
                        )
                        .await?
                }
                PaymentDirection::Pay => {
                    ctx.accounts
                        .resolve_fixed(
                            ctx.db,
                            DEFAULT_PAYABLE_CODE,
                            "Crediteuren",
                            AccountType::Payable,
                        )
                        .await?
                }
            },
        };

        let (paid_from, paid_to) = match direction {
            PaymentDirection::Receive => (counter_account, bank_account),
            PaymentDirection::Pay => (bank_account, counter_account),
        };

        Ok(ProcessOutcome::Document(DraftDocument::Payment(
            PaymentDraft {
                direction,
                party,
                amount,
                paid_from,
                paid_to,
                posting_date,
                reference: document_reference(mutation),
            },
        )))
    }
}
