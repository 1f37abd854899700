//! Memorial mutations (type 7): generic journal entries.
//!
//! Each row becomes a signed line; the header ledger closes the entry
//! with the opposite total. Receivable/payable rows carry a party, the
//! administration's own record when the mutation names no relation.

use sea_orm::ConnectionTrait;

use api_types::{MoneyCents, Mutation};

use crate::accounts::AccountType;
use crate::balance::ensure_balanced;
use crate::documents::{DraftDocument, DraftLine, JournalDraft, JournalKind};
use crate::parties::{PartyKind, PartyRef};
use crate::{EngineError, ResultEngine};

use super::{ProcessContext, ProcessOutcome, document_reference, require_date};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JournalProcessor;

impl JournalProcessor {
    pub(super) async fn process<C: ConnectionTrait>(
        &self,
        mutation: &Mutation,
        ctx: &mut ProcessContext<'_, C>,
    ) -> ResultEngine<ProcessOutcome> {
        let posting_date = require_date(mutation)?;

        if mutation.rows.is_empty() {
            return Err(EngineError::Validation(format!(
                "memorial mutation {} has no rows",
                mutation.id
            )));
        }

        let mut lines: Vec<DraftLine> = Vec::new();
        let mut row_total = MoneyCents::ZERO;

        for row in &mutation.rows {
            if row.amount.is_zero() {
                continue;
            }
            let account = ctx
                .accounts
                .resolve_line(ctx.db, row.ledger_id, row.ledger_code.as_deref())
                .await?;
            if account.account_type == AccountType::Stock {
                return Err(EngineError::Validation(format!(
                    "memorial mutation {} touches a stock account; stock movements import via stock transactions",
                    mutation.id
                )));
            }

            let party = self
                .party_for_account(mutation, ctx, account.account_type)
                .await?;

            row_total += row.amount;
            lines.push(
                DraftLine::signed(account, row.amount)
                    .with_party(party)
                    .with_remark(row.description.clone()),
            );
        }

        if lines.is_empty() {
            return Ok(ProcessOutcome::Skip(
                "memorial mutation has only zero rows".to_string(),
            ));
        }

        // Closing line on the header ledger balances the rows.
        let main_account = ctx
            .accounts
            .resolve_line(ctx.db, mutation.ledger_id, mutation.ledger_code.as_deref())
            .await
            .map_err(|err| match err {
                EngineError::AccountResolution(reason) => EngineError::AccountResolution(format!(
                    "memorial mutation {} has no main ledger to balance against: {reason}",
                    mutation.id
                )),
                other => other,
            })?;
        if !row_total.is_zero() {
            let party = self
                .party_for_account(mutation, ctx, main_account.account_type)
                .await?;
            lines.push(
                DraftLine::signed(main_account, -row_total)
                    .with_party(party)
                    .with_remark(mutation.description.clone()),
            );
        }

        let rounding = ctx.accounts.rounding_account(ctx.db).await?;
        ensure_balanced(&mut lines, rounding)?;

        Ok(ProcessOutcome::Document(DraftDocument::Journal(
            JournalDraft {
                kind: JournalKind::Journal,
                posting_date,
                reference: document_reference(mutation),
                memo: mutation.description.clone(),
                lines,
            },
        )))
    }

    async fn party_for_account<C: ConnectionTrait>(
        &self,
        mutation: &Mutation,
        ctx: &mut ProcessContext<'_, C>,
        account_type: AccountType,
    ) -> ResultEngine<Option<PartyRef>> {
        let kind = match account_type {
            AccountType::Receivable => PartyKind::Customer,
            AccountType::Payable => PartyKind::Supplier,
            _ => return Ok(None),
        };
        if mutation.relation_code.is_some() {
            ctx.parties
                .resolve(ctx.db, ctx.source, mutation.relation_code.as_deref(), kind)
                .await
        } else {
            Ok(Some(ctx.parties.company_party(ctx.db, kind).await?))
        }
    }
}
