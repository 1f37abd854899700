//! Opening balance mutations (type 0).
//!
//! Each opening mutation becomes one opening journal entry. Lines are
//! filtered hard: stock accounts need stock-valuation handling outside
//! this engine and are skipped silently, P&L accounts have no place in
//! an opening entry, and zero balances carry no information. When every
//! line is filtered away the whole mutation is a skip, never a failure.

use std::collections::HashSet;

use sea_orm::ConnectionTrait;

use api_types::{MoneyCents, Mutation};

use crate::accounts::AccountType;
use crate::balance::ensure_balanced;
use crate::documents::{DraftDocument, DraftLine, JournalDraft, JournalKind};
use crate::parties::PartyKind;
use crate::{EngineError, ResultEngine};

use super::{ProcessContext, ProcessOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpeningBalanceProcessor;

impl OpeningBalanceProcessor {
    pub(super) async fn process<C: ConnectionTrait>(
        &self,
        mutation: &Mutation,
        ctx: &mut ProcessContext<'_, C>,
    ) -> ResultEngine<ProcessOutcome> {
        let posting_date = mutation
            .date
            .or(ctx.opening_date_fallback)
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "opening mutation {} has no date and no cutover fallback",
                    mutation.id
                ))
            })?;

        // An opening mutation without rows carries its balance on the
        // header ledger.
        let rows: Vec<(Option<i64>, Option<&str>, MoneyCents, Option<&str>)> =
            if mutation.rows.is_empty() {
                let amount = mutation.balance.unwrap_or(mutation.amount);
                vec![(
                    mutation.ledger_id,
                    mutation.ledger_code.as_deref(),
                    amount,
                    mutation.description.as_deref(),
                )]
            } else {
                mutation
                    .rows
                    .iter()
                    .map(|row| {
                        (
                            row.ledger_id,
                            row.ledger_code.as_deref(),
                            row.amount,
                            row.description.as_deref(),
                        )
                    })
                    .collect()
            };

        let mut lines: Vec<DraftLine> = Vec::new();
        let mut seen_accounts: HashSet<uuid::Uuid> = HashSet::new();
        let mut stock_skipped = 0usize;

        for (ledger_id, ledger_code, amount, remark) in rows {
            if amount.is_zero() {
                continue;
            }
            let account = match ctx.accounts.resolve_line(ctx.db, ledger_id, ledger_code).await {
                Ok(account) => account,
                Err(EngineError::AccountResolution(reason)) => {
                    tracing::debug!(mutation = mutation.id, %reason, "skipping unmapped opening line");
                    continue;
                }
                Err(err) => return Err(err),
            };

            if account.account_type == AccountType::Stock {
                stock_skipped += 1;
                continue;
            }
            if !account.root_type().is_balance_sheet() {
                continue;
            }
            if !seen_accounts.insert(account.id) {
                continue;
            }

            // Assets carry their balance on the debit side, liabilities
            // and equity on the credit side.
            let signed = match account.root_type() {
                crate::accounts::RootType::Asset => amount,
                _ => -amount,
            };

            let party = match account.account_type {
                AccountType::Receivable => {
                    Some(ctx.parties.company_party(ctx.db, PartyKind::Customer).await?)
                }
                AccountType::Payable => {
                    Some(ctx.parties.company_party(ctx.db, PartyKind::Supplier).await?)
                }
                _ => None,
            };

            lines.push(
                DraftLine::signed(account, signed)
                    .with_party(party)
                    .with_remark(remark.map(str::to_string)),
            );
        }

        if lines.is_empty() {
            let reason = if stock_skipped > 0 {
                "opening balance only touches stock accounts".to_string()
            } else {
                "no importable opening balance lines".to_string()
            };
            return Ok(ProcessOutcome::Skip(reason));
        }

        let rounding = ctx.accounts.rounding_account(ctx.db).await?;
        ensure_balanced(&mut lines, rounding)?;

        Ok(ProcessOutcome::Document(DraftDocument::Journal(
            JournalDraft {
                kind: JournalKind::Opening,
                posting_date,
                reference: format!("EB-{}", mutation.id),
                memo: mutation.description.clone(),
                lines,
            },
        )))
    }
}
