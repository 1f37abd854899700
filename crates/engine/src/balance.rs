//! Double-entry balance enforcement.
//!
//! Every journal draft passes through [`ensure_balanced`] before it is
//! written. Imbalances within the rounding window get a single appended
//! adjustment line against the rounding account; anything larger is a
//! hard balance error that fails the mutation.

use api_types::MoneyCents;

use crate::accounts::AccountRef;
use crate::documents::DraftLine;
use crate::{EngineError, ResultEngine};

/// Differences at or below this are considered rounding noise when
/// cross-checking header amounts against row totals.
pub const BALANCE_TOLERANCE: MoneyCents = MoneyCents::new(1);

/// Largest imbalance a rounding line may absorb. Beyond this the data is
/// wrong, not rounded.
pub const MAX_ROUNDING_ADJUSTMENT: MoneyCents = MoneyCents::new(100);

/// Sums the draft's debit and credit sides and, when they differ,
/// appends one balancing line against `rounding_account`, signed
/// opposite to the net difference.
///
/// Existing lines are never mutated or dropped; balance is restored only
/// by appending. An imbalance beyond [`MAX_ROUNDING_ADJUSTMENT`] is a
/// [`EngineError::Balance`].
pub fn ensure_balanced(
    lines: &mut Vec<DraftLine>,
    rounding_account: AccountRef,
) -> ResultEngine<()> {
    let debit: MoneyCents = lines.iter().map(|l| l.debit).sum();
    let credit: MoneyCents = lines.iter().map(|l| l.credit).sum();
    let diff = debit - credit;

    if diff.is_zero() {
        return Ok(());
    }
    if diff.abs() > MAX_ROUNDING_ADJUSTMENT {
        return Err(EngineError::Balance(format!(
            "imbalance of {diff} exceeds the rounding window"
        )));
    }

    let adjustment = if diff.is_positive() {
        DraftLine::credit(rounding_account, diff)
    } else {
        DraftLine::debit(rounding_account, diff.abs())
    };
    tracing::debug!(%diff, "appending rounding adjustment line");
    lines.push(adjustment.with_remark(Some("Afrondingsverschil".to_string())));
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::accounts::AccountType;

    use super::*;

    fn account() -> AccountRef {
        AccountRef {
            id: Uuid::new_v4(),
            account_type: AccountType::CurrentAsset,
        }
    }

    fn rounding() -> AccountRef {
        AccountRef {
            id: Uuid::new_v4(),
            account_type: AccountType::Expense,
        }
    }

    fn totals(lines: &[DraftLine]) -> (i64, i64) {
        (
            lines.iter().map(|l| l.debit.cents()).sum(),
            lines.iter().map(|l| l.credit.cents()).sum(),
        )
    }

    #[test]
    fn balanced_lines_pass_unchanged() {
        let mut lines = vec![
            DraftLine::debit(account(), MoneyCents::new(10_000)),
            DraftLine::credit(account(), MoneyCents::new(10_000)),
        ];
        ensure_balanced(&mut lines, rounding()).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn two_cent_gap_gets_one_adjustment_line() {
        let mut lines = vec![
            DraftLine::debit(account(), MoneyCents::new(10_002)),
            DraftLine::credit(account(), MoneyCents::new(10_000)),
        ];
        ensure_balanced(&mut lines, rounding()).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].credit.cents(), 2);
        let (debit, credit) = totals(&lines);
        assert_eq!(debit, credit);
    }

    #[test]
    fn adjustment_is_signed_opposite_to_the_difference() {
        let mut lines = vec![
            DraftLine::debit(account(), MoneyCents::new(9_998)),
            DraftLine::credit(account(), MoneyCents::new(10_000)),
        ];
        ensure_balanced(&mut lines, rounding()).unwrap();
        assert_eq!(lines[2].debit.cents(), 2);
        let (debit, credit) = totals(&lines);
        assert_eq!(debit, credit);
    }

    #[test]
    fn large_imbalance_is_a_balance_error() {
        let mut lines = vec![
            DraftLine::debit(account(), MoneyCents::new(20_000)),
            DraftLine::credit(account(), MoneyCents::new(10_000)),
        ];
        let err = ensure_balanced(&mut lines, rounding()).unwrap_err();
        assert!(matches!(err, EngineError::Balance(_)));
        // Lines are untouched on failure.
        assert_eq!(lines.len(), 2);
    }
}
