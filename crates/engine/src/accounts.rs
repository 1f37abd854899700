//! Target-ledger accounts and the external code → account mapper.
//!
//! Ledger codes follow the Dutch decimal chart-of-accounts convention;
//! the numeric prefix of a code decides the account type when no mapping
//! exists yet. Mappings are persisted in `ledger_mappings` so that
//! correctness never depends on process lifetime; the in-memory map is
//! only a fast path.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, ledger_mappings};

/// Account code of the rounding-adjustment account. Created on demand.
pub const ROUNDING_ACCOUNT_CODE: &str = "9999";
/// Fallback receivable/payable accounts for payments without usable rows.
pub const DEFAULT_RECEIVABLE_CODE: &str = "1300";
pub const DEFAULT_PAYABLE_CODE: &str = "1400";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl RootType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Balance-sheet roots may appear in opening entries; P&L roots may
    /// not.
    #[must_use]
    pub fn is_balance_sheet(self) -> bool {
        matches!(self, Self::Asset | Self::Liability | Self::Equity)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    FixedAsset,
    CurrentAsset,
    Bank,
    Receivable,
    Payable,
    CurrentLiability,
    Equity,
    Income,
    Expense,
    Tax,
    Stock,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FixedAsset => "fixed_asset",
            Self::CurrentAsset => "current_asset",
            Self::Bank => "bank",
            Self::Receivable => "receivable",
            Self::Payable => "payable",
            Self::CurrentLiability => "current_liability",
            Self::Equity => "equity",
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Tax => "tax",
            Self::Stock => "stock",
        }
    }

    #[must_use]
    pub fn root_type(self) -> RootType {
        match self {
            Self::FixedAsset | Self::CurrentAsset | Self::Bank | Self::Receivable | Self::Stock => {
                RootType::Asset
            }
            Self::Payable | Self::CurrentLiability | Self::Tax => RootType::Liability,
            Self::Equity => RootType::Equity,
            Self::Income => RootType::Income,
            Self::Expense => RootType::Expense,
        }
    }
}

impl TryFrom<&str> for AccountType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "fixed_asset" => Ok(Self::FixedAsset),
            "current_asset" => Ok(Self::CurrentAsset),
            "bank" => Ok(Self::Bank),
            "receivable" => Ok(Self::Receivable),
            "payable" => Ok(Self::Payable),
            "current_liability" => Ok(Self::CurrentLiability),
            "equity" => Ok(Self::Equity),
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "tax" => Ok(Self::Tax),
            "stock" => Ok(Self::Stock),
            other => Err(EngineError::Validation(format!(
                "invalid account type: {other}"
            ))),
        }
    }
}

/// Infers an account type from a ledger code's numeric prefix, following
/// the Dutch decimal chart convention. Unmatched codes default to
/// current asset.
#[must_use]
pub fn classify_code(code: &str, name: &str) -> AccountType {
    let code = code.trim();
    let name_lower = name.to_lowercase();

    if code.starts_with('0') {
        AccountType::FixedAsset
    } else if code.starts_with("10") || code.starts_with("11") {
        AccountType::Bank
    } else if code.starts_with("13") {
        AccountType::Receivable
    } else if code.starts_with("14") {
        AccountType::Payable
    } else if code.starts_with('1') {
        AccountType::CurrentAsset
    } else if code.starts_with('2') {
        AccountType::CurrentLiability
    } else if code.starts_with('3') {
        AccountType::Equity
    } else if code.starts_with('4') {
        if name_lower.contains("btw") || name_lower.contains("vat") {
            AccountType::Tax
        } else {
            AccountType::Income
        }
    } else if code.starts_with('8') {
        AccountType::Income
    } else if code.starts_with('5')
        || code.starts_with('6')
        || code.starts_with('7')
        || code.starts_with('9')
    {
        AccountType::Expense
    } else {
        AccountType::CurrentAsset
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub root_type: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// A resolved target account, as handed to processors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountRef {
    pub id: Uuid,
    pub account_type: AccountType,
}

impl AccountRef {
    #[must_use]
    pub fn root_type(self) -> RootType {
        self.account_type.root_type()
    }
}

/// Classifies external ledger codes and maintains the persistent
/// code → account mapping.
///
/// Single-writer: only the mapper mutates `accounts`/`ledger_mappings`.
#[derive(Debug, Default)]
pub struct AccountMapper {
    by_code: HashMap<String, AccountRef>,
    code_by_external: HashMap<i64, String>,
}

impl AccountMapper {
    /// Loads all persisted mappings, so a resumed run starts warm.
    pub async fn load(db: &impl ConnectionTrait) -> ResultEngine<Self> {
        let mut mapper = Self::default();
        let rows = ledger_mappings::Entity::find().all(db).await?;
        for row in rows {
            let id = Uuid::parse_str(&row.account_id)
                .map_err(|_| EngineError::Validation("invalid account id in mapping".into()))?;
            let account_type = AccountType::try_from(row.account_type.as_str())?;
            if let Some(external) = row.external_id {
                mapper.code_by_external.insert(external, row.code.clone());
            }
            mapper.by_code.insert(row.code, AccountRef { id, account_type });
        }
        Ok(mapper)
    }

    /// Ledger code previously registered for an external ledger id.
    #[must_use]
    pub fn code_for_external(&self, external_id: i64) -> Option<&str> {
        self.code_by_external.get(&external_id).map(String::as_str)
    }

    /// Resolves a mutation line's ledger reference (numeric id from the
    /// modern protocol, code from the legacy one) to a target account.
    pub async fn resolve_line(
        &mut self,
        db: &impl ConnectionTrait,
        ledger_id: Option<i64>,
        ledger_code: Option<&str>,
    ) -> ResultEngine<AccountRef> {
        let code = match (ledger_code, ledger_id) {
            (Some(code), _) => code.to_string(),
            (None, Some(id)) => self
                .code_for_external(id)
                .map(str::to_string)
                .ok_or_else(|| {
                    EngineError::AccountResolution(format!("unmapped ledger id {id}"))
                })?,
            (None, None) => {
                return Err(EngineError::AccountResolution(
                    "mutation line carries no ledger reference".to_string(),
                ));
            }
        };
        self.resolve(db, &code, None, ledger_id).await
    }

    /// Resolves a ledger code to a target account, creating account and
    /// mapping on first encounter. Resolving the same code twice never
    /// creates a second account.
    pub async fn resolve(
        &mut self,
        db: &impl ConnectionTrait,
        code: &str,
        name: Option<&str>,
        external_id: Option<i64>,
    ) -> ResultEngine<AccountRef> {
        let code = code.trim();
        if code.is_empty() {
            return Err(EngineError::AccountResolution(
                "empty ledger code".to_string(),
            ));
        }

        if let Some(found) = self.by_code.get(code) {
            let found = *found;
            if let Some(external) = external_id {
                self.remember_external(db, code, external).await?;
            }
            return Ok(found);
        }

        // Cache miss: the mapping may still exist from a previous run.
        if let Some(row) = ledger_mappings::Entity::find_by_id(code.to_string())
            .one(db)
            .await?
        {
            let id = Uuid::parse_str(&row.account_id)
                .map_err(|_| EngineError::Validation("invalid account id in mapping".into()))?;
            let account_type = AccountType::try_from(row.account_type.as_str())?;
            let account = AccountRef { id, account_type };
            self.by_code.insert(code.to_string(), account);
            if let Some(external) = external_id {
                self.remember_external(db, code, external).await?;
            } else if let Some(external) = row.external_id {
                self.code_by_external.insert(external, code.to_string());
            }
            return Ok(account);
        }

        let display_name = name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Grootboek {code}"));
        let account_type = classify_code(code, &display_name);
        let account = self
            .create_account(db, code, &display_name, account_type)
            .await?;

        let mapping = ledger_mappings::ActiveModel {
            code: ActiveValue::Set(code.to_string()),
            external_id: ActiveValue::Set(external_id),
            account_id: ActiveValue::Set(account.id.to_string()),
            account_type: ActiveValue::Set(account_type.as_str().to_string()),
            confirmed_at: ActiveValue::Set(Utc::now()),
        };
        mapping.insert(db).await?;

        self.by_code.insert(code.to_string(), account);
        if let Some(external) = external_id {
            self.code_by_external.insert(external, code.to_string());
        }
        tracing::debug!(code, account_type = account_type.as_str(), "mapped ledger code");
        Ok(account)
    }

    /// Resolves with an explicit, non-inferred account type. Used for
    /// engine-owned accounts such as the rounding-adjustment account.
    pub async fn resolve_fixed(
        &mut self,
        db: &impl ConnectionTrait,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> ResultEngine<AccountRef> {
        if let Some(found) = self.by_code.get(code) {
            return Ok(*found);
        }
        if let Some(row) = ledger_mappings::Entity::find_by_id(code.to_string())
            .one(db)
            .await?
        {
            let id = Uuid::parse_str(&row.account_id)
                .map_err(|_| EngineError::Validation("invalid account id in mapping".into()))?;
            let account = AccountRef {
                id,
                account_type: AccountType::try_from(row.account_type.as_str())?,
            };
            self.by_code.insert(code.to_string(), account);
            return Ok(account);
        }

        let account = self.create_account(db, code, name, account_type).await?;
        let mapping = ledger_mappings::ActiveModel {
            code: ActiveValue::Set(code.to_string()),
            external_id: ActiveValue::Set(None),
            account_id: ActiveValue::Set(account.id.to_string()),
            account_type: ActiveValue::Set(account_type.as_str().to_string()),
            confirmed_at: ActiveValue::Set(Utc::now()),
        };
        mapping.insert(db).await?;
        self.by_code.insert(code.to_string(), account);
        Ok(account)
    }

    /// The rounding-adjustment account used by the balance validator.
    pub async fn rounding_account(
        &mut self,
        db: &impl ConnectionTrait,
    ) -> ResultEngine<AccountRef> {
        self.resolve_fixed(
            db,
            ROUNDING_ACCOUNT_CODE,
            "Afrondingsverschillen",
            AccountType::Expense,
        )
        .await
    }

    /// Imports the upstream chart of accounts; returns how many accounts
    /// were newly created.
    pub async fn sync_chart(
        &mut self,
        db: &impl ConnectionTrait,
        ledgers: &[api_types::ledger::LedgerAccount],
    ) -> ResultEngine<u64> {
        let mut created = 0;
        for ledger in ledgers {
            let known = self.by_code.contains_key(ledger.code.trim());
            let external = (ledger.id != 0).then_some(ledger.id);
            self.resolve(db, &ledger.code, Some(&ledger.description), external)
                .await?;
            if !known {
                created += 1;
            }
        }
        Ok(created)
    }

    async fn remember_external(
        &mut self,
        db: &impl ConnectionTrait,
        code: &str,
        external_id: i64,
    ) -> ResultEngine<()> {
        if self.code_by_external.get(&external_id).map(String::as_str) == Some(code) {
            return Ok(());
        }
        let update = ledger_mappings::ActiveModel {
            code: ActiveValue::Set(code.to_string()),
            external_id: ActiveValue::Set(Some(external_id)),
            ..Default::default()
        };
        update.update(db).await?;
        self.code_by_external.insert(external_id, code.to_string());
        Ok(())
    }

    /// Finds or creates the target account for `code`.
    ///
    /// On an insert collision the account is re-fetched by code; if that
    /// also fails, one retry with a disambiguated name is attempted
    /// before surfacing a fatal resolution error for this code.
    async fn create_account(
        &mut self,
        db: &impl ConnectionTrait,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> ResultEngine<AccountRef> {
        if let Some(existing) = Entity::find()
            .filter(Column::Code.eq(code.to_string()))
            .one(db)
            .await?
        {
            let id = Uuid::parse_str(&existing.id)
                .map_err(|_| EngineError::Validation("invalid account id".into()))?;
            return Ok(AccountRef {
                id,
                account_type: AccountType::try_from(existing.account_type.as_str())?,
            });
        }

        let id = Uuid::new_v4();
        let row = ActiveModel {
            id: ActiveValue::Set(id.to_string()),
            code: ActiveValue::Set(code.to_string()),
            name: ActiveValue::Set(name.to_string()),
            account_type: ActiveValue::Set(account_type.as_str().to_string()),
            root_type: ActiveValue::Set(account_type.root_type().as_str().to_string()),
            created_at: ActiveValue::Set(Utc::now()),
        };

        if let Err(first_err) = row.insert(db).await {
            // Lost a race or hit a name collision: re-check, then retry
            // once under a disambiguated name.
            if let Some(existing) = Entity::find()
                .filter(Column::Code.eq(code.to_string()))
                .one(db)
                .await?
            {
                let id = Uuid::parse_str(&existing.id)
                    .map_err(|_| EngineError::Validation("invalid account id".into()))?;
                return Ok(AccountRef {
                    id,
                    account_type: AccountType::try_from(existing.account_type.as_str())?,
                });
            }

            let retry_id = Uuid::new_v4();
            let retry = ActiveModel {
                id: ActiveValue::Set(retry_id.to_string()),
                code: ActiveValue::Set(code.to_string()),
                name: ActiveValue::Set(format!("{name} ({code})")),
                account_type: ActiveValue::Set(account_type.as_str().to_string()),
                root_type: ActiveValue::Set(account_type.root_type().as_str().to_string()),
                created_at: ActiveValue::Set(Utc::now()),
            };
            if let Err(retry_err) = retry.insert(db).await {
                tracing::warn!(code, %first_err, %retry_err, "account creation failed twice");
                return Err(EngineError::AccountResolution(format!(
                    "could not create account for code {code}: {retry_err}"
                )));
            }
            return Ok(AccountRef {
                id: retry_id,
                account_type,
            });
        }

        Ok(AccountRef { id, account_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table_covers_prefix_ranges() {
        let cases = [
            ("0100", "Inventaris", AccountType::FixedAsset),
            ("1000", "Kas", AccountType::Bank),
            ("1100", "Bank", AccountType::Bank),
            ("1200", "Vooruitbetaald", AccountType::CurrentAsset),
            ("1300", "Debiteuren", AccountType::Receivable),
            ("1400", "Crediteuren", AccountType::Payable),
            ("2000", "Tussenrekening", AccountType::CurrentLiability),
            ("3000", "Algemene reserve", AccountType::Equity),
            ("4000", "Contributies", AccountType::Income),
            ("4100", "BTW hoog", AccountType::Tax),
            ("5000", "Huisvesting", AccountType::Expense),
            ("6000", "Kantoorkosten", AccountType::Expense),
            ("7000", "Inkoopkosten", AccountType::Expense),
            ("8000", "Omzet", AccountType::Income),
            ("9000", "Overige kosten", AccountType::Expense),
            ("XYZ", "Onbekend", AccountType::CurrentAsset),
        ];
        for (code, name, expected) in cases {
            assert_eq!(classify_code(code, name), expected, "code {code}");
        }
    }

    #[test]
    fn root_types_follow_account_types() {
        assert_eq!(AccountType::Bank.root_type(), RootType::Asset);
        assert_eq!(AccountType::Payable.root_type(), RootType::Liability);
        assert_eq!(AccountType::Equity.root_type(), RootType::Equity);
        assert!(RootType::Asset.is_balance_sheet());
        assert!(!RootType::Income.is_balance_sheet());
    }
}
