//! Persistent external-ledger-code → target-account mapping.
//!
//! Written only by [`AccountMapper`](crate::accounts::AccountMapper);
//! safe for concurrent readers.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub external_id: Option<i64>,
    pub account_id: String,
    pub account_type: String,
    pub confirmed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
