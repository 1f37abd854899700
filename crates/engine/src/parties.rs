//! Counterparty (customer/supplier) records and their resolver.
//!
//! Parties are keyed by upstream relation code **per side**: the same
//! relation may exist as customer and as supplier. The resolver treats
//! the upstream service as source of truth for names, falls back to a
//! generated provisional name when upstream data is empty, and never
//! silently drops a party link.

use std::collections::HashMap;

use chrono::Utc;
use eboekhouden::MutationSource;
use sea_orm::{ActiveValue, QueryFilter, entity::prelude::*};
use serde::{Deserialize, Serialize};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};
use uuid::Uuid;

use api_types::relation::Relation as UpstreamRelation;

use crate::{EngineError, ResultEngine};

/// Reserved relation code for the administration itself, used on
/// receivable/payable lines of opening and memorial entries.
pub const INTERNAL_RELATION_CODE: &str = "intern";
/// Reserved relation code for mutations that carry no relation at all.
pub const GENERIC_RELATION_CODE: &str = "onbekend";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl PartyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Supplier => "supplier",
        }
    }
}

impl TryFrom<&str> for PartyKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "customer" => Ok(Self::Customer),
            "supplier" => Ok(Self::Supplier),
            other => Err(EngineError::Validation(format!(
                "invalid party type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "parties")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub relation_code: String,
    pub party_type: String,
    pub display_name: String,
    pub name_norm: String,
    pub provisional: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// A resolved party, as attached to documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartyRef {
    pub id: Uuid,
    pub kind: PartyKind,
}

/// Search-friendly name key: NFKD, diacritics stripped, lowercased.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deduplicates and creates customer/supplier records from external
/// relation data. Single-writer over the `parties` table; the party
/// cache is append-only.
#[derive(Debug, Default)]
pub struct PartyResolver {
    cache: HashMap<(String, PartyKind), PartyRef>,
    relations: HashMap<String, UpstreamRelation>,
}

impl PartyResolver {
    /// Loads all persisted parties so re-runs start warm.
    pub async fn load(db: &impl ConnectionTrait) -> ResultEngine<Self> {
        let mut resolver = Self::default();
        for row in Entity::find().all(db).await? {
            let id = Uuid::parse_str(&row.id)
                .map_err(|_| EngineError::Validation("invalid party id".into()))?;
            let kind = PartyKind::try_from(row.party_type.as_str())?;
            resolver
                .cache
                .insert((row.relation_code, kind), PartyRef { id, kind });
        }
        Ok(resolver)
    }

    /// Primes the relation-detail cache from a bulk fetch, saving one
    /// upstream round-trip per party later on.
    pub fn prime(&mut self, relations: Vec<UpstreamRelation>) {
        for relation in relations {
            self.relations.insert(relation.id.clone(), relation);
        }
    }

    #[must_use]
    pub fn known_relations(&self) -> usize {
        self.relations.len()
    }

    /// Resolves a mutation's relation code to a party of the given kind.
    ///
    /// Returns `None` when the mutation carries no relation code. On a
    /// cache and store miss the resolver asks upstream for relation
    /// details; when upstream has nothing usable it creates a
    /// provisional party named after the relation code instead of
    /// dropping the link.
    pub async fn resolve(
        &mut self,
        db: &impl ConnectionTrait,
        source: Option<&dyn MutationSource>,
        relation_code: Option<&str>,
        kind: PartyKind,
    ) -> ResultEngine<Option<PartyRef>> {
        let Some(code) = relation_code.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };

        if let Some(found) = self.cache.get(&(code.to_string(), kind)) {
            return Ok(Some(*found));
        }

        // The party may exist from a previous run.
        if let Some(row) = Entity::find()
            .filter(Column::RelationCode.eq(code.to_string()))
            .filter(Column::PartyType.eq(kind.as_str().to_string()))
            .one(db)
            .await?
        {
            let id = Uuid::parse_str(&row.id)
                .map_err(|_| EngineError::Validation("invalid party id".into()))?;
            let party = PartyRef { id, kind };
            self.cache.insert((code.to_string(), kind), party);
            return Ok(Some(party));
        }

        let details = self.relation_details(source, code).await;
        let (display_name, provisional) = match details.as_ref().and_then(|d| d.display_name()) {
            Some(name) => (name.to_string(), false),
            None => (format!("Relatie {code}"), true),
        };

        let party = self
            .create_party(db, code, kind, &display_name, provisional)
            .await?;
        Ok(Some(party))
    }

    /// The administration's own party record, used when opening and
    /// memorial lines hit receivable/payable accounts without a
    /// relation.
    pub async fn company_party(
        &mut self,
        db: &impl ConnectionTrait,
        kind: PartyKind,
    ) -> ResultEngine<PartyRef> {
        self.fixed_party(db, INTERNAL_RELATION_CODE, kind, "Eigen administratie")
            .await
    }

    /// Catch-all party for invoice/payment mutations without any
    /// relation code.
    pub async fn generic_party(
        &mut self,
        db: &impl ConnectionTrait,
        kind: PartyKind,
    ) -> ResultEngine<PartyRef> {
        let name = match kind {
            PartyKind::Customer => "Diverse debiteuren",
            PartyKind::Supplier => "Diverse crediteuren",
        };
        self.fixed_party(db, GENERIC_RELATION_CODE, kind, name).await
    }

    async fn fixed_party(
        &mut self,
        db: &impl ConnectionTrait,
        code: &str,
        kind: PartyKind,
        name: &str,
    ) -> ResultEngine<PartyRef> {
        if let Some(found) = self.cache.get(&(code.to_string(), kind)) {
            return Ok(*found);
        }
        if let Some(row) = Entity::find()
            .filter(Column::RelationCode.eq(code.to_string()))
            .filter(Column::PartyType.eq(kind.as_str().to_string()))
            .one(db)
            .await?
        {
            let id = Uuid::parse_str(&row.id)
                .map_err(|_| EngineError::Validation("invalid party id".into()))?;
            let party = PartyRef { id, kind };
            self.cache.insert((code.to_string(), kind), party);
            return Ok(party);
        }
        self.create_party(db, code, kind, name, false).await
    }

    async fn relation_details(
        &mut self,
        source: Option<&dyn MutationSource>,
        code: &str,
    ) -> Option<UpstreamRelation> {
        if let Some(cached) = self.relations.get(code) {
            return Some(cached.clone());
        }
        let source = source?;
        match source.relation_detail(code).await {
            Ok(Some(relation)) => {
                self.relations.insert(code.to_string(), relation.clone());
                Some(relation)
            }
            Ok(None) => {
                tracing::debug!(code, "relation missing upstream");
                None
            }
            Err(err) => {
                // Upstream hiccups must not drop the party link; the
                // provisional record can be enriched later.
                tracing::warn!(code, error = %err, "relation fetch failed, creating provisional party");
                None
            }
        }
    }

    async fn create_party(
        &mut self,
        db: &impl ConnectionTrait,
        code: &str,
        kind: PartyKind,
        display_name: &str,
        provisional: bool,
    ) -> ResultEngine<PartyRef> {
        let id = Uuid::new_v4();
        let row = ActiveModel {
            id: ActiveValue::Set(id.to_string()),
            relation_code: ActiveValue::Set(code.to_string()),
            party_type: ActiveValue::Set(kind.as_str().to_string()),
            display_name: ActiveValue::Set(display_name.to_string()),
            name_norm: ActiveValue::Set(normalize_name(display_name)),
            provisional: ActiveValue::Set(provisional),
            created_at: ActiveValue::Set(Utc::now()),
        };
        row.insert(db).await?;

        let party = PartyRef { id, kind };
        self.cache.insert((code.to_string(), kind), party);
        tracing::debug!(code, kind = kind.as_str(), provisional, "created party");
        Ok(party)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_diacritics_and_case() {
        assert_eq!(normalize_name("Café  Zo"), "cafe zo");
        assert_eq!(normalize_name("JANSEN BV"), "jansen bv");
    }
}
