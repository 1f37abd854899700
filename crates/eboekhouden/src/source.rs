//! The engine-facing seam over both upstream protocols.
//!
//! [`MutationSource`] is what the sync engine consumes; the REST and
//! legacy clients both implement it, and tests substitute an in-memory
//! fake. [`Paginator`] drives exhaustive forward-only retrieval of the
//! mutation collection on top of any source.

use async_trait::async_trait;

use api_types::{DateRange, Mutation, Page, ledger::LedgerAccount, relation::Relation};

use crate::client::RestClient;
use crate::error::ClientResult;
use crate::legacy::LegacyClient;
use crate::retry::RetryPolicy;

#[async_trait]
pub trait MutationSource: Send + Sync {
    /// The full upstream chart of accounts.
    async fn ledgers(&self) -> ClientResult<Vec<LedgerAccount>>;

    /// All upstream counterparty relations.
    async fn relations(&self) -> ClientResult<Vec<Relation>>;

    /// A single relation by code; `None` when unknown upstream.
    async fn relation_detail(&self, code: &str) -> ClientResult<Option<Relation>>;

    /// One page of the mutation collection at `offset`. A page shorter
    /// than `limit` terminates the sequence.
    async fn mutations_page(
        &self,
        range: Option<DateRange>,
        offset: u64,
        limit: u64,
    ) -> ClientResult<Page<Mutation>>;

    /// Full detail for a single mutation, when the protocol has a detail
    /// endpoint; `None` otherwise (callers fall back to the list record).
    async fn mutation_detail(&self, id: i64) -> ClientResult<Option<Mutation>>;
}

#[async_trait]
impl MutationSource for RestClient {
    async fn ledgers(&self) -> ClientResult<Vec<LedgerAccount>> {
        RestClient::ledgers(self).await
    }

    async fn relations(&self) -> ClientResult<Vec<Relation>> {
        RestClient::relations(self).await
    }

    async fn relation_detail(&self, code: &str) -> ClientResult<Option<Relation>> {
        RestClient::relation_detail(self, code).await
    }

    async fn mutations_page(
        &self,
        range: Option<DateRange>,
        offset: u64,
        limit: u64,
    ) -> ClientResult<Page<Mutation>> {
        RestClient::mutations_page(self, range, offset, limit).await
    }

    async fn mutation_detail(&self, id: i64) -> ClientResult<Option<Mutation>> {
        RestClient::mutation_detail(self, id).await
    }
}

#[async_trait]
impl MutationSource for LegacyClient {
    async fn ledgers(&self) -> ClientResult<Vec<LedgerAccount>> {
        LegacyClient::ledgers(self).await
    }

    async fn relations(&self) -> ClientResult<Vec<Relation>> {
        LegacyClient::relations(self).await
    }

    async fn relation_detail(&self, code: &str) -> ClientResult<Option<Relation>> {
        let relations = LegacyClient::relations(self).await?;
        Ok(relations.into_iter().find(|r| r.id == code))
    }

    async fn mutations_page(
        &self,
        range: Option<DateRange>,
        offset: u64,
        _limit: u64,
    ) -> ClientResult<Page<Mutation>> {
        // The legacy service has no pagination: everything (capped at 500
        // records) comes back on the first request.
        if offset > 0 {
            return Ok(Page::new(Vec::new()));
        }
        self.mutations(range).await
    }

    async fn mutation_detail(&self, _id: i64) -> ClientResult<Option<Mutation>> {
        Ok(None)
    }
}

/// Either upstream protocol behind one concrete type, selected from the
/// configured credentials.
#[derive(Debug)]
pub enum Upstream {
    Rest(RestClient),
    Legacy(LegacyClient),
}

#[async_trait]
impl MutationSource for Upstream {
    async fn ledgers(&self) -> ClientResult<Vec<LedgerAccount>> {
        match self {
            Self::Rest(client) => client.ledgers().await,
            Self::Legacy(client) => client.ledgers().await,
        }
    }

    async fn relations(&self) -> ClientResult<Vec<Relation>> {
        match self {
            Self::Rest(client) => client.relations().await,
            Self::Legacy(client) => client.relations().await,
        }
    }

    async fn relation_detail(&self, code: &str) -> ClientResult<Option<Relation>> {
        match self {
            Self::Rest(client) => client.relation_detail(code).await,
            Self::Legacy(client) => MutationSource::relation_detail(client, code).await,
        }
    }

    async fn mutations_page(
        &self,
        range: Option<DateRange>,
        offset: u64,
        limit: u64,
    ) -> ClientResult<Page<Mutation>> {
        match self {
            Self::Rest(client) => client.mutations_page(range, offset, limit).await,
            Self::Legacy(client) => {
                MutationSource::mutations_page(client, range, offset, limit).await
            }
        }
    }

    async fn mutation_detail(&self, id: i64) -> ClientResult<Option<Mutation>> {
        match self {
            Self::Rest(client) => client.mutation_detail(id).await,
            Self::Legacy(_) => Ok(None),
        }
    }
}

/// Forward-only pager over the mutation collection.
///
/// Not restartable: each call to [`next_page`](Paginator::next_page)
/// resumes from the last offset and nothing is buffered beyond the
/// current page. Page fetches go through the retry policy; a fetch that
/// exhausts its retries surfaces as an error, never as a skipped page.
pub struct Paginator<'a, S: MutationSource + ?Sized> {
    source: &'a S,
    retry: RetryPolicy,
    range: Option<DateRange>,
    page_size: u64,
    offset: u64,
    fetched: u64,
    truncated: bool,
    done: bool,
}

impl<'a, S: MutationSource + ?Sized> Paginator<'a, S> {
    pub fn new(
        source: &'a S,
        retry: RetryPolicy,
        range: Option<DateRange>,
        page_size: u64,
    ) -> Self {
        Self {
            source,
            retry,
            range,
            page_size: page_size.max(1),
            offset: 0,
            fetched: 0,
            truncated: false,
            done: false,
        }
    }

    /// Total mutations yielded so far.
    #[must_use]
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Whether any page was flagged as truncated by the upstream.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Fetches the next page, or `None` once the collection is drained.
    pub async fn next_page(&mut self) -> ClientResult<Option<Vec<Mutation>>> {
        if self.done {
            return Ok(None);
        }

        let retry = self.retry.clone();
        let (source, range, offset, limit) = (self.source, self.range, self.offset, self.page_size);
        let page = retry
            .execute(|| source.mutations_page(range, offset, limit))
            .await?;

        let count = page.items.len() as u64;
        self.truncated |= page.truncated;
        if count < self.page_size || page.truncated {
            self.done = true;
        }
        if count == 0 {
            return Ok(None);
        }

        self.offset += count;
        self.fetched += count;
        tracing::debug!(fetched = self.fetched, page_len = count, "fetched mutation page");
        Ok(Some(page.items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_types::MoneyCents;

    struct FakeSource {
        mutations: Vec<Mutation>,
        truncate_at: Option<usize>,
    }

    fn mutation(id: i64) -> Mutation {
        Mutation {
            id,
            type_code: 7,
            date: None,
            amount: MoneyCents::new(100),
            balance: None,
            description: None,
            invoice_number: None,
            relation_code: None,
            ledger_id: None,
            ledger_code: None,
            rows: Vec::new(),
        }
    }

    #[async_trait]
    impl MutationSource for FakeSource {
        async fn ledgers(&self) -> ClientResult<Vec<LedgerAccount>> {
            Ok(Vec::new())
        }

        async fn relations(&self) -> ClientResult<Vec<Relation>> {
            Ok(Vec::new())
        }

        async fn relation_detail(&self, _code: &str) -> ClientResult<Option<Relation>> {
            Ok(None)
        }

        async fn mutations_page(
            &self,
            _range: Option<DateRange>,
            offset: u64,
            limit: u64,
        ) -> ClientResult<Page<Mutation>> {
            let start = (offset as usize).min(self.mutations.len());
            let end = (start + limit as usize).min(self.mutations.len());
            let items = self.mutations[start..end].to_vec();
            match self.truncate_at {
                Some(cap) if end >= cap => Ok(Page::truncated(items)),
                _ => Ok(Page::new(items)),
            }
        }

        async fn mutation_detail(&self, _id: i64) -> ClientResult<Option<Mutation>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn yields_every_item_exactly_once() {
        let source = FakeSource {
            mutations: (0..25).map(mutation).collect(),
            truncate_at: None,
        };
        let mut pager = Paginator::new(&source, RetryPolicy::none(), None, 10);

        let mut seen = Vec::new();
        while let Some(page) = pager.next_page().await.unwrap() {
            seen.extend(page.into_iter().map(|m| m.id));
        }

        assert_eq!(seen, (0..25).collect::<Vec<_>>());
        assert_eq!(pager.fetched(), 25);
        assert!(!pager.truncated());
    }

    #[tokio::test]
    async fn exact_multiple_of_page_size_terminates() {
        let source = FakeSource {
            mutations: (0..20).map(mutation).collect(),
            truncate_at: None,
        };
        let mut pager = Paginator::new(&source, RetryPolicy::none(), None, 10);

        let mut pages = 0;
        while pager.next_page().await.unwrap().is_some() {
            pages += 1;
        }
        // Two full pages plus one empty probe that returns None.
        assert_eq!(pages, 2);
        assert_eq!(pager.fetched(), 20);
    }

    #[tokio::test]
    async fn truncated_page_sets_flag_and_stops() {
        let source = FakeSource {
            mutations: (0..10).map(mutation).collect(),
            truncate_at: Some(10),
        };
        let mut pager = Paginator::new(&source, RetryPolicy::none(), None, 10);

        let first = pager.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 10);
        assert!(pager.truncated());
        assert!(pager.next_page().await.unwrap().is_none());
    }
}
