//! Client for the modern (REST) protocol.
//!
//! Authentication exchanges the long-lived API token for a short-lived
//! session token; the client re-authenticates transparently (once per
//! request) when the service rejects an expired session.

use std::time::Duration;

use serde::{Deserialize, de::DeserializeOwned};
use tokio::sync::Mutex;

use api_types::{DateRange, Mutation, Page, ledger::LedgerAccount, relation::Relation};

use crate::error::{ClientError, ClientResult};

/// Server page size used when draining whole collections.
const PAGE_LIMIT: u64 = 500;

/// Upper bound on the pagination offset, mirroring the service's own
/// documented collection limits. Hitting it means the loop is broken,
/// not the data.
const SAFETY_OFFSET_CAP: u64 = 50_000;

#[derive(Clone, Debug)]
pub struct RestConfig {
    /// Service base URL, scheme optional (defaults to https).
    pub base_url: String,
    /// Long-lived API token from the service's settings page.
    pub api_token: String,
    /// Source application label sent on session creation.
    pub source: String,
    /// Per-request timeout, independent of retry/backoff.
    pub request_timeout: Duration,
}

impl RestConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            source: "grootboek".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    source: String,
    session: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ItemsEnvelope<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl RestClient {
    pub fn new(config: RestConfig) -> ClientResult<Self> {
        let trimmed = config.base_url.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ClientError::Config("api base url is not set".to_string()));
        }
        let base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        if config.api_token.trim().is_empty() {
            return Err(ClientError::Config("api token is not set".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::Transport)?;

        Ok(Self {
            http,
            base_url,
            api_token: config.api_token,
            source: config.source,
            session: Mutex::new(None),
        })
    }

    /// Exchanges the API token for a session token.
    async fn authenticate(&self) -> ClientResult<String> {
        let url = format!("{}/v1/session", self.base_url);
        let body = serde_json::json!({
            "accessToken": self.api_token,
            "source": self.source,
        });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            let session: SessionResponse = response.json().await?;
            tracing::debug!("obtained new session token");
            return Ok(session.token);
        }

        let message = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(ClientError::Auth(format!(
                "session request rejected: {message}"
            )))
        } else {
            Err(ClientError::Protocol {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn session_token(&self) -> ClientResult<String> {
        let mut guard = self.session.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.authenticate().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn invalidate_session(&self) {
        self.session.lock().await.take();
    }

    /// Issues a GET and decodes the JSON body, re-authenticating once on
    /// an expired session.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let url = format!("{}/{path}", self.base_url);

        for fresh_session in [false, true] {
            let token = self.session_token().await?;
            let response = self
                .http
                .get(&url)
                .header("Authorization", token)
                .header("Accept", "application/json")
                .query(query)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<T>().await?);
            }
            if status.as_u16() == 401 && !fresh_session {
                // Session expired mid-run; drop it and go around once.
                tracing::debug!(path, "session rejected, re-authenticating");
                self.invalidate_session().await;
                continue;
            }

            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ClientError::Auth(format!("request rejected: {message}")),
                429 => ClientError::RateLimited,
                code => ClientError::Protocol {
                    status: code,
                    message: message.chars().take(500).collect(),
                },
            });
        }

        // Both passes above return; keep the compiler satisfied.
        Err(ClientError::Config("unreachable request state".to_string()))
    }

    /// Fetches a single 404-able resource.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> ClientResult<Option<T>> {
        match self.get_json::<T>(path, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::Protocol { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Drains a whole collection via offset/limit pages.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> ClientResult<Vec<T>> {
        let mut items: Vec<T> = Vec::new();
        let mut offset = 0u64;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ];
            query.extend(extra.iter().cloned());

            let page: ItemsEnvelope<T> = self.get_json(path, &query).await?;
            let received = page.items.len() as u64;
            items.extend(page.items);

            if received < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
            if offset > SAFETY_OFFSET_CAP {
                tracing::warn!(path, offset, "pagination safety cap reached, stopping");
                break;
            }
        }

        Ok(items)
    }

    /// Chart of accounts, fully drained.
    pub async fn ledgers(&self) -> ClientResult<Vec<LedgerAccount>> {
        self.fetch_all("v1/ledger", &[]).await
    }

    /// All counterparty relations, fully drained.
    pub async fn relations(&self) -> ClientResult<Vec<Relation>> {
        self.fetch_all("v1/relation", &[]).await
    }

    /// A single relation by code; `None` when the service has no record.
    pub async fn relation_detail(&self, code: &str) -> ClientResult<Option<Relation>> {
        self.get_optional(&format!("v1/relation/{code}")).await
    }

    /// One page of mutations at the given offset.
    ///
    /// A page shorter than `limit` is the final one.
    pub async fn mutations_page(
        &self,
        range: Option<DateRange>,
        offset: u64,
        limit: u64,
    ) -> ClientResult<Page<Mutation>> {
        let mut query: Vec<(&str, String)> =
            vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(range) = range {
            if let Some(from) = range.from {
                query.push(("dateFrom", from.format("%Y-%m-%d").to_string()));
            }
            if let Some(to) = range.to {
                query.push(("dateTo", to.format("%Y-%m-%d").to_string()));
            }
        }

        let envelope: ItemsEnvelope<Mutation> = self.get_json("v1/mutation", &query).await?;
        Ok(Page::new(envelope.items))
    }

    /// Full detail for one mutation (the list endpoint omits rows for
    /// some types); `None` when the service has no record.
    pub async fn mutation_detail(&self, id: i64) -> ClientResult<Option<Mutation>> {
        self.get_optional(&format!("v1/mutation/{id}")).await
    }
}
