//! Client crate for the e-Boekhouden bookkeeping service.
//!
//! Two protocols are supported:
//! - the modern REST protocol (session tokens, offset/limit pagination);
//! - the legacy XML protocol (per-request credentials, hard cap of 500
//!   records per response).
//!
//! The sync engine consumes either through the [`MutationSource`] trait;
//! [`Paginator`] drains the mutation collection page by page, and
//! [`RetryPolicy`] centralizes retry/backoff for every upstream call.

pub use client::{RestClient, RestConfig};
pub use error::{ClientError, ClientResult};
pub use legacy::{LEGACY_RECORD_CAP, LegacyClient, LegacyConfig};
pub use retry::RetryPolicy;
pub use source::{MutationSource, Paginator, Upstream};

mod client;
mod error;
mod legacy;
mod retry;
mod source;
