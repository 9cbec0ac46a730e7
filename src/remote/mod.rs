//! Remote fetcher module
//!
//! The sync and media engines only see [`RemoteFetcher`]. Two
//! implementations ship with the crate:
//!
//! - **`HttpFetcher`**: JSON history gateway over `HttpClient`, with
//!   retries, backoff and a governor token bucket
//! - **`InMemoryRemote`**: scriptable fake with call counters and
//!   injected failures

mod client;
mod fetcher;
mod memory;
mod rate_limit;
mod types;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig, RetryPolicy};
pub use fetcher::HttpFetcher;
pub use memory::InMemoryRemote;
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use types::{
    safe_extension, HistoryPage, RemoteFetcher, WireChat, WireHistory, WireMedia, WireMessage, WirePhoto, WireUser,
};
