//! # syncdeck-sources
//!
//! The read side of syncdeck: a registry of named data sources with a TTL
//! cache, polling, retry with backoff and supersede-on-refetch cancellation.
//!
//! ## Source kinds
//!
//! - **rest**: HTTP request, params in the query string
//! - **graphql**: POST `{query, variables}`, `errors` array fails the fetch
//! - **websocket**: single request/response exchange
//! - **static**: the configured body, no I/O
//! - **computed**: a named transform applied to the params
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use syncdeck_sources::SourceRegistry;
//! use syncdeck_types::{CacheConfig, FetchOptions, RetryConfig, SourceConfig, SourceKind};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = SourceRegistry::builder()
//!         .transform("first", |value| Ok(value[0].clone()))
//!         .build();
//!
//!     registry.register(
//!         SourceConfig::new("kpis", SourceKind::Rest)
//!             .endpoint("https://api.example.com/kpis")
//!             .retry(RetryConfig::exponential(3, Duration::from_millis(250)))
//!             .cache(CacheConfig::ttl(Duration::from_secs(60))),
//!     );
//!
//!     let response = registry.fetch("kpis", FetchOptions::default()).await;
//!     println!("{response:?}");
//! }
//! ```

mod auth;
pub mod cache;
pub mod error;
#[cfg(feature = "inspect")]
pub mod inspect;
mod registry;
mod transform;
pub mod transport;

use std::time::Duration;

/// Upper bound for timer periods and deadlines, so that configured
/// durations never overflow the clock. Roughly 30 years.
pub(crate) const MAX_WAIT: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

pub use auth::auth_header;
pub use error::{SourceError, TransformError};
pub use registry::{SourceRegistry, SourceRegistryBuilder};
pub use transform::{TransformFn, TransformRegistry};
pub use transport::{GraphqlTransport, RestTransport, Transport, WebSocketTransport};

// Re-export types for convenience
pub use syncdeck_types::{FetchOptions, FetchResponse, SourceConfig, SourceEvent, SourceState};
