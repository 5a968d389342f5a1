//! Resilient client for the game-stats backend API.
//!
//! [`ApiClient::request`] unwraps the `{msg, code, data}` envelope and hides
//! rate-limit and transient-failure retries behind a single call.

mod cache;
mod client;
mod config;
mod map_image;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod policy;
mod transport;

pub use cache::LookupCache;
pub use client::{ApiClient, RequestOptions};
pub use config::{ClientConfig, ConfigError};
pub use map_image::{MapImage, MapImages};
pub use policy::{RetryPolicy, RetryState};
pub use stats_types::{Envelope, FetchError, Outcome, OutcomeKind, Params};
pub use tokio_util::sync::CancellationToken;
pub use transport::{
    FormPart, FormValue, HttpRequest, HttpResponse, RequestBody, ReqwestTransport, Transport,
    TransportError,
};

#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockReply, MockTransport};
