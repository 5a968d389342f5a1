//! Game-stats API proxy: forwards `/api/*` to the backend and serves map-image lookups.

pub mod config;
pub mod server;
