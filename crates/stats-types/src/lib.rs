//! Core types for the game-stats backend API.
//!
//! Every backend response is wrapped in a `{msg, code, data}` envelope; this crate
//! classifies one HTTP attempt into an [`Outcome`] and names the failures callers see.

mod envelope;
mod error;
pub mod query;

pub use envelope::*;
pub use error::*;
pub use query::Params;
