//! deepr-api: Typed client for the deep research backend
//!
//! Wire types, the Server-Sent-Events research stream, and the
//! history/settings endpoints.

pub mod backend;
pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use backend::ResearchBackend;
pub use client::{BASE_URL_ENV, DEFAULT_BASE_URL, ResearchClient};
pub use error::{Error, Result};
pub use stream::ResearchEventStream;
pub use types::*;
