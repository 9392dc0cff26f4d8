//! Typed, cached access to the opsdesk REST API.
//!
//! Reads go through [`QueryClient::fetch`] and are cached per read key, id
//! and parameter set. Writes go through [`QueryClient::mutate`] and, when the
//! server accepts them, mark the reads they were registered with stale.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mutation;
pub mod transport;

pub use cache::{CacheKey, CacheStatsSnapshot, QueryCache};
pub use client::{FetchRequest, QueryClient, ReadKey, ReadToken};
pub use config::{ClientConfig, FetchPolicy};
pub use error::{ClientError, TransportError};
pub use mutation::{
    MutationFailure, MutationOutcome, MutationReply, MutationRequest, MutationToken, Rejection,
    envelope_shape,
};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
