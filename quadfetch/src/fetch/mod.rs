//! Network fetching.
//!
//! [`FetchWorkerPool`] runs a fixed number of threads that each own one
//! [`HttpClient`] and perform blocking transfers on behalf of the network
//! source stage.

mod http;
mod pool;

pub use http::{
    ClientFactory, FetchError, HttpClient, HttpResponse, ReqwestClient, DEFAULT_TIMEOUT,
    STATUS_TRANSPORT_ERROR,
};
pub use pool::{FetchCallback, FetchOutcome, FetchWorkerPool, RequestId};

#[cfg(test)]
pub(crate) use pool::tests::{gated_factory, Gate};
