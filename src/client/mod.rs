//! HTTP client functionality
//!
//! The benchmark engine talks to the network only through [`HttpClient`], so
//! it can be driven by the real HTTP/3 transport or by an in-process mock.

use std::future::Future;

use bytes::Bytes;
use http::header::HeaderMap;
use http::{StatusCode, Version};
use thiserror::Error;

use crate::request::PreparedRequest;

pub mod http3;
pub mod ssl;

pub use http3::{Http3Client, Http3ClientFactory, Http3ClientOptions};

/// QUIC versions the transport can negotiate, as printed by `--version`
pub const SUPPORTED_QUIC_VERSIONS: &[&str] = &["v1", "draft-29", "draft-30", "draft-31", "draft-32"];

/// What to do with a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Read and drop every chunk
    Discard,
    /// Buffer the whole body into [`Response::body`]
    Collect,
}

/// Response from a single exchange
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    /// Empty in [`BodyMode::Discard`]
    pub body: Bytes,
}

/// Failure of a single exchange
///
/// The `Display` text is the key under which benchmark errors are counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect timeout")]
    ConnectTimeout,

    #[error("{0}")]
    Connect(String),

    #[error("request timeout")]
    Timeout,

    #[error("{0}")]
    Stream(String),

    #[error("invalid request: {0}")]
    Request(String),
}

/// A client bound to one connection; requests may be sent concurrently
pub trait HttpClient: Send + Sync + 'static {
    fn send(
        &self,
        request: PreparedRequest,
        mode: BodyMode,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

/// Creates one independent client per benchmark connection
pub trait ClientFactory: Send + Sync {
    type Client: HttpClient;

    fn create(&self) -> crate::errors::Result<Self::Client>;
}
