//! In-process clients for exercising the engine without a network

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};

use crate::client::{BodyMode, ClientFactory, HttpClient, Response, TransportError};
use crate::request::PreparedRequest;

#[derive(Debug, Clone)]
pub enum MockBehavior {
    Status(u16),
    Error(String),
    Panic,
}

/// Answers every request the same way after a fixed delay
#[derive(Debug, Clone)]
pub struct MockClient {
    behavior: MockBehavior,
    latency: Duration,
    calls: Arc<AtomicU64>,
}

impl MockClient {
    pub fn new(behavior: MockBehavior, latency: Duration) -> Self {
        Self {
            behavior,
            latency,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for MockClient {
    async fn send(&self, _request: PreparedRequest, _mode: BodyMode) -> Result<Response, TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        // count completed exchanges only
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MockBehavior::Status(code) => Ok(Response {
                status: StatusCode::from_u16(code).unwrap_or(StatusCode::OK),
                version: Version::HTTP_3,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            }),
            MockBehavior::Error(ref desc) => Err(TransportError::Stream(desc.clone())),
            MockBehavior::Panic => panic!("mock client panicked"),
        }
    }
}

/// Hands out clients that share one call counter
pub struct MockFactory {
    template: MockClient,
}

impl MockFactory {
    pub fn new(behavior: MockBehavior, latency: Duration) -> Self {
        Self {
            template: MockClient::new(behavior, latency),
        }
    }

    /// Completed exchanges across every client created so far
    pub fn calls(&self) -> u64 {
        self.template.calls()
    }
}

impl ClientFactory for MockFactory {
    type Client = MockClient;

    fn create(&self) -> crate::errors::Result<MockClient> {
        Ok(self.template.clone())
    }
}
