//! Transport abstraction for opening research streams

use async_trait::async_trait;
use deepr_api::{ResearchClient, ResearchEventStream, ResearchRequest, Result};
use tokio_util::sync::CancellationToken;

/// Opens a research event stream for a request
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the stream. Cancelling `cancel` must end the stream.
    async fn open(
        &self,
        request: &ResearchRequest,
        cancel: CancellationToken,
    ) -> Result<ResearchEventStream>;
}

/// Transport backed by the backend's SSE endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ResearchClient,
}

impl HttpTransport {
    pub fn new(client: ResearchClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResearchClient {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(
        &self,
        request: &ResearchRequest,
        cancel: CancellationToken,
    ) -> Result<ResearchEventStream> {
        self.client.stream_research(request, cancel)
    }
}
