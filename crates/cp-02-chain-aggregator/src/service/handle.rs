//! Sender side of the aggregator's input channels.

use async_trait::async_trait;
use cp_01_peer_registry::{ObservationSink, SinkError};
use shared_types::{ChainStateObservation, HeaderBatch, HeightObservation, HeightSource};
use tokio::sync::mpsc;

/// Cloneable handle given to every reader task. Sends suspend while the
/// aggregator's input buffer is full.
#[derive(Clone)]
pub struct AggregatorHandle {
    pub(super) legacy_heights: mpsc::Sender<HeightObservation>,
    pub(super) current_heights: mpsc::Sender<HeightObservation>,
    pub(super) chain_states: mpsc::Sender<ChainStateObservation>,
    pub(super) header_batches: mpsc::Sender<HeaderBatch>,
}

#[async_trait]
impl ObservationSink for AggregatorHandle {
    /// Announcement heights and block heights travel on separate channels.
    async fn report_height(&self, observation: HeightObservation) -> Result<(), SinkError> {
        let channel = match observation.source {
            HeightSource::Announcement => &self.legacy_heights,
            HeightSource::Block => &self.current_heights,
        };
        channel
            .send(observation)
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn report_chain_state(
        &self,
        observation: ChainStateObservation,
    ) -> Result<(), SinkError> {
        self.chain_states
            .send(observation)
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn report_headers(&self, batch: HeaderBatch) -> Result<(), SinkError> {
        self.header_batches
            .send(batch)
            .await
            .map_err(|_| SinkError::Closed)
    }
}
