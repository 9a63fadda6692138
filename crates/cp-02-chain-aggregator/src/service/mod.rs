//! # Chain State Aggregator Service
//!
//! A single task merges observations from every reader task and drives two
//! periodic actions:
//!
//! - **report** (slow): log the best state, publish a snapshot and heartbeat
//!   the addresses of all registered peers
//! - **pull** (fast): refresh the current best peer with a status handshake
//!
//! Anything that does network I/O is spawned, so the merge loop keeps
//! draining its inputs while a slow peer is being queried.

mod handle;
mod refresh;

pub use handle::AggregatorHandle;

use cp_01_peer_registry::PeerSet;
use cp_03_address_book::AddressStore;
use shared_types::{hash_hex, ChainStateObservation, HeaderBatch, HeightObservation};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::{AggregateSnapshot, AggregateState, AggregatorConfig, ChainStateMerge};

/// Owner of the aggregate state. Consumed by [`ChainStateAggregator::run`].
pub struct ChainStateAggregator {
    config: AggregatorConfig,
    state: AggregateState,
    peers: Arc<PeerSet>,
    address_book: Option<Arc<dyn AddressStore>>,

    legacy_heights: mpsc::Receiver<HeightObservation>,
    current_heights: mpsc::Receiver<HeightObservation>,
    chain_states: mpsc::Receiver<ChainStateObservation>,
    header_batches: mpsc::Receiver<HeaderBatch>,

    /// Feeds refresh results back into the loop.
    handle: AggregatorHandle,
    snapshot_tx: watch::Sender<AggregateSnapshot>,
    refresh: Option<JoinHandle<()>>,
}

impl ChainStateAggregator {
    pub fn new(config: AggregatorConfig, peers: Arc<PeerSet>) -> (Self, AggregatorHandle) {
        let capacity = config.channel_capacity.max(1);
        let (legacy_tx, legacy_rx) = mpsc::channel(capacity);
        let (current_tx, current_rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = mpsc::channel(capacity);
        let (header_tx, header_rx) = mpsc::channel(capacity);

        let handle = AggregatorHandle {
            legacy_heights: legacy_tx,
            current_heights: current_tx,
            chain_states: state_tx,
            header_batches: header_tx,
        };
        let state = AggregateState::new(config.genesis, config.seed_state());
        let (snapshot_tx, _) = watch::channel(state.snapshot());

        let aggregator = Self {
            config,
            state,
            peers,
            address_book: None,
            legacy_heights: legacy_rx,
            current_heights: current_rx,
            chain_states: state_rx,
            header_batches: header_rx,
            handle: handle.clone(),
            snapshot_tx,
            refresh: None,
        };
        (aggregator, handle)
    }

    /// Heartbeat registered peers' addresses into `store` on every report.
    pub fn with_address_book(mut self, store: Arc<dyn AddressStore>) -> Self {
        self.address_book = Some(store);
        self
    }

    /// Snapshots are published on every report tick and on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<AggregateSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    /// Run until `shutdown` flips or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let now = Instant::now();
        let mut report = interval_at(now + self.config.report_interval, self.config.report_interval);
        let mut pull = interval_at(now + self.config.pull_interval, self.config.pull_interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);
        pull.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            network_id = self.config.network_id,
            genesis = %hash_hex(&self.config.genesis),
            "[cp-02] Chain aggregator started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[cp-02] Shutdown signal received");
                    break;
                }
                Some(observation) = self.legacy_heights.recv() => self.on_height(observation),
                Some(observation) = self.current_heights.recv() => self.on_height(observation),
                Some(observation) = self.chain_states.recv() => self.on_chain_state(observation),
                Some(batch) = self.header_batches.recv() => self.on_headers(batch),
                _ = report.tick() => self.on_report(),
                _ = pull.tick() => self.pull_best_block(),
            }
        }

        if let Some(task) = self.refresh.take() {
            task.abort();
        }
        self.publish();
    }

    fn on_height(&mut self, observation: HeightObservation) {
        if self.state.merge_height(observation) {
            debug!(
                height = observation.height,
                peer = %observation.origin.short(),
                source = ?observation.source,
                "[cp-02] New best height"
            );
        }
    }

    fn on_chain_state(&mut self, observation: ChainStateObservation) {
        match self.state.merge_chain_state(&observation) {
            ChainStateMerge::Accepted => {
                debug!(
                    td = %observation.total_difficulty,
                    head = %hash_hex(&observation.head),
                    "[cp-02] New best chain state"
                );
            }
            ChainStateMerge::GenesisMismatch => {
                debug!(
                    genesis = %hash_hex(&observation.genesis),
                    "[cp-02] Discarding chain state from foreign genesis"
                );
            }
            ChainStateMerge::NotBetter => {}
        }
    }

    fn on_headers(&mut self, batch: HeaderBatch) {
        if self.state.merge_headers(&batch) {
            debug!(
                number = batch.highest().map(|h| h.number),
                peer = %batch.origin.short(),
                "[cp-02] New best header"
            );
        }
    }

    fn on_report(&mut self) {
        let best_height = self.state.best_height();
        info!(
            height = best_height.height,
            from = ?best_height.origin,
            peers = self.peers.len(),
            "[cp-02] Best height"
        );
        info!(state = %self.state.best_state(), "[cp-02] Best chain state");
        self.publish();

        if let Some(store) = &self.address_book {
            let addresses: Vec<_> = self
                .peers
                .all_peers()
                .values()
                .filter_map(|peer| peer.remote_addr())
                .collect();
            if !addresses.is_empty() {
                let now = chrono::Utc::now().timestamp();
                tokio::spawn(refresh::heartbeat(Arc::clone(store), addresses, now));
            }
        }
    }

    /// Spawn a refresh of the best peer unless one is still running.
    fn pull_best_block(&mut self) {
        if let Some(task) = &self.refresh {
            if !task.is_finished() {
                debug!("[cp-02] Previous refresh still running, skipping");
                return;
            }
        }
        let Some(best) = self.peers.best_peer() else {
            return;
        };
        // The best peer may have been unregistered since the scan.
        let Some(peer) = self.peers.peer(&best.identity()) else {
            return;
        };
        self.refresh = Some(tokio::spawn(refresh::refresh_peer(
            peer,
            self.config.network_id,
            self.handle.clone(),
        )));
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.snapshot());
    }
}
