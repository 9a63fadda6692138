//! # Dialer
//!
//! On every tick, dials bootstrap nodes and addresses from the address book
//! that are neither connected nor already being dialed, up to the node's
//! free peer slots.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::node::ProberNode;

pub struct Dialer {
    node: Arc<ProberNode>,
    bootstrap: Vec<String>,
    interval: Duration,
    pending: Arc<Mutex<HashSet<SocketAddr>>>,
}

impl Dialer {
    pub fn new(node: Arc<ProberNode>, bootstrap: Vec<String>, interval: Duration) -> Self {
        Self {
            node,
            bootstrap,
            interval,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run until `shutdown` flips. The first round starts immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            bootstrap = self.bootstrap.len(),
            interval = ?self.interval,
            "[prober] Dialer started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[prober] Dialer shutdown signal received");
                    return;
                }
                _ = ticker.tick() => self.dial_round().await,
            }
        }
    }

    async fn dial_round(&self) {
        let slots = self.node.capacity().saturating_sub(self.pending.lock().len());
        if slots == 0 {
            return;
        }
        let candidates = self.candidates().await;
        for addr in candidates.into_iter().take(slots) {
            self.pending.lock().insert(addr);
            let node = Arc::clone(&self.node);
            let pending = Arc::clone(&self.pending);
            tokio::spawn(async move {
                match node.dial(addr).await {
                    Ok(id) => debug!(%addr, peer = %id.short(), "[prober] Dial succeeded"),
                    Err(e) => debug!(%addr, error = %e, "[prober] Dial failed"),
                }
                pending.lock().remove(&addr);
            });
        }
    }

    /// Bootstrap nodes first, then the address book, minus anything
    /// connected or in flight.
    async fn candidates(&self) -> Vec<SocketAddr> {
        let mut seen: HashSet<SocketAddr> = self
            .node
            .peers()
            .all_peers()
            .values()
            .filter_map(|peer| peer.remote_addr())
            .collect();
        seen.extend(self.pending.lock().iter().copied());

        let mut out = Vec::new();
        for entry in &self.bootstrap {
            match tokio::net::lookup_host(entry.as_str()).await {
                Ok(addrs) => {
                    for addr in addrs {
                        if seen.insert(addr) {
                            out.push(addr);
                        }
                    }
                }
                Err(e) => warn!(node = %entry, error = %e, "[prober] Cannot resolve bootstrap node"),
            }
        }
        match self.node.address_book().known_addresses().await {
            Ok(known) => out.extend(known.into_iter().filter(|addr| seen.insert(*addr))),
            Err(e) => warn!(error = %e, "[prober] Address book unavailable"),
        }
        out
    }
}
