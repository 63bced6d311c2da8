//! The event-loop core, free of any I/O of its own.
//!
//! [`Engine`] owns every piece of daemon state. The event loop feeds it
//! datagrams, timer ticks and client requests, lending it a [`Transport`]
//! for whatever it needs to send in response.

use std::net::SocketAddr;
use std::time::Instant;

use log::debug;
use serde::Serialize;

use crate::config::DaemonConfig;
use crate::discovery::{DISCOVERY_SEQUENCE, Discovery};
use crate::dispatch::{Action, Completed, Dispatched, Dispatcher};
use crate::history::{Direction, HistorySummary, PacketHistory};
use crate::registry::{BulbSummary, Registry};
use crate::router;
use crate::selector::Selector;
use crate::transport::{Outbound, Transport};
use crate::wire::{self, Payload, Target};

/// Snapshot of the daemon's internals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub gateways: usize,
    pub bulbs: usize,
    pub discovery_cycles: u64,
    pub pending_queries: usize,
    pub history: HistorySummary,
}

#[derive(Debug)]
pub struct Engine {
    registry: Registry,
    discovery: Discovery,
    dispatcher: Dispatcher,
    history: PacketHistory,
}

impl Engine {
    pub fn new(config: &DaemonConfig, now: Instant) -> Self {
        Engine {
            registry: Registry::new(),
            discovery: Discovery::new(config, now),
            dispatcher: Dispatcher::new(config.query_timeout),
            history: PacketHistory::with_max_entries(config.history_size),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn history(&self) -> &PacketHistory {
        &self.history
    }

    /// Process one received datagram.
    ///
    /// Undecodable datagrams are logged, recorded and otherwise ignored.
    /// Returns the query this datagram completed, if any.
    pub fn on_datagram(
        &mut self,
        bytes: &[u8],
        from: SocketAddr,
        transport: &dyn Transport,
        now: Instant,
    ) -> Option<Completed> {
        let packet = match wire::decode(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("dropping {} byte datagram from {from}: {err}", bytes.len());
                self.history.record(Direction::Dropped, from, err.to_string());
                self.history.record_error(&err.to_string());
                return None;
            }
        };
        debug!(
            "<- {from} {} seq={} target={:?}",
            packet.packet_type(),
            packet.header.sequence,
            packet.header.target
        );
        self.history
            .record(Direction::Received, from, packet.packet_type().to_string());

        let mut outbound = Outbound::new(transport, &mut self.history);
        self.discovery
            .on_packet(&packet, from, &mut self.registry, &mut outbound, now);

        match (&packet.payload, packet.header.target) {
            (Payload::LightStatus(_), Target::Device(id))
                if packet.header.sequence != DISCOVERY_SEQUENCE =>
            {
                self.dispatcher
                    .on_reply(id, packet.header.sequence, &self.registry)
            }
            _ => None,
        }
    }

    /// Run due timers: discovery probes, eviction sweeps and query expiry.
    pub fn on_timer(&mut self, transport: &dyn Transport, now: Instant) -> Vec<Completed> {
        let mut outbound = Outbound::new(transport, &mut self.history);
        self.discovery
            .on_timer(now, &mut self.registry, &mut outbound);
        self.dispatcher.expire(now)
    }

    /// Resolve `selector` and dispatch `action` to the matching bulbs.
    pub fn execute(
        &mut self,
        selector: &Selector,
        action: &Action,
        transport: &dyn Transport,
        now: Instant,
    ) -> Dispatched {
        let targets = router::resolve_ids(selector, &self.registry);
        let mut outbound = Outbound::new(transport, &mut self.history);
        self.dispatcher
            .dispatch(action, &targets, &mut self.registry, &mut outbound, now)
    }

    /// When [`on_timer`](Self::on_timer) next has work to do, `None` when
    /// no timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.discovery.next_deadline(), self.dispatcher.next_deadline()) {
            (Some(discovery), Some(query)) => Some(discovery.min(query)),
            (discovery, query) => discovery.or(query),
        }
    }

    pub fn list_bulbs(&self) -> Vec<BulbSummary> {
        self.registry.list_bulbs()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            gateways: self.registry.gateway_count(),
            bulbs: self.registry.len(),
            discovery_cycles: self.discovery.cycles(),
            pending_queries: self.dispatcher.pending(),
            history: self.history.summary(),
        }
    }

    pub fn shutdown(&mut self) {
        self.discovery.stop();
    }
}
