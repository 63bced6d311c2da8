//! Gateway and bulb discovery.
//!
//! Two timers drive discovery. The probe timer broadcasts `GetPanGateway`
//! and asks every known gateway for the state of its bulbs. The slower
//! sweep timer evicts records that stopped reporting, using their last-seen
//! watermark, so a single lost probe reply never evicts a live bulb.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::config::DaemonConfig;
use crate::registry::{BulbState, Registry};
use crate::transport::Outbound;
use crate::types::SiteId;
use crate::wire::{Header, Packet, Payload, Target};

/// Sequence number of every discovery packet.
pub const DISCOVERY_SEQUENCE: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Not probing, before the first cycle or after shutdown
    Idle,
    /// A probe went out and replies are being folded into the registry
    Awaiting { cycle: u64 },
}

#[derive(Debug)]
pub struct Discovery {
    broadcast: SocketAddr,
    probe_interval: Duration,
    sweep_interval: Duration,
    stale_timeout: Duration,
    state: DiscoveryState,
    stopped: bool,
    cycles: u64,
    next_probe: Instant,
    next_sweep: Instant,
}

impl Discovery {
    /// The first probe is due immediately.
    pub fn new(config: &DaemonConfig, now: Instant) -> Self {
        Discovery {
            broadcast: config.broadcast,
            probe_interval: config.probe_interval,
            sweep_interval: config.sweep_interval,
            stale_timeout: config.stale_timeout,
            state: DiscoveryState::Idle,
            stopped: false,
            cycles: 0,
            next_probe: now,
            next_sweep: now + config.sweep_interval,
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Number of probe cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// When [`on_timer`](Self::on_timer) next has work to do, `None` once
    /// stopped.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.stopped {
            return None;
        }
        Some(self.next_probe.min(self.next_sweep))
    }

    /// Run whichever timers are due. Returns the number of evicted records.
    pub fn on_timer(
        &mut self,
        now: Instant,
        registry: &mut Registry,
        outbound: &mut Outbound<'_>,
    ) -> usize {
        if self.stopped {
            return 0;
        }
        if now >= self.next_probe {
            self.probe(registry, outbound);
            self.next_probe = now + self.probe_interval;
        }
        if now >= self.next_sweep {
            self.next_sweep = now + self.sweep_interval;
            return self.sweep(registry, now);
        }
        0
    }

    /// Start a new discovery cycle.
    pub fn probe(&mut self, registry: &Registry, outbound: &mut Outbound<'_>) {
        self.cycles += 1;
        self.state = DiscoveryState::Awaiting { cycle: self.cycles };
        trace!("discovery cycle {}", self.cycles);

        let probe = Packet::new(
            Header::new(Target::All, SiteId::default()).with_sequence(DISCOVERY_SEQUENCE),
            Payload::GetPanGateway,
        );
        outbound.send(&probe, self.broadcast);

        for gateway in registry.gateways() {
            request_state(gateway.addr(), gateway.site(), outbound);
        }
    }

    /// Evict every record older than the staleness timeout.
    pub fn sweep(&mut self, registry: &mut Registry, now: Instant) -> usize {
        let evicted = registry.evict_stale(now, self.stale_timeout);
        if evicted > 0 {
            debug!("evicted {evicted} stale record(s)");
        }
        evicted
    }

    /// Fold a device report from `from` into the registry.
    ///
    /// Returns false for packets devices don't send, which are ignored.
    pub fn on_packet(
        &mut self,
        packet: &Packet,
        from: SocketAddr,
        registry: &mut Registry,
        outbound: &mut Outbound<'_>,
        now: Instant,
    ) -> bool {
        if !packet.packet_type().is_device_report() {
            trace!("ignoring {} from {from}", packet.packet_type());
            return false;
        }

        let site = packet.header.site;
        let known = registry.gateway(&from).is_some();
        registry.upsert_gateway(from, site, now);
        if !known && !self.stopped {
            request_state(from, site, outbound);
        }

        let device = match packet.header.target {
            Target::Device(id) => Some(id),
            Target::All | Target::Tags(_) => None,
        };

        match (&packet.payload, device) {
            (Payload::LightStatus(status), Some(id)) => {
                if let Err(err) = registry.upsert_bulb(from, id, BulbState::from(status), now) {
                    debug!("dropping state of {id}: {err}");
                }
            }
            (Payload::PowerState(power), Some(id)) => {
                registry.update_bulb(&id, now, |state| state.power = *power);
            }
            (Payload::BulbLabel(label), Some(id)) => {
                registry.update_bulb(&id, now, |state| state.label = label.clone());
            }
            (Payload::Tags(tags), Some(id)) => {
                registry.update_bulb(&id, now, |state| state.tags = *tags);
            }
            (Payload::TagLabels { tags, label }, _) => {
                registry.set_tag_labels(&from, *tags, label);
            }
            _ => {}
        }
        true
    }

    /// Stop both timers for good.
    ///
    /// Reports still update the registry, but nothing is sent any more.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.state = DiscoveryState::Idle;
    }
}

/// Ask every bulb behind a gateway for its full state.
fn request_state(gateway: SocketAddr, site: SiteId, outbound: &mut Outbound<'_>) {
    let request = Packet::new(
        Header::new(Target::All, site).with_sequence(DISCOVERY_SEQUENCE),
        Payload::GetLightState,
    );
    outbound.send(&request, gateway);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::PacketHistory;
    use crate::selector::Selector;
    use crate::transport::mock::MockTransport;
    use crate::types::{DeviceId, PowerState};
    use crate::wire::LightStatus;

    const SITE: SiteId = SiteId::new([0x4c, 0x49, 0x46, 0x58, 0x56, 0x32]);

    fn gateway() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], 56700))
    }

    fn device(last: u8) -> DeviceId {
        DeviceId::new([0xd0, 0x73, 0xd5, 0, 0, last])
    }

    fn config() -> DaemonConfig {
        DaemonConfig {
            broadcast: SocketAddr::from(([192, 168, 1, 255], 56700)),
            ..DaemonConfig::default()
        }
    }

    fn report(target: Target, payload: Payload) -> Packet {
        Packet::new(Header::new(target, SITE), payload)
    }

    fn light_status(last: u8, label: &str) -> Packet {
        report(
            Target::Device(device(last)),
            Payload::LightStatus(LightStatus {
                label: label.to_string(),
                ..LightStatus::default()
            }),
        )
    }

    struct Harness {
        discovery: Discovery,
        registry: Registry,
        transport: MockTransport,
        history: PacketHistory,
        start: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let start = Instant::now();
            Harness {
                discovery: Discovery::new(&config(), start),
                registry: Registry::new(),
                transport: MockTransport::new(),
                history: PacketHistory::new(),
                start,
            }
        }

        fn timer(&mut self, now: Instant) -> usize {
            let mut outbound = Outbound::new(&self.transport, &mut self.history);
            self.discovery.on_timer(now, &mut self.registry, &mut outbound)
        }

        fn receive(&mut self, packet: &Packet, now: Instant) -> bool {
            let mut outbound = Outbound::new(&self.transport, &mut self.history);
            self.discovery
                .on_packet(packet, gateway(), &mut self.registry, &mut outbound, now)
        }
    }

    #[test]
    fn test_first_probe_is_immediate() {
        let mut harness = Harness::new();
        assert_eq!(harness.discovery.state(), DiscoveryState::Idle);
        assert_eq!(harness.discovery.next_deadline(), Some(harness.start));

        harness.timer(harness.start);

        let sent = harness.transport.sent();
        assert_eq!(sent.len(), 1);
        let (to, probe) = &sent[0];
        assert_eq!(*to, config().broadcast);
        assert_eq!(probe.payload, Payload::GetPanGateway);
        assert_eq!(probe.header.target, Target::All);
        assert_eq!(probe.header.sequence, DISCOVERY_SEQUENCE);
        assert_eq!(harness.discovery.state(), DiscoveryState::Awaiting { cycle: 1 });
        assert_eq!(
            harness.discovery.next_deadline(),
            Some(harness.start + config().probe_interval)
        );
    }

    #[test]
    fn test_two_bulbs_behind_one_gateway() {
        let mut harness = Harness::new();
        let now = harness.start;
        harness.timer(now);
        harness.transport.clear();

        let pan = report(Target::All, Payload::PanGateway { service: 1, port: 56700 });
        assert!(harness.receive(&pan, now));

        // A new gateway is asked for its bulbs straight away.
        let sent = harness.transport.sent_to(gateway());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, Payload::GetLightState);
        assert_eq!(sent[0].header.site, SITE);

        harness.receive(&light_status(1, "desk"), now);
        harness.receive(&light_status(2, "shelf"), now);

        assert_eq!(harness.registry.gateway_count(), 1);
        assert_eq!(harness.registry.len(), 2);
        let gateway = harness.registry.gateway(&gateway()).unwrap();
        assert_eq!(gateway.site(), SITE);
        assert_eq!(gateway.bulbs().count(), 2);
        // Only the first contact triggered a state request.
        assert_eq!(harness.transport.sent().len(), 1);
    }

    #[test]
    fn test_partial_reports_update_known_bulbs() {
        let mut harness = Harness::new();
        let now = harness.start;
        harness.receive(&light_status(1, "desk"), now);

        let target = Target::Device(device(1));
        harness.receive(&report(target, Payload::PowerState(PowerState::On)), now);
        harness.receive(&report(target, Payload::BulbLabel("reading".into())), now);
        harness.receive(&report(target, Payload::Tags(0b1)), now);
        harness.receive(
            &report(
                Target::All,
                Payload::TagLabels {
                    tags: 0b1,
                    label: "evening".into(),
                },
            ),
            now,
        );

        let summary = harness.registry.summary(&device(1)).unwrap();
        assert_eq!(summary.power, PowerState::On);
        assert_eq!(summary.label, "reading");
        assert_eq!(summary.tags, vec!["evening"]);

        // Reports for bulbs never seen in full are not invented.
        harness.receive(
            &report(Target::Device(device(9)), Payload::PowerState(PowerState::On)),
            now,
        );
        assert_eq!(harness.registry.len(), 1);
    }

    #[test]
    fn test_client_packets_are_ignored() {
        let mut harness = Harness::new();
        let probe = report(Target::All, Payload::GetPanGateway);
        assert!(!harness.receive(&probe, harness.start));
        assert_eq!(harness.registry.gateway_count(), 0);
    }

    #[test]
    fn test_probe_refreshes_known_gateways() {
        let mut harness = Harness::new();
        harness.receive(&light_status(1, "desk"), harness.start);
        harness.transport.clear();

        harness.timer(harness.start + config().probe_interval);

        let sent = harness.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, gateway());
        assert_eq!(sent[1].1.payload, Payload::GetLightState);
        assert_eq!(harness.discovery.cycles(), 1);
    }

    #[test]
    fn test_sweep_evicts_silent_gateway() {
        let mut harness = Harness::new();
        harness.receive(&light_status(1, "desk"), harness.start);

        let mut now = harness.start;
        let mut evicted = 0;
        while now <= harness.start + config().stale_timeout + config().sweep_interval {
            evicted += harness.timer(now);
            now = harness.discovery.next_deadline().unwrap();
        }

        assert_eq!(evicted, 2);
        assert!(harness.registry.find(&Selector::All).is_empty());
        assert_eq!(harness.registry.gateway_count(), 0);
    }

    #[test]
    fn test_unsolicited_reports_keep_bulbs_alive() {
        // The gateway never answers a probe but keeps pushing bulb state.
        let mut harness = Harness::new();
        let end = harness.start + config().stale_timeout * 3;
        let mut now = harness.start;
        let mut evicted = 0;
        while now <= end {
            harness.receive(&light_status(1, "desk"), now);
            let next_report = now + config().probe_interval * 2;
            while let Some(due) = harness.discovery.next_deadline() {
                if due > next_report {
                    break;
                }
                evicted += harness.timer(due);
            }
            now = next_report;
        }

        assert_eq!(evicted, 0);
        assert!(harness.discovery.cycles() > 10);
        assert_eq!(harness.registry.gateway_count(), 1);
        assert_eq!(harness.registry.len(), 1);
        assert_eq!(harness.registry.summary(&device(1)).unwrap().label, "desk");
    }

    #[test]
    fn test_stop() {
        let mut harness = Harness::new();
        harness.timer(harness.start);
        harness.receive(&light_status(1, "desk"), harness.start);
        harness.discovery.stop();
        harness.transport.clear();
        assert_eq!(harness.discovery.state(), DiscoveryState::Idle);
        assert_eq!(harness.discovery.next_deadline(), None);

        // Neither timer fires, however late it is.
        let later = harness.start + config().stale_timeout * 2;
        assert_eq!(harness.timer(later), 0);
        assert_eq!(harness.discovery.state(), DiscoveryState::Idle);
        assert_eq!(harness.discovery.cycles(), 1);
        assert_eq!(harness.registry.len(), 1);

        // A new gateway is recorded but not queried.
        let other = SocketAddr::from(([192, 168, 1, 21], 56700));
        let mut outbound = Outbound::new(&harness.transport, &mut harness.history);
        let report = light_status(2, "shelf");
        harness
            .discovery
            .on_packet(&report, other, &mut harness.registry, &mut outbound, later);
        assert_eq!(harness.registry.gateway_count(), 2);
        assert!(harness.transport.sent().is_empty());
    }
}
