//! Fan-out of actions to bulbs and correlation of query replies.
//!
//! Commands are fire-and-forget: a target counts as [`Status::Success`] as
//! soon as its datagram is sent. Queries wait for each target's
//! `LightStatus`, matched on the replying device and the sequence number of
//! the request, until the query deadline turns the missing ones into
//! [`Status::NoReply`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::registry::{BulbSummary, Registry};
use crate::transport::Outbound;
use crate::types::{DeviceId, Hsbk, PowerState};
use crate::wire::{Header, Packet, Payload, Target, WaveformParams};

/// Handle of an in-flight query.
pub type QueryId = Uuid;

/// What to do to every bulb a selector matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PowerOn,
    PowerOff,
    /// Invert the last known power state of each bulb
    PowerToggle,
    SetColor { color: Hsbk, transition_ms: u32 },
    SetWaveform(WaveformParams),
    SetLabel(String),
    /// Add the bulbs to a tag, claiming a tag slot if needed
    Tag(String),
    /// Remove the bulbs from a tag, releasing the slot once unused
    Untag(String),
    /// Ask each bulb for its state and wait for the answers
    GetLightState,
}

impl Action {
    pub fn is_query(&self) -> bool {
        matches!(self, Action::GetLightState)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::PowerOn => "power_on",
            Action::PowerOff => "power_off",
            Action::PowerToggle => "power_toggle",
            Action::SetColor { .. } => "set_color",
            Action::SetWaveform(_) => "set_waveform",
            Action::SetLabel(_) => "set_label",
            Action::Tag(_) => "tag",
            Action::Untag(_) => "untag",
            Action::GetLightState => "get_light_state",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failed,
    NoReply,
}

/// Result for one target.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub target: DeviceId,
    pub status: Status,
    /// Reported state, for answered queries
    pub state: Option<BulbSummary>,
}

impl Outcome {
    fn new(target: DeviceId, status: Status) -> Self {
        Outcome {
            target,
            status,
            state: None,
        }
    }
}

/// Per-target outcomes of one action, ordered by device id.
///
/// ```
/// use lightsd_rs::Report;
///
/// let report = Report::default();
/// assert_eq!(report.total(), 0);
/// assert!(!report.is_partial_failure());
/// assert_eq!(serde_json::to_string(&report).unwrap(), r#"{"outcomes":[]}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub outcomes: Vec<Outcome>,
}

impl Report {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Report { outcomes }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == Status::Success)
            .count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Targets that failed or never replied.
    pub fn failed_targets(&self) -> Vec<DeviceId> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status != Status::Success)
            .map(|outcome| outcome.target)
            .collect()
    }

    /// Whether some, but not all, targets succeeded.
    pub fn is_partial_failure(&self) -> bool {
        let succeeded = self.succeeded();
        succeeded > 0 && succeeded < self.total()
    }

    pub fn is_success(&self) -> bool {
        self.succeeded() == self.total()
    }

    pub fn outcome(&self, target: &DeviceId) -> Option<&Outcome> {
        self.outcomes.iter().find(|outcome| outcome.target == *target)
    }
}

/// Immediate result of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Complete(Report),
    /// A query is waiting for replies; it finishes through
    /// [`Dispatcher::on_reply`] or [`Dispatcher::expire`].
    Pending(QueryId),
}

/// A query that finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    pub id: QueryId,
    pub report: Report,
}

#[derive(Debug)]
struct PendingQuery {
    deadline: Instant,
    sequence: u8,
    outcomes: Vec<Outcome>,
    remaining: usize,
}

impl PendingQuery {
    fn into_completed(self, id: QueryId) -> Completed {
        Completed {
            id,
            report: Report::new(self.outcomes),
        }
    }
}

/// Builds and sends per-target packets, and tracks pending queries.
#[derive(Debug)]
pub struct Dispatcher {
    query_timeout: Duration,
    sequence: u8,
    queries: HashMap<QueryId, PendingQuery>,
    correlations: HashMap<(DeviceId, u8), (QueryId, usize)>,
}

impl Dispatcher {
    pub fn new(query_timeout: Duration) -> Self {
        Dispatcher {
            query_timeout,
            sequence: 0,
            queries: HashMap::new(),
            correlations: HashMap::new(),
        }
    }

    /// Send `action` to every target.
    ///
    /// `targets` should be resolved from the same registry, each id once.
    pub fn dispatch(
        &mut self,
        action: &Action,
        targets: &[DeviceId],
        registry: &mut Registry,
        outbound: &mut Outbound<'_>,
        now: Instant,
    ) -> Dispatched {
        let sequence = self.next_sequence();
        debug!(
            "dispatching {} to {} bulb(s), seq={sequence}",
            action.name(),
            targets.len()
        );

        let report = match action {
            Action::GetLightState => return self.query(targets, registry, outbound, sequence, now),
            Action::Tag(label) => tag(label, targets, registry, outbound, sequence),
            Action::Untag(label) => untag(label, targets, registry, outbound, sequence),
            command => Report::new(
                targets
                    .iter()
                    .map(|id| {
                        let status = match command_payload(command, registry, id) {
                            Some(payload) => {
                                send_to_bulb(registry, id, payload, sequence, outbound)
                            }
                            None => Status::Failed,
                        };
                        Outcome::new(*id, status)
                    })
                    .collect(),
            ),
        };
        Dispatched::Complete(report)
    }

    fn query(
        &mut self,
        targets: &[DeviceId],
        registry: &Registry,
        outbound: &mut Outbound<'_>,
        sequence: u8,
        now: Instant,
    ) -> Dispatched {
        let id = Uuid::new_v4();
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut remaining = 0;

        for target in targets {
            let status = send_to_bulb(registry, target, Payload::GetLightState, sequence, outbound);
            if status == Status::Success {
                self.correlations
                    .insert((*target, sequence), (id, outcomes.len()));
                remaining += 1;
                outcomes.push(Outcome::new(*target, Status::NoReply));
            } else {
                outcomes.push(Outcome::new(*target, status));
            }
        }

        if remaining == 0 {
            return Dispatched::Complete(Report::new(outcomes));
        }
        self.queries.insert(
            id,
            PendingQuery {
                deadline: now + self.query_timeout,
                sequence,
                outcomes,
                remaining,
            },
        );
        Dispatched::Pending(id)
    }

    /// Match a state report against pending queries.
    ///
    /// `registry` must already reflect the report. Returns the query if this
    /// was its last missing reply.
    pub fn on_reply(
        &mut self,
        device: DeviceId,
        sequence: u8,
        registry: &Registry,
    ) -> Option<Completed> {
        let (id, index) = self.correlations.remove(&(device, sequence))?;
        let query = self.queries.get_mut(&id)?;

        let outcome = &mut query.outcomes[index];
        if outcome.status != Status::NoReply {
            return None;
        }
        outcome.status = Status::Success;
        outcome.state = registry.summary(&device);
        query.remaining -= 1;
        debug!("query {id}: reply from {device}, {} left", query.remaining);

        if query.remaining > 0 {
            return None;
        }
        self.queries.remove(&id).map(|query| query.into_completed(id))
    }

    /// Finish every query whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<Completed> {
        let expired: Vec<QueryId> = self
            .queries
            .iter()
            .filter(|(_, query)| query.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut completed = Vec::with_capacity(expired.len());
        for id in expired {
            let Some(query) = self.queries.remove(&id) else {
                continue;
            };
            for outcome in query.outcomes.iter().filter(|o| o.status == Status::NoReply) {
                let key = (outcome.target, query.sequence);
                if self.correlations.get(&key).is_some_and(|(owner, _)| *owner == id) {
                    self.correlations.remove(&key);
                }
            }
            debug!("query {id} timed out with {} missing", query.remaining);
            completed.push(query.into_completed(id));
        }
        completed
    }

    /// Earliest deadline among pending queries.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queries.values().map(|query| query.deadline).min()
    }

    pub fn pending(&self) -> usize {
        self.queries.len()
    }

    /// Next sequence number; 0 is left to discovery.
    fn next_sequence(&mut self) -> u8 {
        self.sequence = match self.sequence.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.sequence
    }
}

fn command_payload(action: &Action, registry: &Registry, id: &DeviceId) -> Option<Payload> {
    let payload = match action {
        Action::PowerOn => Payload::SetPowerState(PowerState::On),
        Action::PowerOff => Payload::SetPowerState(PowerState::Off),
        Action::PowerToggle => Payload::SetPowerState(registry.bulb(id)?.power().toggled()),
        Action::SetColor {
            color,
            transition_ms,
        } => Payload::SetLightColor {
            stream: 0,
            color: *color,
            transition_ms: *transition_ms,
        },
        Action::SetWaveform(params) => Payload::SetWaveform(params.clone()),
        Action::SetLabel(label) => Payload::SetBulbLabel(label.clone()),
        Action::Tag(_) | Action::Untag(_) | Action::GetLightState => return None,
    };
    Some(payload)
}

/// Unicast `payload` to a bulb through its gateway.
fn send_to_bulb(
    registry: &Registry,
    id: &DeviceId,
    payload: Payload,
    sequence: u8,
    outbound: &mut Outbound<'_>,
) -> Status {
    let Some(gateway) = registry
        .bulb(id)
        .and_then(|bulb| registry.gateway(&bulb.gateway()))
    else {
        warn!("bulb {id} is no longer registered");
        return Status::Failed;
    };

    let mut header = Header::new(Target::Device(*id), gateway.site()).with_sequence(sequence);
    if !matches!(payload, Payload::GetLightState) {
        header = header.with_response();
    }
    if outbound.send(&Packet::new(header, payload), gateway.addr()) {
        Status::Success
    } else {
        Status::Failed
    }
}

/// Broadcast a tag slot's label to every bulb of a gateway's site.
fn send_tag_label(
    registry: &Registry,
    gateway: &SocketAddr,
    slot: u8,
    label: &str,
    sequence: u8,
    outbound: &mut Outbound<'_>,
) -> bool {
    let Some(gateway) = registry.gateway(gateway) else {
        return false;
    };
    let header = Header::new(Target::All, gateway.site()).with_sequence(sequence);
    let payload = Payload::SetTagLabels {
        tags: 1u64 << slot,
        label: label.to_string(),
    };
    outbound.send(&Packet::new(header, payload), gateway.addr())
}

fn by_gateway(targets: &[DeviceId], registry: &Registry) -> BTreeMap<SocketAddr, Vec<DeviceId>> {
    let mut groups: BTreeMap<SocketAddr, Vec<DeviceId>> = BTreeMap::new();
    for bulb in targets.iter().filter_map(|id| registry.bulb(id)) {
        groups.entry(bulb.gateway()).or_default().push(bulb.id());
    }
    groups
}

fn tag(
    label: &str,
    targets: &[DeviceId],
    registry: &mut Registry,
    outbound: &mut Outbound<'_>,
    sequence: u8,
) -> Report {
    let mut slots = HashMap::new();
    for gateway in by_gateway(targets, registry).into_keys() {
        let slot = match registry.allocate_tag(&gateway, label) {
            Some((slot, true)) => {
                if send_tag_label(registry, &gateway, slot, label, sequence, outbound) {
                    debug!("tag {label:?} claimed slot {slot} on {gateway}");
                    Some(slot)
                } else {
                    registry.release_tag(&gateway, slot);
                    None
                }
            }
            Some((slot, false)) => Some(slot),
            None => {
                warn!("no free tag slot for {label:?} on {gateway}");
                None
            }
        };
        slots.insert(gateway, slot);
    }

    let outcomes = targets
        .iter()
        .map(|id| {
            let Some(bulb) = registry.bulb(id) else {
                return Outcome::new(*id, Status::Failed);
            };
            let Some(&Some(slot)) = slots.get(&bulb.gateway()) else {
                return Outcome::new(*id, Status::Failed);
            };
            let tags = bulb.state().tags | (1u64 << slot);
            let status = send_to_bulb(registry, id, Payload::SetTags(tags), sequence, outbound);
            Outcome::new(*id, status)
        })
        .collect();
    Report::new(outcomes)
}

fn untag(
    label: &str,
    targets: &[DeviceId],
    registry: &mut Registry,
    outbound: &mut Outbound<'_>,
    sequence: u8,
) -> Report {
    let groups = by_gateway(targets, registry);
    let mut statuses = HashMap::new();
    let mut still_tagged = HashSet::new();

    for (gateway, members) in &groups {
        let Some(slot) = registry.gateway(gateway).and_then(|g| g.tag_id(label)) else {
            // Nothing on this gateway carries the tag.
            statuses.extend(members.iter().map(|id| (*id, Status::Success)));
            continue;
        };

        for id in members {
            let Some(bulb) = registry.bulb(id).filter(|bulb| bulb.has_tag_bit(slot)) else {
                statuses.insert(*id, Status::Success);
                continue;
            };
            let tags = bulb.state().tags & !(1u64 << slot);
            let status = send_to_bulb(registry, id, Payload::SetTags(tags), sequence, outbound);
            if status != Status::Success {
                still_tagged.insert(*gateway);
            }
            statuses.insert(*id, status);
        }

        let in_use = registry.bulbs().any(|bulb| {
            bulb.gateway() == *gateway && bulb.has_tag_bit(slot) && !members.contains(&bulb.id())
        });
        if in_use || still_tagged.contains(gateway) {
            continue;
        }
        if send_tag_label(registry, gateway, slot, "", sequence, outbound) {
            debug!("tag {label:?} released slot {slot} on {gateway}");
            registry.release_tag(gateway, slot);
        }
    }

    let outcomes = targets
        .iter()
        .map(|id| Outcome::new(*id, statuses.get(id).copied().unwrap_or(Status::Failed)))
        .collect();
    Report::new(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::PacketHistory;
    use crate::registry::BulbState;
    use crate::transport::mock::MockTransport;
    use crate::types::SiteId;

    const SITE: SiteId = SiteId::new([0x4c, 0x49, 0x46, 0x58, 0x56, 0x32]);

    fn gateway() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], 56700))
    }

    fn device(last: u8) -> DeviceId {
        DeviceId::new([0xd0, 0x73, 0xd5, 0, 0, last])
    }

    /// One gateway with bulbs 1..=count.
    fn registry(count: u8) -> Registry {
        let mut registry = Registry::new();
        let now = Instant::now();
        registry.upsert_gateway(gateway(), SITE, now);
        for last in 1..=count {
            let state = BulbState {
                label: format!("bulb {last}"),
                ..BulbState::default()
            };
            registry.upsert_bulb(gateway(), device(last), state, now).unwrap();
        }
        registry
    }

    fn ids(registry: &Registry) -> Vec<DeviceId> {
        registry.bulbs().map(|bulb| bulb.id()).collect()
    }

    fn run(
        dispatcher: &mut Dispatcher,
        action: Action,
        registry: &mut Registry,
        transport: &MockTransport,
        now: Instant,
    ) -> Dispatched {
        let mut history = PacketHistory::new();
        let targets = ids(registry);
        let mut outbound = Outbound::new(transport, &mut history);
        dispatcher.dispatch(&action, &targets, registry, &mut outbound, now)
    }

    fn complete(dispatched: Dispatched) -> Report {
        match dispatched {
            Dispatched::Complete(report) => report,
            Dispatched::Pending(id) => panic!("query {id} still pending"),
        }
    }

    #[test]
    fn test_power_on_fans_out() {
        let mut registry = registry(2);
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));

        let report = complete(run(
            &mut dispatcher,
            Action::PowerOn,
            &mut registry,
            &transport,
            Instant::now(),
        ));

        assert_eq!(report.succeeded(), 2);
        assert!(report.is_success());
        let sent = transport.sent_to(gateway());
        assert_eq!(sent.len(), 2);
        for (packet, last) in sent.iter().zip(1..) {
            assert_eq!(packet.header.target, Target::Device(device(last)));
            assert_eq!(packet.header.site, SITE);
            assert!(packet.header.res_required);
            assert_ne!(packet.header.sequence, 0);
            assert_eq!(packet.payload, Payload::SetPowerState(PowerState::On));
        }
    }

    #[test]
    fn test_toggle_inverts_known_power() {
        let mut registry = registry(2);
        registry.update_bulb(&device(1), Instant::now(), |state| {
            state.power = PowerState::On
        });
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));

        run(
            &mut dispatcher,
            Action::PowerToggle,
            &mut registry,
            &transport,
            Instant::now(),
        );

        let payloads: Vec<_> = transport
            .sent_to(gateway())
            .into_iter()
            .map(|packet| packet.payload)
            .collect();
        assert_eq!(
            payloads,
            vec![
                Payload::SetPowerState(PowerState::Off),
                Payload::SetPowerState(PowerState::On),
            ]
        );
    }

    #[test]
    fn test_failed_send_is_reported_per_target() {
        let mut registry = registry(2);
        let transport = MockTransport::new();
        transport.fail_for(gateway());
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));

        let report = complete(run(
            &mut dispatcher,
            Action::SetLabel("desk".to_string()),
            &mut registry,
            &transport,
            Instant::now(),
        ));

        assert_eq!(report.total(), 2);
        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.failed_targets(), vec![device(1), device(2)]);
        assert!(!report.is_partial_failure());
    }

    #[test]
    fn test_no_targets() {
        let mut registry = Registry::new();
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));

        let report = complete(run(
            &mut dispatcher,
            Action::GetLightState,
            &mut registry,
            &transport,
            Instant::now(),
        ));
        assert_eq!(report.total(), 0);
        assert!(transport.sent().is_empty());
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_query_with_one_silent_target() {
        let mut registry = registry(3);
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));
        let t0 = Instant::now();

        let Dispatched::Pending(id) = run(
            &mut dispatcher,
            Action::GetLightState,
            &mut registry,
            &transport,
            t0,
        ) else {
            panic!("query should be pending");
        };
        assert_eq!(dispatcher.next_deadline(), Some(t0 + Duration::from_secs(1)));

        let sequence = transport.sent()[0].1.header.sequence;
        for last in [1, 3] {
            let state = BulbState {
                label: format!("bulb {last}"),
                power: PowerState::On,
                ..BulbState::default()
            };
            registry.upsert_bulb(gateway(), device(last), state, t0).unwrap();
            assert!(dispatcher.on_reply(device(last), sequence, &registry).is_none());
        }

        assert!(dispatcher.expire(t0 + Duration::from_millis(999)).is_empty());
        let completed = dispatcher.expire(t0 + Duration::from_secs(1));
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, id);

        let report = &completed[0].report;
        assert_eq!(report.total(), 3);
        let no_reply: Vec<_> = report
            .outcomes
            .iter()
            .filter(|outcome| outcome.status == Status::NoReply)
            .collect();
        assert_eq!(no_reply.len(), 1);
        assert_eq!(no_reply[0].target, device(2));
        assert!(report.is_partial_failure());

        let answered = report.outcome(&device(1)).unwrap();
        assert_eq!(answered.status, Status::Success);
        assert_eq!(answered.state.as_ref().unwrap().power, PowerState::On);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_query_completes_on_last_reply() {
        let mut registry = registry(2);
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));

        let Dispatched::Pending(id) = run(
            &mut dispatcher,
            Action::GetLightState,
            &mut registry,
            &transport,
            Instant::now(),
        ) else {
            panic!("query should be pending");
        };
        let sequence = transport.sent()[0].1.header.sequence;

        // Wrong sequence numbers belong to someone else.
        assert!(dispatcher.on_reply(device(1), sequence.wrapping_add(1), &registry).is_none());
        assert!(dispatcher.on_reply(device(1), sequence, &registry).is_none());
        // A duplicate reply changes nothing.
        assert!(dispatcher.on_reply(device(1), sequence, &registry).is_none());

        let completed = dispatcher.on_reply(device(2), sequence, &registry).unwrap();
        assert_eq!(completed.id, id);
        assert!(completed.report.is_success());
        assert_eq!(dispatcher.next_deadline(), None);
    }

    #[test]
    fn test_sequence_skips_zero() {
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));
        dispatcher.sequence = 254;
        assert_eq!(dispatcher.next_sequence(), 255);
        assert_eq!(dispatcher.next_sequence(), 1);
    }

    #[test]
    fn test_tag_claims_slot_once() {
        let mut registry = registry(2);
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));
        let now = Instant::now();

        let report = complete(run(
            &mut dispatcher,
            Action::Tag("evening".to_string()),
            &mut registry,
            &transport,
            now,
        ));
        assert!(report.is_success());

        let sent = transport.sent_to(gateway());
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].header.target, Target::All);
        assert_eq!(
            sent[0].payload,
            Payload::SetTagLabels {
                tags: 1,
                label: "evening".to_string()
            }
        );
        assert_eq!(sent[1].payload, Payload::SetTags(1));
        assert_eq!(sent[2].payload, Payload::SetTags(1));
        assert_eq!(registry.gateway(&gateway()).unwrap().tag_id("evening"), Some(0));

        transport.clear();
        run(
            &mut dispatcher,
            Action::Tag("evening".to_string()),
            &mut registry,
            &transport,
            now,
        );
        assert!(
            transport
                .sent()
                .iter()
                .all(|(_, packet)| packet.payload == Payload::SetTags(1))
        );
    }

    #[test]
    fn test_tag_without_free_slot() {
        let mut registry = registry(1);
        for slot in 0..crate::registry::TAG_SLOTS {
            registry.allocate_tag(&gateway(), &format!("tag{slot}"));
        }
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));

        let report = complete(run(
            &mut dispatcher,
            Action::Tag("evening".to_string()),
            &mut registry,
            &transport,
            Instant::now(),
        ));
        assert_eq!(report.failed_targets(), vec![device(1)]);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_untag_releases_unused_slot() {
        let mut registry = registry(2);
        registry.set_tag_labels(&gateway(), 1 << 5, "evening");
        registry.update_bulb(&device(1), Instant::now(), |state| state.tags = 1 << 5);
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));

        let report = complete(run(
            &mut dispatcher,
            Action::Untag("evening".to_string()),
            &mut registry,
            &transport,
            Instant::now(),
        ));
        assert!(report.is_success());

        // Only the tagged bulb is touched, then the label is cleared.
        let sent = transport.sent_to(gateway());
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].header.target, Target::Device(device(1)));
        assert_eq!(sent[0].payload, Payload::SetTags(0));
        assert_eq!(
            sent[1].payload,
            Payload::SetTagLabels {
                tags: 1 << 5,
                label: String::new()
            }
        );
        assert_eq!(registry.gateway(&gateway()).unwrap().tag_id("evening"), None);
    }

    #[test]
    fn test_untag_keeps_slot_in_use() {
        let mut registry = registry(2);
        registry.set_tag_labels(&gateway(), 1 << 2, "evening");
        let now = Instant::now();
        registry.update_bulb(&device(1), now, |state| state.tags = 1 << 2);
        registry.update_bulb(&device(2), now, |state| state.tags = 1 << 2);
        let transport = MockTransport::new();
        let mut dispatcher = Dispatcher::new(Duration::from_secs(1));

        let mut history = PacketHistory::new();
        let mut outbound = Outbound::new(&transport, &mut history);
        let dispatched = dispatcher.dispatch(
            &Action::Untag("evening".to_string()),
            &[device(1)],
            &mut registry,
            &mut outbound,
            now,
        );

        assert!(complete(dispatched).is_success());
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(registry.gateway(&gateway()).unwrap().tag_id("evening"), Some(2));
    }

    #[test]
    fn test_report_serializes_without_empty_state() {
        let report = Report::new(vec![Outcome::new(device(1), Status::NoReply)]);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({"outcomes": [{"target": "d073d5000001", "status": "no_reply"}]})
        );
    }
}
