//! In-memory registry of gateways and bulbs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use crate::errors::Error;
use crate::selector::Selector;
use crate::types::{DeviceId, Hsbk, PowerState, SiteId};
use crate::wire::LightStatus;

type Result<T> = std::result::Result<T, Error>;

/// Number of tag slots a site offers.
pub const TAG_SLOTS: u8 = 64;

/// A network-addressable bridge fronting one or more bulbs.
#[derive(Debug, Clone)]
pub struct Gateway {
    addr: SocketAddr,
    site: SiteId,
    last_seen: Instant,
    bulbs: BTreeSet<DeviceId>,
    tag_labels: BTreeMap<u8, String>,
}

impl Gateway {
    fn new(addr: SocketAddr, site: SiteId, now: Instant) -> Self {
        Gateway {
            addr,
            site,
            last_seen: now,
            bulbs: BTreeSet::new(),
            tag_labels: BTreeMap::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn site(&self) -> SiteId {
        self.site
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Ids of the bulbs this gateway reports for.
    pub fn bulbs(&self) -> impl Iterator<Item = &DeviceId> {
        self.bulbs.iter()
    }

    /// The slot holding `label`, if the site defines it.
    pub fn tag_id(&self, label: &str) -> Option<u8> {
        self.tag_labels
            .iter()
            .find(|(_, known)| known.as_str() == label)
            .map(|(id, _)| *id)
    }

    pub fn tag_label(&self, id: u8) -> Option<&str> {
        self.tag_labels.get(&id).map(String::as_str)
    }

    /// Labels of the tags set in `mask`, in slot order.
    pub fn tag_names(&self, mask: u64) -> Vec<String> {
        self.tag_labels
            .iter()
            .filter(|(id, _)| mask & (1u64 << **id) != 0)
            .map(|(_, label)| label.clone())
            .collect()
    }
}

/// Last known state of a bulb.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulbState {
    pub color: Hsbk,
    pub dim: i16,
    pub power: PowerState,
    pub label: String,
    /// Bitmask over the owning gateway's tag slots
    pub tags: u64,
}

impl From<&LightStatus> for BulbState {
    fn from(status: &LightStatus) -> Self {
        BulbState {
            color: status.color,
            dim: status.dim,
            power: status.power,
            label: status.label.clone(),
            tags: status.tags,
        }
    }
}

/// One controllable light.
#[derive(Debug, Clone)]
pub struct Bulb {
    id: DeviceId,
    gateway: SocketAddr,
    state: BulbState,
    last_seen: Instant,
}

impl Bulb {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Lookup key of the owning gateway.
    pub fn gateway(&self) -> SocketAddr {
        self.gateway
    }

    pub fn state(&self) -> &BulbState {
        &self.state
    }

    pub fn label(&self) -> &str {
        &self.state.label
    }

    pub fn power(&self) -> PowerState {
        self.state.power
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn has_tag_bit(&self, id: u8) -> bool {
        self.state.tags & (1u64 << id) != 0
    }
}

/// Read-only view of a bulb handed to clients.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BulbSummary {
    pub id: DeviceId,
    pub label: String,
    pub power: PowerState,
    /// Hue in degrees, saturation, brightness and kelvin
    pub hsbk: (f32, f32, f32, u16),
    pub tags: Vec<String>,
    pub gateway: SocketAddr,
    pub site: Option<SiteId>,
}

/// Owner of every gateway and bulb record.
///
/// Records are only ever created, refreshed and deleted through these
/// methods; everything else holds ids or short-lived borrows.
///
/// # Example
///
/// ```
/// use std::net::SocketAddr;
/// use std::time::{Duration, Instant};
/// use lightsd_rs::{BulbState, DeviceId, Registry, SiteId};
///
/// let mut registry = Registry::new();
/// let now = Instant::now();
/// let gateway: SocketAddr = "192.168.1.20:56700".parse().unwrap();
///
/// registry.upsert_gateway(gateway, SiteId::default(), now);
/// let id = DeviceId::new([0xd0, 0x73, 0xd5, 0, 0, 1]);
/// registry.upsert_bulb(gateway, id, BulbState::default(), now).unwrap();
/// assert_eq!(registry.len(), 1);
///
/// let evicted = registry.evict_stale(now + Duration::from_secs(60), Duration::from_secs(20));
/// assert_eq!(evicted, 2);
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    gateways: HashMap<SocketAddr, Gateway>,
    bulbs: BTreeMap<DeviceId, Bulb>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh the gateway at `addr`.
    pub fn upsert_gateway(&mut self, addr: SocketAddr, site: SiteId, now: Instant) -> &Gateway {
        let gateway = self.gateways.entry(addr).or_insert_with(|| {
            info!("found gateway {addr} (site {site})");
            Gateway::new(addr, site, now)
        });
        if gateway.site != site {
            debug!("gateway {addr} moved from site {} to {site}", gateway.site);
            gateway.site = site;
        }
        gateway.last_seen = now;
        gateway
    }

    /// Insert or overwrite a bulb reported by `gateway`.
    ///
    /// A bulb reported by another gateway than before moves to it.
    pub fn upsert_bulb(
        &mut self,
        gateway: SocketAddr,
        id: DeviceId,
        state: BulbState,
        now: Instant,
    ) -> Result<&Bulb> {
        let Some(owner) = self.gateways.get_mut(&gateway) else {
            return Err(Error::UnknownGateway(gateway));
        };
        owner.bulbs.insert(id);

        let previous = self.bulbs.get(&id).map(|bulb| bulb.gateway);
        if let Some(old) = previous.filter(|old| *old != gateway) {
            debug!("bulb {id} moved from gateway {old} to {gateway}");
            if let Some(old_gateway) = self.gateways.get_mut(&old) {
                old_gateway.bulbs.remove(&id);
            }
        }
        if previous.is_none() {
            info!("found bulb {id} ({}) behind {gateway}", state.label);
        }

        let bulb = self.bulbs.entry(id).or_insert_with(|| Bulb {
            id,
            gateway,
            state: BulbState::default(),
            last_seen: now,
        });
        bulb.gateway = gateway;
        bulb.state = state;
        bulb.last_seen = now;
        Ok(bulb)
    }

    /// Apply a partial report to a known bulb and refresh it.
    ///
    /// Returns false if the bulb isn't registered.
    pub fn update_bulb(
        &mut self,
        id: &DeviceId,
        now: Instant,
        update: impl FnOnce(&mut BulbState),
    ) -> bool {
        let Some(bulb) = self.bulbs.get_mut(id) else {
            return false;
        };
        update(&mut bulb.state);
        bulb.last_seen = now;
        true
    }

    /// Refresh the last-seen watermark of a gateway.
    pub fn touch_gateway(&mut self, addr: &SocketAddr, now: Instant) -> bool {
        match self.gateways.get_mut(addr) {
            Some(gateway) => {
                gateway.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Bulbs matching `selector`, each once, ordered by id.
    pub fn find(&self, selector: &Selector) -> Vec<&Bulb> {
        crate::router::resolve(selector, self)
    }

    /// Drop every record older than `timeout`.
    ///
    /// Stale gateways take all of their bulbs with them; bulbs that stopped
    /// reporting are dropped on their own even if their gateway is alive.
    /// Returns the number of records removed, gateways and bulbs together.
    pub fn evict_stale(&mut self, now: Instant, timeout: Duration) -> usize {
        let is_stale = |last_seen: Instant| now.saturating_duration_since(last_seen) > timeout;

        let stale_gateways: Vec<SocketAddr> = self
            .gateways
            .values()
            .filter(|gateway| is_stale(gateway.last_seen))
            .map(|gateway| gateway.addr)
            .collect();
        for addr in &stale_gateways {
            info!("gateway {addr} timed out");
            self.gateways.remove(addr);
        }

        let gateways = &self.gateways;
        let before = self.bulbs.len();
        self.bulbs.retain(|id, bulb| {
            let keep = gateways.contains_key(&bulb.gateway) && !is_stale(bulb.last_seen);
            if !keep {
                info!("bulb {id} ({}) timed out", bulb.state.label);
            }
            keep
        });
        let evicted_bulbs = before - self.bulbs.len();

        if evicted_bulbs > 0 {
            let bulbs = &self.bulbs;
            for gateway in self.gateways.values_mut() {
                gateway.bulbs.retain(|id| bulbs.contains_key(id));
            }
        }

        stale_gateways.len() + evicted_bulbs
    }

    /// Find or claim the tag slot for `label` on a gateway.
    ///
    /// Returns the slot and whether it was newly claimed, or `None` when the
    /// gateway is unknown or all of its slots are taken.
    pub fn allocate_tag(&mut self, gateway: &SocketAddr, label: &str) -> Option<(u8, bool)> {
        let gateway = self.gateways.get_mut(gateway)?;
        if let Some(id) = gateway.tag_id(label) {
            return Some((id, false));
        }
        let id = (0..TAG_SLOTS).find(|id| !gateway.tag_labels.contains_key(id))?;
        gateway.tag_labels.insert(id, label.to_string());
        Some((id, true))
    }

    /// Forget the label of a tag slot.
    pub fn release_tag(&mut self, gateway: &SocketAddr, id: u8) {
        if let Some(gateway) = self.gateways.get_mut(gateway) {
            gateway.tag_labels.remove(&id);
        }
    }

    /// Apply a tag label report: every slot in `mask` gets `label`, an empty
    /// label clears the slots.
    pub fn set_tag_labels(&mut self, gateway: &SocketAddr, mask: u64, label: &str) -> bool {
        let Some(gateway) = self.gateways.get_mut(gateway) else {
            return false;
        };
        for id in (0..TAG_SLOTS).filter(|id| mask & (1u64 << id) != 0) {
            if label.is_empty() {
                gateway.tag_labels.remove(&id);
            } else {
                gateway.tag_labels.insert(id, label.to_string());
            }
        }
        true
    }

    pub fn gateway(&self, addr: &SocketAddr) -> Option<&Gateway> {
        self.gateways.get(addr)
    }

    pub fn gateways(&self) -> impl Iterator<Item = &Gateway> {
        self.gateways.values()
    }

    pub fn bulb(&self, id: &DeviceId) -> Option<&Bulb> {
        self.bulbs.get(id)
    }

    /// Every bulb, ordered by id.
    pub fn bulbs(&self) -> impl Iterator<Item = &Bulb> {
        self.bulbs.values()
    }

    /// Tag labels of a bulb, resolved through its gateway's tag table.
    pub fn tag_names(&self, bulb: &Bulb) -> Vec<String> {
        self.gateways
            .get(&bulb.gateway)
            .map(|gateway| gateway.tag_names(bulb.state.tags))
            .unwrap_or_default()
    }

    pub fn summary(&self, id: &DeviceId) -> Option<BulbSummary> {
        let bulb = self.bulbs.get(id)?;
        let color = &bulb.state.color;
        Some(BulbSummary {
            id: bulb.id,
            label: bulb.state.label.clone(),
            power: bulb.state.power,
            hsbk: (
                color.hue_degrees(),
                color.saturation_ratio(),
                color.brightness_ratio(),
                color.kelvin,
            ),
            tags: self.tag_names(bulb),
            gateway: bulb.gateway,
            site: self.gateways.get(&bulb.gateway).map(Gateway::site),
        })
    }

    /// Snapshot of every bulb, ordered by id.
    pub fn list_bulbs(&self) -> Vec<BulbSummary> {
        self.bulbs.keys().filter_map(|id| self.summary(id)).collect()
    }

    /// Number of bulbs.
    pub fn len(&self) -> usize {
        self.bulbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bulbs.is_empty()
    }

    pub fn gateway_count(&self) -> usize {
        self.gateways.len()
    }
}
