//! Resolution of selectors against the registry.

use std::collections::BTreeSet;

use crate::registry::{Bulb, Registry};
use crate::selector::Selector;
use crate::types::DeviceId;

/// Resolve a selector to the bulbs it currently matches.
///
/// Every matching bulb appears once, ordered by device id. An empty result
/// is a valid outcome, not an error.
pub fn resolve<'r>(selector: &Selector, registry: &'r Registry) -> Vec<&'r Bulb> {
    let mut matched = BTreeSet::new();
    collect(selector, registry, &mut matched);
    matched
        .iter()
        .filter_map(|id| registry.bulb(id))
        .collect()
}

/// Like [`resolve`], returning only the ids.
pub fn resolve_ids(selector: &Selector, registry: &Registry) -> Vec<DeviceId> {
    let mut matched = BTreeSet::new();
    collect(selector, registry, &mut matched);
    matched.into_iter().collect()
}

fn collect(selector: &Selector, registry: &Registry, matched: &mut BTreeSet<DeviceId>) {
    match selector {
        Selector::Union(atoms) => {
            for atom in atoms {
                collect(atom, registry, matched);
            }
        }
        Selector::Id(id) => {
            if registry.bulb(id).is_some() {
                matched.insert(*id);
            }
        }
        atom => matched.extend(
            registry
                .bulbs()
                .filter(|bulb| matches(atom, bulb, registry))
                .map(Bulb::id),
        ),
    }
}

fn matches(atom: &Selector, bulb: &Bulb, registry: &Registry) -> bool {
    match atom {
        Selector::All => true,
        Selector::Label(label) => bulb.label() == label,
        Selector::Group(prefix) => bulb.label().starts_with(prefix.as_str()),
        Selector::Id(id) => bulb.id() == *id,
        Selector::Tag(tag) => registry
            .gateway(&bulb.gateway())
            .and_then(|gateway| gateway.tag_id(tag))
            .is_some_and(|id| bulb.has_tag_bit(id)),
        Selector::Union(atoms) => atoms.iter().any(|atom| matches(atom, bulb, registry)),
    }
}
