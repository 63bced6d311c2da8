//! Power state of a bulb.

use serde::{Deserialize, Serialize};

/// Power state for a light.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// The light is off
    #[default]
    Off,
    /// The light is on
    On,
}

impl PowerState {
    const WIRE_ON: u16 = 0xffff;

    /// Decode the on-wire level; any non-zero level means on.
    ///
    /// # Examples
    ///
    /// ```
    /// use lightsd_rs::PowerState;
    ///
    /// assert_eq!(PowerState::from_wire(0), PowerState::Off);
    /// assert_eq!(PowerState::from_wire(0xffff), PowerState::On);
    /// assert_eq!(PowerState::from_wire(1), PowerState::On);
    /// ```
    pub fn from_wire(level: u16) -> Self {
        if level == 0 {
            PowerState::Off
        } else {
            PowerState::On
        }
    }

    pub fn to_wire(self) -> u16 {
        match self {
            PowerState::Off => 0,
            PowerState::On => Self::WIRE_ON,
        }
    }

    pub fn is_on(self) -> bool {
        self == PowerState::On
    }

    pub fn toggled(self) -> Self {
        match self {
            PowerState::Off => PowerState::On,
            PowerState::On => PowerState::Off,
        }
    }
}
