//! Color temperature control.

use serde::{Deserialize, Serialize};

/// Color temperature in Kelvin, with valid values from 2500K to 9000K.
///
/// Lower values produce warmer (more yellow/orange) light, while higher
/// values produce cooler (more blue) light. Typical values:
/// - 2700K: Warm white (incandescent-like)
/// - 4000K: Neutral white
/// - 6500K: Daylight
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Kelvin {
    pub(crate) kelvin: u16,
}

impl Default for Kelvin {
    fn default() -> Self {
        Self::new()
    }
}

impl Kelvin {
    pub const MIN: u16 = 2500;
    pub const MAX: u16 = 9000;
    const NEUTRAL: u16 = 3500;

    /// Create a new Kelvin with the default value (3500K).
    ///
    /// # Examples
    ///
    /// ```
    /// use lightsd_rs::Kelvin;
    ///
    /// assert_eq!(Kelvin::new().kelvin(), 3500);
    /// ```
    pub fn new() -> Self {
        Kelvin {
            kelvin: Self::NEUTRAL,
        }
    }

    /// Get the kelvin value.
    pub fn kelvin(&self) -> u16 {
        self.kelvin
    }

    /// Create a new Kelvin with the given value.
    ///
    /// Returns `None` if value is outside the valid range (2500-9000).
    ///
    /// # Examples
    ///
    /// ```
    /// use lightsd_rs::Kelvin;
    ///
    /// assert!(Kelvin::create(2499).is_none());
    /// assert!(Kelvin::create(2500).is_some());
    /// assert!(Kelvin::create(9000).is_some());
    /// assert!(Kelvin::create(9001).is_none());
    /// ```
    pub fn create(kelvin: u16) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&kelvin) {
            Some(Kelvin { kelvin })
        } else {
            None
        }
    }
}
