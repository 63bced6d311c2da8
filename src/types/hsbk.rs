//! Hue, saturation, brightness and kelvin color representation.

use serde::{Deserialize, Serialize};

use super::Kelvin;

/// A bulb color as carried on the wire.
///
/// Hue, saturation and brightness are scaled to the full `u16` range:
/// - Hue: 0-360 degrees maps to 0-65535
/// - Saturation and brightness: 0.0-1.0 maps to 0-65535
///
/// The kelvin component only matters when saturation is low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsbk {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

impl Hsbk {
    /// Build a color from user-facing units.
    ///
    /// # Arguments
    ///
    /// * `hue` - Hue angle in degrees (0-360)
    /// * `saturation` - Saturation ratio (0.0-1.0)
    /// * `brightness` - Brightness ratio (0.0-1.0)
    /// * `kelvin` - Color temperature (2500-9000)
    ///
    /// Returns `None` if any value is outside its valid range.
    ///
    /// # Examples
    ///
    /// ```
    /// use lightsd_rs::Hsbk;
    ///
    /// let red = Hsbk::create(0.0, 1.0, 1.0, 3500).unwrap();
    /// assert_eq!(red.hue, 0);
    /// assert_eq!(red.saturation, u16::MAX);
    ///
    /// let cyan = Hsbk::create(180.0, 1.0, 0.5, 3500).unwrap();
    /// assert_eq!(cyan.hue, 32768);
    /// assert_eq!(cyan.brightness, 32768);
    ///
    /// assert!(Hsbk::create(361.0, 1.0, 1.0, 3500).is_none());
    /// assert!(Hsbk::create(0.0, 1.5, 1.0, 3500).is_none());
    /// assert!(Hsbk::create(0.0, 1.0, 1.0, 12000).is_none());
    /// ```
    pub fn create(hue: f32, saturation: f32, brightness: f32, kelvin: u16) -> Option<Self> {
        let ratio_ok = |v: f32| (0.0..=1.0).contains(&v);
        if !(0.0..=360.0).contains(&hue) || !ratio_ok(saturation) || !ratio_ok(brightness) {
            return None;
        }
        let kelvin = Kelvin::create(kelvin)?;

        Some(Hsbk {
            hue: scale(hue % 360.0 / 360.0),
            saturation: scale(saturation),
            brightness: scale(brightness),
            kelvin: kelvin.kelvin(),
        })
    }

    /// Hue in degrees (0-360).
    pub fn hue_degrees(&self) -> f32 {
        self.hue as f32 * 360.0 / u16::MAX as f32
    }

    /// Saturation as a ratio (0.0-1.0).
    pub fn saturation_ratio(&self) -> f32 {
        self.saturation as f32 / u16::MAX as f32
    }

    /// Brightness as a ratio (0.0-1.0).
    pub fn brightness_ratio(&self) -> f32 {
        self.brightness as f32 / u16::MAX as f32
    }
}

fn scale(ratio: f32) -> u16 {
    (ratio * u16::MAX as f32).round() as u16
}
