//! Waveform effects.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Periodic color effects a bulb can run between its current and a target color.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use lightsd_rs::Waveform;
///
/// assert_eq!(Waveform::from_str("HALF_SINE").unwrap(), Waveform::HalfSine);
/// assert_eq!(Waveform::Square.to_string(), "SQUARE");
/// assert_eq!(Waveform::create(1), Some(Waveform::Sine));
/// assert_eq!(Waveform::create(9), None);
/// ```
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Waveform {
    Saw = 0,
    Sine = 1,
    HalfSine = 2,
    Triangle = 3,
    Square = 4,
}

impl Waveform {
    pub fn create(value: u8) -> Option<Self> {
        Waveform::iter().find(|waveform| *waveform as u8 == value)
    }

    pub fn id(&self) -> u8 {
        *self as u8
    }
}
