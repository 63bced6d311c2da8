//! Value types for devices and light control parameters.

mod address;
mod hsbk;
mod kelvin;
mod power;
mod waveform;

pub use address::{ADDR_LENGTH, DeviceId, SiteId};
pub(crate) use address::looks_like_address;
pub use hsbk::Hsbk;
pub use kelvin::Kelvin;
pub use power::PowerState;
pub use waveform::Waveform;
