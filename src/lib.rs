//! # lightsd_rs
//!
//! The device side of a LIFX smart-bulb daemon: it discovers first generation
//! LIFX bulbs on the local network, keeps a live registry of their state and
//! routes commands to the bulbs a selector expression names.
//!
//! Everything runs inside one cooperative event loop ([`Daemon::run`]) that
//! never blocks on a device and needs no locks. Other tasks talk to it through
//! a cloneable [`Client`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use lightsd_rs::{Action, Daemon, DaemonConfig, Hsbk};
//!
//! # async fn example() -> Result<(), lightsd_rs::Error> {
//! let daemon = Daemon::bind(DaemonConfig::default()).await?;
//! let client = daemon.client();
//!
//! let (result, ()) = futures::join!(daemon.run(), async {
//!     let red = Hsbk::create(0.0, 1.0, 1.0, 3500).unwrap();
//!     let action = Action::SetColor { color: red, transition_ms: 500 };
//!     if let Ok(report) = client.execute("#living room, desk", action).await {
//!         println!("{}/{} bulbs", report.succeeded(), report.total());
//!     }
//!     let _ = client.shutdown();
//! });
//! result
//! # }
//! ```
//!
//! ## Selectors
//!
//! | Selector        | Targets                                   |
//! |-----------------|-------------------------------------------|
//! | `*`             | every bulb                                |
//! | `#evening`      | bulbs tagged `evening`                    |
//! | `@kitchen`      | bulbs whose label starts with `kitchen`   |
//! | `d073d501a0d5`  | the bulb with that device address         |
//! | `desk lamp`     | bulbs labeled exactly `desk lamp`         |
//!
//! Atoms combine with commas, `kitchen,#evening` targets the union.
//!
//! ## Building blocks
//!
//! The daemon is assembled from parts that are usable on their own:
//!
//! - [`wire`]: the binary packet codec
//! - [`Registry`]: gateways and bulbs with their last known state
//! - [`Discovery`]: probe and eviction timers feeding the registry
//! - [`Selector`] and [`router`]: selector parsing and resolution
//! - [`Dispatcher`]: per-target fan-out and query correlation
//! - [`Engine`]: all of the above behind a sans-IO interface
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! lightsd-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! lightsd-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! lightsd-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade: per-packet
//! traffic at `debug`, discovery and eviction at `info`, send failures at
//! `warn`. Install any logger to see it.

mod config;
mod daemon;
mod discovery;
mod dispatch;
mod engine;
mod errors;
mod history;
mod registry;
pub mod router;
pub mod runtime;
mod selector;
mod transport;
mod types;
pub mod wire;

// Re-export public API
pub use config::DaemonConfig;
pub use daemon::{Client, Daemon};
pub use discovery::{DISCOVERY_SEQUENCE, Discovery, DiscoveryState};
pub use dispatch::{Action, Completed, Dispatched, Dispatcher, Outcome, QueryId, Report, Status};
pub use engine::{Diagnostics, Engine};
pub use errors::Error;
pub use history::{Direction, HistoryEntry, HistorySummary, PacketHistory};
pub use registry::{Bulb, BulbState, BulbSummary, Gateway, Registry, TAG_SLOTS};
pub use selector::{ParseError, Selector};
pub use transport::{Outbound, Transport};
pub use types::{ADDR_LENGTH, DeviceId, Hsbk, Kelvin, PowerState, SiteId, Waveform};
