//! # bedlevel
//!
//! A Rust client library for manual mesh bed leveling on Marlin printers.
//!
//! This library drives a printer over USB/Serial through Marlin's manual
//! mesh procedure (`G29 S1` / `G29 S2`), jogging the nozzle between points
//! and keeping position and bed temperature up to date in the background.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Event-driven architecture for presentation layers
//! - Pure, I/O-free leveling state machine
//! - Busy/ok handshake tracking for "printer is working" feedback
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use bedlevel::{BedLeveler, Event, list_ports};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bedlevel::Error> {
//!     let mut leveler = BedLeveler::serial();
//!     let ports = list_ports()?;
//!     let port = leveler
//!         .config()
//!         .preferred_port(&ports)
//!         .unwrap_or("/dev/ttyUSB0")
//!         .to_owned();
//!
//!     let mut events = leveler.subscribe();
//!     leveler.connect(port, 115_200).await?;
//!
//!     // Wait for the printer to report its mesh size
//!     while let Some(event) = events.recv().await {
//!         if let Event::MeshGeometry { total_points, .. } = event {
//!             println!("mesh has {total_points} points");
//!             break;
//!         }
//!     }
//!
//!     leveler.home().await?;
//!     leveler.wait_until_idle(Duration::from_secs(60)).await;
//!     leveler.start().await?;
//!     // ... jog_down() until the paper drags, then advance() per point
//!
//!     leveler.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Line framing, outbound G-code and response classification
//! - [`types`] - Data structures (mesh geometry, session, telemetry)
//! - [`leveling`] - The leveling state machine
//! - [`transport`] - Transport implementations (currently USB/Serial)
//! - [`event`] - Async event system for presentation layers
//! - [`poll`] - Background position, temperature and mesh info polling
//! - [`config`] - Engine settings and defaults
//! - [`client`] - High-level [`BedLeveler`] engine

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod leveling;
pub mod poll;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::BedLeveler;
pub use config::LevelerConfig;
pub use error::{Error, LineError, Result};
pub use event::{Event, EventDispatcher, EventFilter, EventKind, Subscription};
pub use leveling::{Checkpoint, LevelingMachine, Phase};
pub use poll::{PollKind, PollScheduler};
pub use protocol::{GCode, Report, classify};
pub use transport::{
    SerialConfig, SerialTransport, Transport,
    serial::{PortStream, list_ports, watch_ports},
};
pub use types::{HandshakeCounter, LevelingSession, MeshGeometry, Telemetry};
