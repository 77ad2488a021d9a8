//! Data types for the leveling workflow.
//!
//! This module contains the core data structures used throughout the library:
//! - Mesh geometry
//! - Leveling session and handshake progress
//! - Telemetry snapshot

pub mod mesh;
pub mod session;
pub mod telemetry;

pub use mesh::MeshGeometry;
pub use session::{HandshakeCounter, LevelingSession};
pub use telemetry::Telemetry;
