//! Protocol definitions for Marlin serial communication.
//!
//! This module contains the low-level protocol types including:
//! - Line encoding/decoding
//! - Outbound G-code commands
//! - Response line classification

pub mod gcode;
pub mod line;
pub mod report;

pub use gcode::GCode;
pub use line::{LINE_TERMINATOR, LineDecoder, MAX_LINE_LENGTH, encode as encode_line};
pub use report::{RESPONSE_BUSY, RESPONSE_OK, Report, classify};
