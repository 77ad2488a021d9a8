//! Outbound G-code commands.
//!
//! Only the fixed command set needed for manual mesh leveling is modelled.
//! The [`Display`](std::fmt::Display) output is the exact line sent to the printer.

use std::fmt;

/// Commands sent to the printer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GCode {
    /// Store settings (including the mesh) in EEPROM (`M500`).
    SaveSettings,
    /// Disable stepper motors (`M84`).
    DisableMotors,
    /// Home all axes (`G28`).
    Home,
    /// Report current position (`M114`).
    ReportPosition,
    /// Report mesh grid size and Z search height (`G29 S0`).
    MeshInfo,
    /// Begin manual mesh probing (`G29 S1`).
    MeshStart,
    /// Store the current Z and move to the next mesh point (`G29 S2`).
    MeshNext,
    /// Move to an absolute Z height in mm (`G1 Z<z>`).
    MoveZ(f64),
    /// Set bed target temperature in °C (`M140 S<t>`).
    SetBedTemperature(f64),
    /// Report temperatures (`M105`).
    ReportTemperature,
}

impl GCode {
    /// Returns true for the periodic status queries.
    #[must_use]
    pub const fn is_query(&self) -> bool {
        matches!(
            self,
            Self::ReportPosition | Self::ReportTemperature | Self::MeshInfo
        )
    }
}

impl fmt::Display for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SaveSettings => f.write_str("M500"),
            Self::DisableMotors => f.write_str("M84"),
            Self::Home => f.write_str("G28"),
            Self::ReportPosition => f.write_str("M114"),
            Self::MeshInfo => f.write_str("G29 S0"),
            Self::MeshStart => f.write_str("G29 S1"),
            Self::MeshNext => f.write_str("G29 S2"),
            Self::MoveZ(z) => write!(f, "G1 Z{z}"),
            Self::SetBedTemperature(t) => write!(f, "M140 S{t}"),
            Self::ReportTemperature => f.write_str("M105"),
        }
    }
}
