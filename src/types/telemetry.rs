//! Last-known printer telemetry.

/// Most recent position and temperature readings.
///
/// Fields are updated independently as reports arrive and may be stale
/// relative to each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    /// X position as reported.
    pub x: Option<String>,
    /// Y position as reported.
    pub y: Option<String>,
    /// Z position as reported.
    pub z: Option<String>,
    /// Bed temperature in °C.
    pub bed: Option<f64>,
}

impl Telemetry {
    /// Creates an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            x: None,
            y: None,
            z: None,
            bed: None,
        }
    }

    /// Records a position report.
    pub fn set_position(&mut self, x: &str, y: &str, z: &str) {
        self.x = Some(x.to_owned());
        self.y = Some(y.to_owned());
        self.z = Some(z.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_update_independently() {
        let mut telemetry = Telemetry::new();
        telemetry.bed = Some(59.8);
        assert_eq!(telemetry.x, None);

        telemetry.set_position("10.00", "20.00", "0.30");
        assert_eq!(telemetry.z.as_deref(), Some("0.30"));
        assert_eq!(telemetry.bed, Some(59.8));
    }
}
