//! Engine configuration.

use std::time::Duration;

/// Interval between position queries.
pub const DEFAULT_POSITION_INTERVAL: Duration = Duration::from_millis(2500);

/// Interval between temperature queries.
pub const DEFAULT_TEMPERATURE_INTERVAL: Duration = Duration::from_millis(3000);

/// Delay before re-requesting mesh info while the grid size is unknown.
pub const DEFAULT_MESH_RETRY_INTERVAL: Duration = Duration::from_millis(2000);

/// Interval between serial port scans.
pub const DEFAULT_PORT_SCAN_INTERVAL: Duration = Duration::from_millis(4000);

/// Number of busy reports shown as a full handshake.
pub const DEFAULT_HANDSHAKE_CEILING: u8 = 6;

/// Default jog distance in mm.
pub const DEFAULT_STEP: f64 = 0.025;

/// Baud rates offered for Marlin printers.
pub const AVAILABLE_BAUD_RATES: [u32; 7] = [2400, 9600, 19_200, 38_400, 57_600, 115_200, 250_000];

/// Default baud rate for Marlin printers.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Ports selected by default when present.
pub const DEFAULT_PREFERRED_PORTS: [&str; 2] =
    ["/dev/cu.usbserial-AI02LQH7", "/dev/cu.SLAB_USBtoUART"];

/// Capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Configuration for the leveling engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelerConfig {
    /// Interval between position queries.
    pub position_interval: Duration,
    /// Interval between temperature queries.
    pub temperature_interval: Duration,
    /// Delay between mesh info retries.
    pub mesh_retry_interval: Duration,
    /// Interval between serial port scans.
    pub port_scan_interval: Duration,
    /// Handshake counter ceiling (at least 1).
    pub handshake_ceiling: u8,
    /// Jog step used until `set_step_size` is called.
    pub default_step: f64,
    /// Accepted baud rates.
    pub baud_rates: Vec<u32>,
    /// Baud rate suggested to the user.
    pub default_baud: u32,
    /// Ports preferred by [`preferred_port`](Self::preferred_port), in order.
    pub preferred_ports: Vec<String>,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for LevelerConfig {
    fn default() -> Self {
        Self {
            position_interval: DEFAULT_POSITION_INTERVAL,
            temperature_interval: DEFAULT_TEMPERATURE_INTERVAL,
            mesh_retry_interval: DEFAULT_MESH_RETRY_INTERVAL,
            port_scan_interval: DEFAULT_PORT_SCAN_INTERVAL,
            handshake_ceiling: DEFAULT_HANDSHAKE_CEILING,
            default_step: DEFAULT_STEP,
            baud_rates: AVAILABLE_BAUD_RATES.to_vec(),
            default_baud: DEFAULT_BAUD_RATE,
            preferred_ports: DEFAULT_PREFERRED_PORTS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LevelerConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the position poll interval.
    #[must_use]
    pub const fn position_interval(mut self, interval: Duration) -> Self {
        self.position_interval = interval;
        self
    }

    /// Sets the temperature poll interval.
    #[must_use]
    pub const fn temperature_interval(mut self, interval: Duration) -> Self {
        self.temperature_interval = interval;
        self
    }

    /// Sets the mesh info retry interval.
    #[must_use]
    pub const fn mesh_retry_interval(mut self, interval: Duration) -> Self {
        self.mesh_retry_interval = interval;
        self
    }

    /// Sets the serial port scan interval.
    #[must_use]
    pub const fn port_scan_interval(mut self, interval: Duration) -> Self {
        self.port_scan_interval = interval;
        self
    }

    /// Sets the handshake ceiling. Zero is raised to one.
    #[must_use]
    pub const fn handshake_ceiling(mut self, ceiling: u8) -> Self {
        self.handshake_ceiling = if ceiling == 0 { 1 } else { ceiling };
        self
    }

    /// Sets the initial jog step. Non-positive values are ignored.
    #[must_use]
    pub fn default_step(mut self, step: f64) -> Self {
        if step.is_finite() && step > 0.0 {
            self.default_step = step;
        }
        self
    }

    /// Replaces the accepted baud rates.
    #[must_use]
    pub fn baud_rates(mut self, rates: impl IntoIterator<Item = u32>) -> Self {
        self.baud_rates = rates.into_iter().collect();
        self
    }

    /// Sets the suggested baud rate.
    #[must_use]
    pub const fn default_baud(mut self, baud: u32) -> Self {
        self.default_baud = baud;
        self
    }

    /// Replaces the preferred port list.
    #[must_use]
    pub fn preferred_ports<S: Into<String>>(mut self, ports: impl IntoIterator<Item = S>) -> Self {
        self.preferred_ports = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Returns true if `baud` is one of the accepted rates.
    #[must_use]
    pub fn supports_baud(&self, baud: u32) -> bool {
        self.baud_rates.contains(&baud)
    }

    /// Picks a port from `available`.
    ///
    /// If several preferred ports are present, the one listed last in
    /// `available` wins. Without a match, the first available port is used.
    #[must_use]
    pub fn preferred_port<'a>(&self, available: &'a [String]) -> Option<&'a str> {
        available
            .iter()
            .rfind(|port| self.preferred_ports.contains(*port))
            .or_else(|| available.first())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LevelerConfig::new();
        assert_eq!(config.position_interval, Duration::from_millis(2500));
        assert_eq!(config.temperature_interval, Duration::from_millis(3000));
        assert_eq!(config.mesh_retry_interval, Duration::from_millis(2000));
        assert_eq!(config.port_scan_interval, Duration::from_millis(4000));
        assert_eq!(config.handshake_ceiling, 6);
        assert!((config.default_step - 0.025).abs() < f64::EPSILON);
        assert_eq!(config.default_baud, 115_200);
        assert!(config.supports_baud(250_000));
        assert!(!config.supports_baud(14_400));
    }

    #[test]
    fn test_builder() {
        let config = LevelerConfig::new()
            .position_interval(Duration::from_secs(1))
            .handshake_ceiling(0)
            .default_step(-1.0)
            .baud_rates([9600])
            .default_baud(9600);
        assert_eq!(config.position_interval, Duration::from_secs(1));
        assert_eq!(config.handshake_ceiling, 1);
        assert!((config.default_step - DEFAULT_STEP).abs() < f64::EPSILON);
        assert!(config.supports_baud(9600));
        assert!(!config.supports_baud(115_200));
    }

    #[test]
    fn test_preferred_port() {
        let config = LevelerConfig::new();
        let ports = vec![
            "/dev/cu.Bluetooth-Incoming-Port".to_string(),
            "/dev/cu.SLAB_USBtoUART".to_string(),
        ];
        assert_eq!(config.preferred_port(&ports), Some("/dev/cu.SLAB_USBtoUART"));

        let ports = vec!["/dev/ttyUSB0".to_string(), "/dev/ttyACM0".to_string()];
        assert_eq!(config.preferred_port(&ports), Some("/dev/ttyUSB0"));

        assert_eq!(config.preferred_port(&[]), None);
    }
}
