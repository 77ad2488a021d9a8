//! Leveling session and handshake progress.

/// Progress through the mesh points plus the commanded Z height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelingSession {
    /// True between `start` and the advance past the last point.
    pub active: bool,
    /// Index of the current mesh point (0-based).
    pub point: u32,
    /// Z height reported by the mesh info query.
    pub start_z: f64,
    /// Z height last commanded with a jog.
    pub current_z: f64,
    /// Distance moved per jog in mm. Always positive.
    pub step: f64,
}

impl LevelingSession {
    /// Creates an idle session with the given jog step.
    #[must_use]
    pub const fn new(step: f64) -> Self {
        Self {
            active: false,
            point: 0,
            start_z: 0.0,
            current_z: 0.0,
            step,
        }
    }

    /// Discards progress and heights. The step size is kept.
    pub const fn reset(&mut self) {
        *self = Self::new(self.step);
    }
}

/// Busy/ok progress heuristic for the last command sent.
///
/// The counter is reset by every outbound command, climbs by one per busy
/// report and jumps to the ceiling on `ok`. It says nothing about which command
/// was acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeCounter {
    count: u8,
    max: u8,
}

impl HandshakeCounter {
    /// Creates a counter with the given ceiling. Zero is raised to one.
    #[must_use]
    pub const fn new(max: u8) -> Self {
        let max = if max == 0 { 1 } else { max };
        Self { count: 0, max }
    }

    /// A command was sent.
    pub const fn reset(&mut self) {
        self.count = 0;
    }

    /// A busy report arrived.
    pub const fn busy(&mut self) {
        if self.count < self.max {
            self.count += 1;
        }
    }

    /// An `ok` arrived.
    pub const fn complete(&mut self) {
        self.count = self.max;
    }

    /// Current count.
    #[must_use]
    pub const fn count(&self) -> u8 {
        self.count
    }

    /// Ceiling.
    #[must_use]
    pub const fn max(&self) -> u8 {
        self.max
    }

    /// Returns true when the counter sits at its ceiling.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.count == self.max
    }
}
