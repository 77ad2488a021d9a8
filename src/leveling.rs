//! Leveling state machine.
//!
//! [`LevelingMachine`] holds all session state and does no I/O. Each command
//! validates the current phase, updates the state and returns the [`GCode`]
//! to transmit; incoming [`Report`]s are applied with [`LevelingMachine::apply`].
//! Events produced along the way are queued and collected with
//! [`LevelingMachine::drain_events`].
//!
//! ```text
//! Disconnected ─connect─▶ MeshUnknown ─Num X,Y─▶ MeshKnown ─start─▶ Leveling(0)
//!      ▲                                            ▲                  │ advance
//!      └──────────────── disconnect ────────────────┴── last point ◀───┘
//! ```

use crate::config::{DEFAULT_STEP, LevelerConfig};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::protocol::{GCode, Report};
use crate::types::{HandshakeCounter, LevelingSession, MeshGeometry, Telemetry};

/// Coarse state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No serial connection.
    Disconnected,
    /// Connected, waiting for the mesh grid size.
    MeshUnknown,
    /// Connected with a known mesh, not leveling.
    MeshKnown,
    /// Walking the mesh, currently at `point`.
    Leveling { point: u32 },
}

/// State saved by [`LevelingMachine::checkpoint`].
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    mesh: MeshGeometry,
    session: LevelingSession,
    handshake: HandshakeCounter,
    queued: usize,
}

/// State of one printer connection and its leveling session.
#[derive(Debug)]
pub struct LevelingMachine {
    connected: bool,
    mesh: MeshGeometry,
    session: LevelingSession,
    handshake: HandshakeCounter,
    telemetry: Telemetry,
    events: Vec<Event>,
}

impl LevelingMachine {
    /// Creates a disconnected machine.
    #[must_use]
    pub fn new(config: &LevelerConfig) -> Self {
        Self {
            connected: false,
            mesh: MeshGeometry::Unknown,
            session: LevelingSession::new(initial_step(config.default_step)),
            handshake: HandshakeCounter::new(config.handshake_ceiling),
            telemetry: Telemetry::new(),
            events: Vec::new(),
        }
    }

    // ==================== Snapshots ====================

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        if !self.connected {
            Phase::Disconnected
        } else if self.session.active {
            Phase::Leveling {
                point: self.session.point,
            }
        } else if self.mesh.is_known() {
            Phase::MeshKnown
        } else {
            Phase::MeshUnknown
        }
    }

    /// Returns true while the serial link is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns the mesh geometry.
    #[must_use]
    pub const fn mesh(&self) -> MeshGeometry {
        self.mesh
    }

    /// Returns the leveling session.
    #[must_use]
    pub const fn session(&self) -> LevelingSession {
        self.session
    }

    /// Returns the handshake counter.
    #[must_use]
    pub const fn handshake(&self) -> HandshakeCounter {
        self.handshake
    }

    /// Returns the telemetry snapshot.
    #[must_use]
    pub const fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Takes the events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Saves the command-mutable state.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            mesh: self.mesh,
            session: self.session,
            handshake: self.handshake,
            queued: self.events.len(),
        }
    }

    /// Undoes a command whose G-code never reached the printer.
    ///
    /// Restores the state saved in `checkpoint` and drops the events queued
    /// since.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.mesh = checkpoint.mesh;
        self.session = checkpoint.session;
        self.handshake = checkpoint.handshake;
        self.events.truncate(checkpoint.queued);
    }

    // ==================== Connection ====================

    /// Records a freshly opened connection.
    pub fn connected(&mut self, port: &str, baud_rate: u32) {
        self.connected = true;
        self.mesh = MeshGeometry::Unknown;
        self.session.reset();
        self.handshake.reset();
        self.telemetry = Telemetry::new();
        tracing::debug!("phase -> {:?}", self.phase());
        self.events.push(Event::Connected {
            port: port.to_owned(),
            baud_rate,
        });
    }

    /// Records a closed connection, discarding mesh and session state.
    ///
    /// Returns false if nothing was connected.
    pub fn disconnected(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        if self.session.active {
            tracing::info!(
                "discarding leveling session at point {}",
                self.session.point
            );
        }
        self.connected = false;
        self.mesh = MeshGeometry::Unknown;
        self.session.reset();
        self.handshake.reset();
        self.telemetry = Telemetry::new();
        tracing::debug!("phase -> {:?}", self.phase());
        self.events.push(Event::Disconnected);
        true
    }

    // ==================== Leveling ====================

    /// Begins walking the mesh (`G29 S1`).
    pub fn start(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        let Some(total) = self.mesh.total_points() else {
            return Err(Error::invalid_operation("mesh geometry unknown"));
        };
        if self.session.active {
            return Err(Error::invalid_operation("leveling already in progress"));
        }

        let gcode = self.transmit(GCode::MeshStart);
        self.session.active = true;
        self.session.point = 0;
        self.events.push(Event::LevelingProgress { point: 0, total });
        tracing::debug!("leveling started, {total} points");
        Ok(gcode)
    }

    /// Moves on to the next mesh point (`G29 S2`).
    pub fn advance(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        if !self.session.active {
            return Err(Error::invalid_operation("leveling not started"));
        }
        let Some(total) = self.mesh.total_points() else {
            return Err(Error::invalid_operation("mesh geometry unknown"));
        };

        let gcode = self.transmit(GCode::MeshNext);
        self.session.point += 1;
        if self.session.point >= total {
            self.session.active = false;
            tracing::info!("leveling complete after {total} points");
        }
        self.session.current_z = self.session.start_z;
        self.events.push(Event::LevelingProgress {
            point: self.session.point,
            total,
        });
        self.events.push(Event::TargetZ {
            z: self.session.current_z,
        });
        Ok(gcode)
    }

    // ==================== Motion ====================

    /// Raises the nozzle by one step.
    pub fn jog_up(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        self.session.current_z += self.session.step;
        Ok(self.move_z())
    }

    /// Lowers the nozzle by one step.
    ///
    /// Refused at or below zero. A jog from just above zero may still end
    /// slightly below it.
    pub fn jog_down(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        if self.session.current_z <= 0.0 {
            return Err(Error::invalid_operation("can't move further down"));
        }
        self.session.current_z -= self.session.step;
        Ok(self.move_z())
    }

    /// Changes the jog step for subsequent jogs.
    pub fn set_step_size(&mut self, step: f64) -> Result<()> {
        self.ensure_connected()?;
        if !(step.is_finite() && step > 0.0) {
            return Err(Error::invalid_argument(format!(
                "step size must be positive, got {step}"
            )));
        }
        tracing::debug!("step size {} -> {step}", self.session.step);
        self.session.step = step;
        Ok(())
    }

    /// Homes all axes (`G28`).
    pub fn home(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        Ok(self.transmit(GCode::Home))
    }

    /// Disables the stepper motors (`M84`).
    pub fn motors_off(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        Ok(self.transmit(GCode::DisableMotors))
    }

    /// Sets the bed target temperature (`M140`).
    pub fn set_bed_temperature(&mut self, celsius: f64) -> Result<GCode> {
        self.ensure_connected()?;
        if !(celsius.is_finite() && celsius >= 0.0) {
            return Err(Error::invalid_argument(format!(
                "bed temperature must be non-negative, got {celsius}"
            )));
        }
        Ok(self.transmit(GCode::SetBedTemperature(celsius)))
    }

    /// Stores the mesh in EEPROM (`M500`).
    pub fn save(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        if self.session.active {
            return Err(Error::invalid_operation(
                "leveling in progress, finish all points before saving",
            ));
        }
        Ok(self.transmit(GCode::SaveSettings))
    }

    // ==================== Polling ====================

    /// Requests a position report (`M114`).
    pub fn request_position(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        Ok(self.transmit(GCode::ReportPosition))
    }

    /// Requests a temperature report (`M105`).
    pub fn request_temperature(&mut self) -> Result<GCode> {
        self.ensure_connected()?;
        Ok(self.transmit(GCode::ReportTemperature))
    }

    /// Requests mesh info (`G29 S0`) unless the geometry is already known.
    pub fn request_mesh_info(&mut self) -> Result<Option<GCode>> {
        self.ensure_connected()?;
        if self.mesh.is_known() {
            return Ok(None);
        }
        Ok(Some(self.transmit(GCode::MeshInfo)))
    }

    // ==================== Reports ====================

    /// Applies a classified report from the printer.
    pub fn apply(&mut self, report: Report) {
        if !self.connected {
            tracing::trace!("ignoring report while disconnected: {report:?}");
            return;
        }

        match report {
            Report::Ack => {
                self.handshake.complete();
                self.push_handshake();
            }
            Report::Busy => {
                self.handshake.busy();
                self.push_handshake();
            }
            Report::Position { x, y, z } => {
                self.telemetry.set_position(&x, &y, &z);
                self.events.push(Event::Position { x, y, z });
            }
            Report::MeshGrid { count_x, count_y } => self.apply_mesh_grid(count_x, count_y),
            Report::MeshStartHeight { z } => {
                self.session.start_z = z;
                self.session.current_z = z;
                self.events.push(Event::MeshStartHeight { z });
                self.events.push(Event::TargetZ { z });
                // Last line of the G29 S0 answer.
                self.handshake.complete();
                self.push_handshake();
                tracing::debug!("mesh starting height {z}");
            }
            Report::Temperature { bed } => {
                self.telemetry.bed = Some(bed);
                self.events.push(Event::Temperature { bed });
            }
            Report::Unrecognized => {}
        }
    }

    fn apply_mesh_grid(&mut self, count_x: u32, count_y: u32) {
        if self.mesh.is_known() {
            return;
        }
        let Some(mesh) = MeshGeometry::from_counts(count_x, count_y) else {
            tracing::debug!("ignoring empty mesh report {count_x},{count_y}");
            return;
        };
        let total_points = count_x * count_y;
        self.mesh = mesh;
        tracing::debug!("mesh points: X: {count_x} Y: {count_y} --> {total_points}");
        self.events.push(Event::MeshGeometry {
            count_x,
            count_y,
            total_points,
        });
        self.events.push(Event::LevelingProgress {
            point: 0,
            total: total_points,
        });
    }

    // ==================== Helpers ====================

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::not_connected())
        }
    }

    /// Resets the handshake for an outbound command.
    fn transmit(&mut self, gcode: GCode) -> GCode {
        self.handshake.reset();
        self.push_handshake();
        gcode
    }

    fn move_z(&mut self) -> GCode {
        let z = self.session.current_z;
        tracing::debug!("moving to Z {z}");
        let gcode = self.transmit(GCode::MoveZ(z));
        self.events.push(Event::TargetZ { z });
        gcode
    }

    fn push_handshake(&mut self) {
        self.events.push(Event::HandshakeProgress {
            count: self.handshake.count(),
            max: self.handshake.max(),
        });
    }
}

fn initial_step(step: f64) -> f64 {
    if step.is_finite() && step > 0.0 {
        step
    } else {
        tracing::warn!("ignoring configured step {step}, using {DEFAULT_STEP}");
        DEFAULT_STEP
    }
}
