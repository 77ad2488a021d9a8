//! Main [`BedLeveler`] engine implementation.
//!
//! This module provides the high-level [`BedLeveler`] that combines the
//! transport, the leveling state machine, the poll scheduler and event
//! dispatch into a unified interface.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::LevelerConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, EventFilter, Subscription};
use crate::leveling::{LevelingMachine, Phase};
use crate::poll::{PollIntervals, PollKind, PollScheduler, PollTarget};
use crate::protocol::{GCode, Report, classify};
use crate::transport::serial::{PortStream, watch_ports};
use crate::transport::{LineStream, SerialConfig, SerialTransport, Transport};
use crate::types::{HandshakeCounter, LevelingSession, MeshGeometry, Telemetry};

/// State shared between the engine, the reader task and the poll tasks.
struct Shared<T> {
    machine: Mutex<LevelingMachine>,
    transport: Mutex<T>,
    dispatcher: EventDispatcher,
}

impl<T: Transport> Shared<T> {
    /// Runs one state machine operation and transmits the resulting command.
    ///
    /// The machine lock is held until the line is written and the events are
    /// dispatched, so wire order and event order follow state order. A failed
    /// write rolls the state back and dispatches nothing for the command.
    async fn issue<F>(&self, op: F) -> Result<Option<GCode>>
    where
        F: FnOnce(&mut LevelingMachine) -> Result<Option<GCode>>,
    {
        let mut machine = self.machine.lock().await;
        let checkpoint = machine.checkpoint();
        let outcome = op(&mut machine);

        let result = match outcome {
            Ok(Some(gcode)) => match self.transmit(gcode).await {
                Ok(()) => Ok(Some(gcode)),
                Err(e) => {
                    tracing::warn!("failed to send {gcode}: {e}");
                    machine.rollback(checkpoint);
                    Err(e)
                }
            },
            other => other,
        };

        for event in machine.drain_events() {
            self.dispatcher.dispatch(event);
        }
        result
    }

    async fn transmit(&self, gcode: GCode) -> Result<()> {
        let line = gcode.to_string();
        if gcode.is_query() {
            tracing::trace!("sending {line}");
        } else {
            tracing::debug!("sending {line}");
        }
        let mut transport = self.transport.lock().await;
        transport.write_line(&line).await
    }

    /// Classifies one received line and applies it.
    async fn handle_line(&self, line: &str) {
        let report = match classify(line) {
            Ok(Report::Unrecognized) => {
                tracing::trace!("ignoring {line:?}");
                return;
            }
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("{e}");
                return;
            }
        };

        let mut machine = self.machine.lock().await;
        machine.apply(report);
        for event in machine.drain_events() {
            self.dispatcher.dispatch(event);
        }
    }
}

impl<T: Transport> PollTarget for Shared<T> {
    fn poll(&self, kind: PollKind) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move {
            let sent = match kind {
                PollKind::Position => self.issue(|m| m.request_position().map(Some)).await?,
                PollKind::Temperature => {
                    self.issue(|m| m.request_temperature().map(Some)).await?
                }
                PollKind::MeshInfo => self.issue(LevelingMachine::request_mesh_info).await?,
            };
            Ok(sent.is_some())
        })
    }
}

/// Engine driving one printer through manual mesh bed leveling.
///
/// Commands are fire-and-forget: they update local state, write one line and
/// return without waiting for the printer. Progress is reported through
/// [`Event`]s; see [`BedLeveler::subscribe`].
pub struct BedLeveler<T> {
    config: LevelerConfig,
    shared: Arc<Shared<T>>,
    polls: PollScheduler,

    // Background tasks
    read_task: Option<JoinHandle<()>>,
}

impl BedLeveler<SerialTransport> {
    /// Creates a new engine for serial printers with default settings.
    #[must_use]
    pub fn serial() -> Self {
        Self::with_config(LevelerConfig::default())
    }

    /// Creates a new engine for serial printers with custom settings.
    #[must_use]
    pub fn with_config(config: LevelerConfig) -> Self {
        Self::with_transport(SerialTransport::new(), config)
    }
}

impl<T: Transport + 'static> BedLeveler<T> {
    /// Creates a new engine over the given transport.
    #[must_use]
    pub fn with_transport(transport: T, config: LevelerConfig) -> Self {
        let shared = Arc::new(Shared {
            machine: Mutex::new(LevelingMachine::new(&config)),
            transport: Mutex::new(transport),
            dispatcher: EventDispatcher::new(config.event_capacity),
        });

        Self {
            config,
            shared,
            polls: PollScheduler::new(),
            read_task: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &LevelerConfig {
        &self.config
    }

    /// Subscribes to events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.shared.dispatcher.subscribe()
    }

    /// Watches the serial port list at the configured scan interval.
    #[must_use]
    pub fn watch_ports(&self) -> PortStream {
        watch_ports(self.config.port_scan_interval)
    }

    // ==================== Connection ====================

    /// Connects to the printer at `port`.
    ///
    /// This will:
    /// 1. Open the serial port
    /// 2. Start the background read task
    /// 3. Start position, temperature and mesh info polling
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a baud rate outside the configured
    /// choices, [`Error::InvalidOperation`] if already connected, and
    /// [`Error::Connection`] if the port cannot be opened.
    pub async fn connect(&mut self, port: impl Into<String>, baud_rate: u32) -> Result<()> {
        self.connect_with(SerialConfig::new(port).baud_rate(baud_rate))
            .await
    }

    /// Connects using a prepared serial configuration.
    pub async fn connect_with(&mut self, serial: SerialConfig) -> Result<()> {
        if !self.config.supports_baud(serial.baud_rate) {
            return Err(Error::invalid_argument(format!(
                "unsupported baud rate {}",
                serial.baud_rate
            )));
        }

        let lines = {
            let mut machine = self.shared.machine.lock().await;
            if machine.is_connected() {
                return Err(Error::invalid_operation("already connected"));
            }

            let lines = self.open_transport(&serial).await?;
            machine.connected(&serial.port, serial.baud_rate);
            for event in machine.drain_events() {
                self.shared.dispatcher.dispatch(event);
            }
            lines
        };

        self.start_read_loop(lines);
        let target: Arc<dyn PollTarget> = self.shared.clone();
        self.polls.start(target, PollIntervals::from(&self.config));

        tracing::info!("connected to {} at {} baud", serial.port, serial.baud_rate);
        Ok(())
    }

    async fn open_transport(&self, serial: &SerialConfig) -> Result<LineStream> {
        let mut transport = self.shared.transport.lock().await;

        let opened = match transport.open(serial).await {
            Ok(()) => transport.lines().ok_or_else(|| Error::Connection {
                message: "transport provided no line stream".into(),
            }),
            Err(e) => Err(e),
        };

        match opened {
            Ok(lines) => Ok(lines),
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    tracing::debug!("close after failed open: {close_err}");
                }
                let message = format!("failed to open {}: {e}", serial.port);
                tracing::error!("{message}");
                self.shared.dispatcher.dispatch(Event::ConnectionError {
                    message: message.clone(),
                });
                Err(Error::Connection { message })
            }
        }
    }

    /// Starts the background read task.
    fn start_read_loop(&mut self, mut lines: LineStream) {
        let shared = Arc::clone(&self.shared);

        let read_task = tokio::spawn(async move {
            while let Some(line) = lines.next().await {
                shared.handle_line(&line).await;
            }

            // Only reached when the link drops; disconnect aborts this task.
            if shared.machine.lock().await.is_connected() {
                tracing::error!("serial link closed");
                shared.dispatcher.dispatch(Event::ConnectionError {
                    message: "serial link closed".into(),
                });
            }
        });
        self.read_task = Some(read_task);
    }

    /// Disconnects from the printer.
    ///
    /// Stops polling, closes the port and discards mesh and session state.
    /// Safe to call when not connected.
    pub async fn disconnect(&mut self) -> Result<()> {
        // Stop background tasks
        self.polls.stop();
        if let Some(task) = self.read_task.take() {
            task.abort();
        }

        let mut machine = self.shared.machine.lock().await;
        let closed = {
            let mut transport = self.shared.transport.lock().await;
            transport.close().await
        };

        if machine.disconnected() {
            tracing::info!("disconnected");
        }
        for event in machine.drain_events() {
            self.shared.dispatcher.dispatch(event);
        }

        closed.map_err(|e| Error::Connection {
            message: format!("failed to close port: {e}"),
        })
    }

    /// Returns true if connected.
    pub async fn is_connected(&self) -> bool {
        self.shared.machine.lock().await.is_connected()
    }

    // ==================== Leveling ====================

    /// Starts the leveling sequence at the first mesh point.
    pub async fn start(&self) -> Result<()> {
        self.run(LevelingMachine::start).await
    }

    /// Stores the current point and moves to the next one.
    pub async fn advance(&self) -> Result<()> {
        self.run(LevelingMachine::advance).await
    }

    /// Raises Z by one step.
    pub async fn jog_up(&self) -> Result<()> {
        self.run(LevelingMachine::jog_up).await
    }

    /// Lowers Z by one step.
    pub async fn jog_down(&self) -> Result<()> {
        self.run(LevelingMachine::jog_down).await
    }

    /// Sets the jog step size in mm.
    pub async fn set_step_size(&self, step: f64) -> Result<()> {
        self.shared
            .issue(|m| m.set_step_size(step).map(|()| None))
            .await
            .map(drop)
    }

    // ==================== Machine Control ====================

    /// Homes all axes.
    pub async fn home(&self) -> Result<()> {
        self.run(LevelingMachine::home).await
    }

    /// Disables the stepper motors.
    pub async fn motors_off(&self) -> Result<()> {
        self.run(LevelingMachine::motors_off).await
    }

    /// Sets the bed target temperature in °C.
    pub async fn set_bed_temperature(&self, celsius: f64) -> Result<()> {
        self.run(|m| m.set_bed_temperature(celsius)).await
    }

    /// Stores the mesh in EEPROM.
    pub async fn save(&self) -> Result<()> {
        self.run(LevelingMachine::save).await
    }

    async fn run<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut LevelingMachine) -> Result<GCode>,
    {
        self.shared.issue(|m| op(m).map(Some)).await.map(drop)
    }

    // ==================== Snapshots ====================

    /// Returns the current phase.
    pub async fn phase(&self) -> Phase {
        self.shared.machine.lock().await.phase()
    }

    /// Returns the leveling session.
    pub async fn session(&self) -> LevelingSession {
        self.shared.machine.lock().await.session()
    }

    /// Returns the mesh geometry.
    pub async fn mesh(&self) -> MeshGeometry {
        self.shared.machine.lock().await.mesh()
    }

    /// Returns the handshake counter.
    pub async fn handshake(&self) -> HandshakeCounter {
        self.shared.machine.lock().await.handshake()
    }

    /// Returns the last-known telemetry.
    pub async fn telemetry(&self) -> Telemetry {
        self.shared.machine.lock().await.telemetry().clone()
    }

    /// Waits until the handshake counter reaches its ceiling.
    ///
    /// Returns false on timeout. A printer that never answers leaves the
    /// counter stalled; that means "still busy", not failure.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        // Subscribe before checking to avoid missing the event
        let mut subscription = self.subscribe();
        if self.handshake().await.is_complete() {
            return true;
        }
        tokio::time::timeout(
            timeout,
            subscription.recv_matching(&EventFilter::handshake_complete()),
        )
        .await
        .is_ok_and(|event| event.is_some())
    }
}

impl<T> Drop for BedLeveler<T> {
    fn drop(&mut self) {
        // Abort background tasks
        self.polls.stop();
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}
