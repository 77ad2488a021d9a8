//! Serial/USB transport implementation.
//!
//! This module provides serial port communication for printers connected
//! via USB.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::config::DEFAULT_BAUD_RATE;
use crate::error::{Error, Result};
use crate::protocol::encode_line;
use crate::transport::{LineStream, Transport, line_stream};

/// Configuration for serial transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }
}

/// Serial transport for printer communication.
///
/// Uses split read/write halves so the reader task never blocks writers.
#[derive(Default)]
pub struct SerialTransport {
    writer: Option<Arc<Mutex<WriteHalf<SerialStream>>>>,
    lines: Option<LineStream>,
}

impl SerialTransport {
    /// Creates a new, closed serial transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for SerialTransport {
    fn open<'a>(
        &'a mut self,
        config: &'a SerialConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.writer.is_some() {
                return Ok(());
            }

            tracing::info!(
                "opening serial port {} at {} baud",
                config.port,
                config.baud_rate
            );

            let stream = tokio_serial::new(&config.port, config.baud_rate)
                .open_native_async()
                .map_err(Error::Serial)?;

            let (reader, writer) = tokio::io::split(stream);
            self.lines = Some(line_stream(reader));
            self.writer = Some(Arc::new(Mutex::new(writer)));

            tracing::info!("serial port open");
            Ok(())
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.writer.is_some() || self.lines.is_some() {
                tracing::info!("closing serial port");
                self.writer = None;
                self.lines = None;
            }
            Ok(())
        })
    }

    fn write_line<'a>(
        &'a mut self,
        line: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let writer = self.writer.clone();
        Box::pin(async move {
            let writer = writer.ok_or_else(|| Error::Connection {
                message: "serial port not open".into(),
            })?;
            let mut writer = writer.lock().await;

            tracing::trace!(">> {line}");
            writer.write_all(&encode_line(line)).await?;
            writer.flush().await?;

            Ok(())
        })
    }

    fn lines(&mut self) -> Option<LineStream> {
        self.lines.take()
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

/// Lists available serial ports.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Stream of serial port lists.
pub type PortStream = BoxStream<'static, Vec<String>>;

/// Watches the serial port list.
///
/// Yields the current list right away, then again whenever it changes,
/// checking every `period`. Listing failures are logged and retried on the
/// next check.
#[must_use]
pub fn watch_ports(period: Duration) -> PortStream {
    watch_ports_with(period, list_ports)
}

pub(crate) fn watch_ports_with<F>(period: Duration, list: F) -> PortStream
where
    F: FnMut() -> Result<Vec<String>> + Send + 'static,
{
    stream::unfold(
        (list, None::<Vec<String>>, false),
        move |(mut list, mut last, mut started)| async move {
            loop {
                if started {
                    tokio::time::sleep(period).await;
                }
                started = true;

                match list() {
                    Ok(ports) if last.as_ref() != Some(&ports) => {
                        tracing::debug!("serial ports: {ports:?}");
                        last = Some(ports.clone());
                        return Some((ports, (list, last, started)));
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("failed to list serial ports: {e}"),
                }
            }
        },
    )
    .boxed()
}
