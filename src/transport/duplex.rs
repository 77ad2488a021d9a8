//! In-memory transport standing in for a printer in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::encode_line;
use crate::transport::{LineStream, SerialConfig, Transport, line_stream};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Transport backed by `tokio::io::duplex`; each open hands the far end to
/// the paired [`DeviceHandle`].
pub(crate) struct DuplexTransport {
    writer: Option<WriteHalf<DuplexStream>>,
    lines: Option<LineStream>,
    devices: mpsc::UnboundedSender<Device>,
    fail_open: bool,
}

impl DuplexTransport {
    pub(crate) fn new() -> (Self, DeviceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            writer: None,
            lines: None,
            devices: tx,
            fail_open: false,
        };
        (transport, DeviceHandle { devices: rx })
    }

    /// A transport whose `open` always fails.
    pub(crate) fn unplugged() -> Self {
        let (mut transport, _handle) = Self::new();
        transport.fail_open = true;
        transport
    }
}

impl Transport for DuplexTransport {
    fn open<'a>(
        &'a mut self,
        config: &'a SerialConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_open {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{}: no such device", config.port),
                )));
            }
            if self.writer.is_some() {
                return Ok(());
            }

            let (host, device) = tokio::io::duplex(PIPE_CAPACITY);
            let (reader, writer) = tokio::io::split(host);
            self.lines = Some(line_stream(reader));
            self.writer = Some(writer);

            let (device_reader, device_writer) = tokio::io::split(device);
            let _ = self.devices.send(Device {
                commands: BufReader::new(device_reader).lines(),
                writer: device_writer,
            });
            Ok(())
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.writer = None;
            self.lines = None;
            Ok(())
        })
    }

    fn write_line<'a>(
        &'a mut self,
        line: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let writer = self.writer.as_mut().ok_or_else(|| Error::Connection {
                message: "not open".into(),
            })?;
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

/// Receives the device end of every connection the transport opens.
pub(crate) struct DeviceHandle {
    devices: mpsc::UnboundedReceiver<Device>,
}

impl DeviceHandle {
    /// Returns the device end of the next opened connection.
    pub(crate) async fn attach(&mut self) -> Device {
        self.devices.recv().await.expect("transport dropped")
    }
}

/// The printer side of a duplex connection.
pub(crate) struct Device {
    commands: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Device {
    /// Sends one response line to the host.
    pub(crate) async fn reply(&mut self, line: &str) {
        self.writer
            .write_all(&encode_line(line))
            .await
            .expect("host end closed");
    }

    /// Waits for the next command line from the host.
    ///
    /// Returns `None` once the host has closed the connection.
    pub(crate) async fn next_command(&mut self) -> Option<String> {
        self.commands.next_line().await.expect("pipe read failed")
    }

    /// Collects the commands that arrive within `window`.
    pub(crate) async fn commands_within(&mut self, window: Duration) -> Vec<String> {
        let mut received = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(line)) =
            tokio::time::timeout_at(deadline, self.next_command()).await
        {
            received.push(line);
        }
        received
    }
}
