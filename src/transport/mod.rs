//! Transport layer for printer communication.
//!
//! This module provides the abstraction for line-oriented transports.
//! Currently only USB/Serial is implemented.

#[cfg(test)]
pub(crate) mod duplex;
pub mod serial;

use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;
use crate::protocol::LineDecoder;

pub use serial::{SerialConfig, SerialTransport};

/// Stream of received lines with terminators stripped.
pub type LineStream = BoxStream<'static, String>;

/// Trait for transport implementations.
///
/// The engine keeps the transport behind a mutex, so implementations only
/// need to be `Send`.
pub trait Transport: Send {
    /// Opens the device. Opening an already open transport is a no-op.
    fn open<'a>(
        &'a mut self,
        config: &'a SerialConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Closes the device. Closing a closed transport is a no-op.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Writes one line, appending the terminator.
    fn write_line<'a>(
        &'a mut self,
        line: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Takes the received-line stream of the current connection.
    ///
    /// Returns `None` if not open or already taken.
    fn lines(&mut self) -> Option<LineStream>;

    /// Returns true if open.
    fn is_open(&self) -> bool;
}

/// Turns a byte reader into a lazy stream of text lines.
///
/// Lines that are not valid UTF-8 are dropped. The stream ends on EOF or on
/// the first read error.
pub fn line_stream<R>(reader: R) -> LineStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(
        (reader, LineDecoder::new()),
        |(mut reader, mut decoder)| async move {
            let mut buf = [0u8; 1024];

            loop {
                match decoder.decode() {
                    Ok(Some(line)) => {
                        tracing::trace!("<< {line}");
                        return Some((line, (reader, decoder)));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!("dropping line: {e}");
                        continue;
                    }
                }

                let n = match reader.read(&mut buf).await {
                    Ok(0) => {
                        tracing::debug!("serial port closed");
                        return None;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        tracing::error!("serial read error: {}", e);
                        return None;
                    }
                };

                tracing::trace!("received {} bytes", n);
                decoder.feed(&buf[..n]);
            }
        },
    )
    .boxed()
}
