use std::io;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use crate::telemetry::Frame;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

pub trait PortOpener {
    type Conn: AsyncWrite + Unpin;

    fn open(&self, port: &str) -> io::Result<Self::Conn>;
}

pub struct SerialOpener {
    baud_rate: u32,
}

impl SerialOpener {
    pub fn new(baud_rate: u32) -> Self {
        SerialOpener { baud_rate }
    }
}

impl PortOpener for SerialOpener {
    type Conn = SerialStream;

    fn open(&self, port: &str) -> io::Result<SerialStream> {
        let mut serial = tokio_serial::new(port, self.baud_rate).open_native_async()?;
        // CDC ACM firmware usually waits for DTR before it treats the host as present.
        serial.write_data_terminal_ready(true)?;

        Ok(serial)
    }
}

/// One write of the whole frame; anything less than all of it is a failure.
pub async fn send_frame<W>(conn: &mut W, frame: Frame) -> Result<(), LinkError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode();

    let written = conn.write(&bytes).await?;
    if written != bytes.len() {
        return Err(LinkError::ShortWrite {
            written,
            expected: bytes.len(),
        });
    }

    conn.flush().await?;
    Ok(())
}
