// Serial link to the robot (Bluetooth serial profile, e.g. /dev/rfcomm0)

use serialport::SerialPort;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::{Link, Result, Transport, TransportError};
use crate::config::{SERIAL_BAUDRATE, SERIAL_TIMEOUT};

/// Opens a serial port on `connect`
#[derive(Debug, Clone)]
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::with_baudrate(port_name, SERIAL_BAUDRATE)
    }

    pub fn with_baudrate(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: SERIAL_TIMEOUT,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for SerialTransport {
    type Link = SerialLink;

    async fn connect(&self) -> Result<SerialLink> {
        info!("Opening serial port {} at {} baud", self.port_name, self.baud_rate);
        let builder = serialport::new(self.port_name.clone(), self.baud_rate).timeout(self.timeout);
        let port = tokio::task::spawn_blocking(move || builder.open()).await??;

        Ok(SerialLink {
            port: Arc::new(Mutex::new(port)),
        })
    }
}

/// An open serial port; writes run on the blocking pool
#[derive(Clone)]
pub struct SerialLink {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl Link for SerialLink {
    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let port = Arc::clone(&self.port);
        let packet = frame.to_vec();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut port = port.lock().map_err(|_| TransportError::Disconnected)?;
            port.write_all(&packet)?;
            port.flush()?;
            debug!("Wrote {} bytes", packet.len());
            Ok(())
        })
        .await?
    }
}
