// In-memory transport for simulation and tests
//
// Records every packet written, with optional write latency and injected failures.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Link, Result, Transport, TransportError};
use crate::protocol::CommandFrame;

#[derive(Debug, Default)]
struct SimState {
    frames: Vec<Vec<u8>>,
    latency: Duration,
    failing: bool,
}

/// Shared handle to the simulated robot; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct SimLink {
    state: Arc<Mutex<SimState>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each write stays in flight for `latency` after its bytes are recorded
    pub fn with_latency(latency: Duration) -> Self {
        let link = Self::new();
        link.state().latency = latency;
        link
    }

    /// Make subsequent writes fail with `TransportError::Disconnected`
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Raw packets written so far, oldest first
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state().frames.clone()
    }

    /// Written packets, decoded. Packets that fail to decode are skipped.
    pub fn decoded(&self) -> Vec<CommandFrame> {
        self.state()
            .frames
            .iter()
            .filter_map(|bytes| CommandFrame::parse(bytes).ok())
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Link for SimLink {
    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let latency = {
            let mut state = self.state();
            if state.failing {
                return Err(TransportError::Disconnected);
            }
            state.frames.push(frame.to_vec());
            state.latency
        };

        match CommandFrame::parse(frame) {
            Ok(packet) => debug!(
                "Sim robot got cid=0x{:02X} seq={} data={:02X?}",
                packet.command_id(),
                packet.sequence(),
                packet.payload()
            ),
            Err(e) => warn!("Sim robot got an undecodable packet: {}", e),
        }

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

/// Hands out the same `SimLink` on every connect
#[derive(Debug, Clone, Default)]
pub struct SimTransport {
    link: SimLink,
}

impl SimTransport {
    pub fn new(link: SimLink) -> Self {
        Self { link }
    }
}

impl Transport for SimTransport {
    type Link = SimLink;

    async fn connect(&self) -> Result<SimLink> {
        debug!("Sim transport connected");
        Ok(self.link.clone())
    }
}
