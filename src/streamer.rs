use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::locator::{DeviceLister, Locator};
use crate::port::{send_frame, PortOpener};
use crate::shutdown::Shutdown;
use crate::telemetry::{Frame, TelemetrySampler};

/// Connection lifecycle. A connection only ever lives inside `Streaming` or `Closing`,
/// so there can never be two of them.
pub enum State<C> {
    Searching,
    Opening { port: String },
    Streaming { port: String, conn: C, frames: u64 },
    Closing { port: String, conn: C, frames: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Searching,
    Opening,
    Streaming,
    Closing,
}

impl<C> State<C> {
    pub fn phase(&self) -> Phase {
        match self {
            State::Searching => Phase::Searching,
            State::Opening { .. } => Phase::Opening,
            State::Streaming { .. } => Phase::Streaming,
            State::Closing { .. } => Phase::Closing,
        }
    }
}

pub struct Streamer<L, O, S> {
    config: Config,
    locator: Locator<L>,
    opener: O,
    sampler: S,
    shutdown: Shutdown,
}

impl<L, O, S> Streamer<L, O, S>
where
    L: DeviceLister,
    O: PortOpener,
    S: TelemetrySampler,
{
    pub fn new(config: Config, lister: L, opener: O, sampler: S, shutdown: Shutdown) -> Self {
        Streamer {
            config,
            locator: Locator::new(lister),
            opener,
            sampler,
            shutdown,
        }
    }

    /// Supervisory loop: search, connect, stream, and start over on any failure.
    /// Only returns once shutdown has been requested.
    pub async fn run(&mut self) {
        let mut state = State::Searching;

        while let Some(next) = self.step(state).await {
            debug!("-> {:?}", next.phase());
            state = next;
        }

        info!("Telemetry streamer stopped");
    }

    /// Performs one transition. `None` means shutdown was requested; any open
    /// connection has been closed by then.
    pub async fn step(&mut self, state: State<O::Conn>) -> Option<State<O::Conn>> {
        if self.shutdown.is_requested() {
            match state {
                State::Streaming { port, conn, .. } => close(&port, conn).await,
                // Flushing a link that already failed can block on a dead TTY.
                State::Closing { conn, .. } => drop(conn),
                _ => {}
            }
            return None;
        }

        match state {
            State::Searching => match self.locator.find(&self.config.identity) {
                Some(port) => {
                    info!("Device found on port {}", port);
                    Some(State::Opening { port })
                }
                None => {
                    warn!(
                        "No device matching {} found. Retry in {:?}.",
                        self.config.identity.match_pattern(),
                        self.config.backoff
                    );
                    self.backoff().await
                }
            },
            State::Opening { port } => match self.opener.open(&port) {
                Ok(conn) => {
                    info!("Connected to {}", port);
                    Some(State::Streaming { port, conn, frames: 0 })
                }
                Err(e) => {
                    warn!("Could not open port {}: {}. Retry in {:?}.", port, e, self.config.backoff);
                    self.backoff().await
                }
            },
            State::Streaming { port, mut conn, frames } => {
                let frame = Frame::from(self.sampler.sample());

                if let Err(e) = send_frame(&mut conn, frame).await {
                    warn!("Lost connection on {} after {} frames: {}", port, frames, e);
                    return Some(State::Closing { port, conn, frames });
                }
                debug!("Sent cpu={}% ram={}% to {}", frame.cpu(), frame.ram(), port);

                if self.shutdown.pause(self.config.tick).await {
                    Some(State::Streaming {
                        port,
                        conn,
                        frames: frames + 1,
                    })
                } else {
                    close(&port, conn).await;
                    None
                }
            }
            State::Closing { port, conn, frames } => {
                // The link is already broken, so there is nothing left to flush.
                drop(conn);
                debug!("Closed {} after {} frames", port, frames);
                Some(State::Searching)
            }
        }
    }

    async fn backoff(&mut self) -> Option<State<O::Conn>> {
        if self.shutdown.pause(self.config.backoff).await {
            Some(State::Searching)
        } else {
            None
        }
    }
}

async fn close<C: tokio::io::AsyncWrite + Unpin>(port: &str, mut conn: C) {
    if let Err(e) = conn.shutdown().await {
        debug!("Error while closing {}: {}", port, e);
    }
    info!("Closed {}", port);
}
