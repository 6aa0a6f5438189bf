//! Async driver for a [`FloodController`]
//!
//! One tokio task owns the controller, so every event is handled serially.
//! Link frames, local packets and control requests share one FIFO queue and
//! are applied in the order they were sent. The earliest forwarding deadline
//! is the only other input; it fires once every already queued command has
//! been processed.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ripple_core::{AddressResolver, Clock, LinkQualityOracle, PeerIdentity};

use crate::controller::{BroadcastSummary, FloodController, FloodOutput, FloodStats};
use crate::error::{ConfigError, FloodError, FloodResult};

/// Queue depth for commands and for outputs
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

enum Command<I: PeerIdentity> {
    LinkFrame(Bytes),
    Originate {
        payload: Bytes,
        reply: oneshot::Sender<FloodResult<u32>>,
    },
    Stats(oneshot::Sender<FloodStats>),
    Packets(oneshot::Sender<Vec<BroadcastSummary<I>>>),
    SetDebug(bool),
    SetMinP(f64, oneshot::Sender<Result<(), ConfigError>>),
    Clear,
    Shutdown,
}

/// Cloneable handle to a running flood service
///
/// The service stops when every handle is dropped.
pub struct FloodHandle<I: PeerIdentity> {
    commands: mpsc::Sender<Command<I>>,
}

impl<I: PeerIdentity> Clone for FloodHandle<I> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<I: PeerIdentity> FloodHandle<I> {
    /// Queue a frame received from the link layer
    pub async fn send_link_frame(&self, frame: Bytes) -> FloodResult<()> {
        self.send(Command::LinkFrame(frame)).await
    }

    /// Start a broadcast, returning its sequence number
    pub async fn originate(&self, payload: Bytes) -> FloodResult<u32> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Originate { payload, reply }).await?;
        rx.await.map_err(|_| FloodError::ServiceClosed)?
    }

    pub async fn stats(&self) -> FloodResult<FloodStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats(reply)).await?;
        rx.await.map_err(|_| FloodError::ServiceClosed)
    }

    pub async fn packets(&self) -> FloodResult<Vec<BroadcastSummary<I>>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Packets(reply)).await?;
        rx.await.map_err(|_| FloodError::ServiceClosed)
    }

    pub async fn set_debug(&self, debug: bool) -> FloodResult<()> {
        self.send(Command::SetDebug(debug)).await
    }

    pub async fn set_min_p(&self, min_p: f64) -> FloodResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetMinP(min_p, reply)).await?;
        rx.await.map_err(|_| FloodError::ServiceClosed)??;
        Ok(())
    }

    pub async fn clear(&self) -> FloodResult<()> {
        self.send(Command::Clear).await
    }

    /// Stop the service; pending forwards are abandoned
    pub async fn shutdown(&self) -> FloodResult<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command<I>) -> FloodResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FloodError::ServiceClosed)
    }
}

/// Background task running one controller
pub struct FloodService<I, O, R>
where
    I: PeerIdentity,
    O: LinkQualityOracle<I> + ?Sized,
    R: AddressResolver<I> + ?Sized,
{
    controller: FloodController<I, O, R>,
    clock: Arc<dyn Clock>,
    commands_rx: mpsc::Receiver<Command<I>>,
    output_tx: mpsc::Sender<FloodOutput>,
    buffer: Vec<FloodOutput>,
}

impl<I, O, R> FloodService<I, O, R>
where
    I: PeerIdentity,
    O: LinkQualityOracle<I> + ?Sized + 'static,
    R: AddressResolver<I> + ?Sized + 'static,
{
    /// Spawn the service with the default channel capacity
    pub fn spawn(
        controller: FloodController<I, O, R>,
        clock: Arc<dyn Clock>,
    ) -> (FloodHandle<I>, mpsc::Receiver<FloodOutput>) {
        let (handle, outputs, _task) =
            Self::spawn_with_capacity(controller, clock, DEFAULT_CHANNEL_CAPACITY);
        (handle, outputs)
    }

    /// Spawn the service, also returning its task handle
    pub fn spawn_with_capacity(
        controller: FloodController<I, O, R>,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> (FloodHandle<I>, mpsc::Receiver<FloodOutput>, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (commands, commands_rx) = mpsc::channel(capacity);
        let (output_tx, output_rx) = mpsc::channel(capacity);

        let service = Self {
            controller,
            clock,
            commands_rx,
            output_tx,
            buffer: Vec::new(),
        };
        let task = tokio::spawn(async move {
            service.run().await;
        });

        let handle = FloodHandle { commands };
        (handle, output_rx, task)
    }

    async fn run(mut self) {
        info!(node = %self.controller.local_address().short_id(), "Flood service started");

        loop {
            let wait = self
                .controller
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(self.clock.now()));

            tokio::select! {
                biased;

                command = self.commands_rx.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                _ = sleep_for(wait), if wait.is_some() => {
                    let now = self.clock.now();
                    let fired = self.controller.poll_timers(now, &mut self.buffer);
                    debug!(fired, "Timers processed");
                }
            }

            if !self.flush().await {
                break;
            }
        }

        info!(node = %self.controller.local_address().short_id(), "Flood service stopped");
    }

    fn handle_command(&mut self, command: Command<I>) {
        match command {
            Command::LinkFrame(frame) => {
                let now = self.clock.now();
                self.controller
                    .handle_link_frame(&frame, now, &mut self.buffer);
            }
            Command::Originate { payload, reply } => {
                let now = self.clock.now();
                let result = self.controller.originate(payload, now, &mut self.buffer);
                let _ = reply.send(result);
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.controller.stats());
            }
            Command::Packets(reply) => {
                let _ = reply.send(self.controller.packets());
            }
            Command::SetDebug(debug) => self.controller.set_debug(debug),
            Command::SetMinP(min_p, reply) => {
                let _ = reply.send(self.controller.set_min_p(min_p));
            }
            Command::Clear => self.controller.clear(),
            Command::Shutdown => {}
        }
    }

    // Returns false once nobody is listening for output.
    async fn flush(&mut self) -> bool {
        for output in self.buffer.drain(..) {
            if self.output_tx.send(output).await.is_err() {
                warn!("Output receiver dropped; stopping flood service");
                return false;
            }
        }
        true
    }
}

async fn sleep_for(wait: Option<std::time::Duration>) {
    if let Some(wait) = wait {
        tokio::time::sleep(wait).await;
    }
}
