//! Background layout worker
//!
//! Runs a [`SimulationHost`] on its own OS thread with a single-threaded
//! tokio runtime. The caller talks to it only through channels: commands go
//! in via [`WorkerHandle`], snapshots come out via [`PositionStream`].
//!
//! Pending commands are always applied before the next ticking round, so a
//! `removeGraph` lands at most one tick late.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, info, trace, warn};

use crate::config::LayoutConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::host::SimulationHost;
use crate::protocol::{GraphSnapshot, Message};

enum Command {
    Message(Message),
    /// Stop accepting messages, run what is running to completion, exit
    Finish,
    /// Exit now
    Shutdown,
}

/// Start a worker thread for `config`
pub fn spawn(config: LayoutConfig) -> LayoutResult<(WorkerHandle, PositionStream)> {
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(LayoutError::WorkerSpawn)?;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
    let tick_interval = config.tick_interval();
    let host = SimulationHost::new(config);

    let thread = std::thread::Builder::new()
        .name("force-layout-worker".to_string())
        .spawn(move || runtime.block_on(run(host, command_rx, snapshot_tx, tick_interval)))
        .map_err(LayoutError::WorkerSpawn)?;

    info!("layout worker started");
    Ok((
        WorkerHandle {
            commands: command_tx,
            thread: Some(thread),
        },
        PositionStream::new(snapshot_rx),
    ))
}

async fn run(
    mut host: SimulationHost,
    mut commands: UnboundedReceiver<Command>,
    mut snapshots: UnboundedSender<GraphSnapshot>,
    tick_interval: Duration,
) {
    let mut finishing = false;

    'outer: loop {
        if host.running() == 0 {
            if finishing {
                break;
            }
            // Idle: park until the next command
            let Some(command) = commands.recv().await else {
                break;
            };
            if apply(&mut host, command, &mut finishing).is_break() {
                break;
            }
            continue;
        }

        loop {
            match commands.try_recv() {
                Ok(command) => {
                    if apply(&mut host, command, &mut finishing).is_break() {
                        break 'outer;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Every handle is gone; nobody can stop these instances later
                    if !finishing {
                        break 'outer;
                    }
                    break;
                }
            }
        }

        let advanced = host.step(&mut snapshots);
        trace!(advanced, "ticking round complete");

        if tick_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(tick_interval).await;
        }
    }

    host.shutdown();
    info!("layout worker stopped");
}

fn apply(host: &mut SimulationHost, command: Command, finishing: &mut bool) -> ControlFlow<()> {
    match command {
        Command::Message(_) if *finishing => {
            debug!("worker finishing, message ignored");
        }
        Command::Message(message) => {
            let effect = host.handle(message);
            trace!(?effect, "message applied");
        }
        Command::Finish => *finishing = true,
        Command::Shutdown => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

/// Caller-side handle to a running worker.
///
/// Dropping the handle shuts the worker down and waits for its thread.
pub struct WorkerHandle {
    commands: UnboundedSender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn send(&self, message: Message) -> LayoutResult<()> {
        self.command(Command::Message(message))
    }

    /// Decode and send a JSON message. Malformed input is logged and dropped.
    pub fn post_json(&self, text: &str) -> LayoutResult<()> {
        match Message::from_json(text) {
            Ok(message) => self.send(message),
            Err(err) => {
                debug!(%err, "dropping malformed message");
                Ok(())
            }
        }
    }

    /// Let running simulations complete, then exit. The position stream
    /// ends once the last one has stopped.
    pub fn finish(&self) -> LayoutResult<()> {
        self.command(Command::Finish)
    }

    /// Tear the worker down now and wait for its thread
    pub fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        self.join();
    }

    /// Wait for the worker to exit on its own, after [`WorkerHandle::finish`]
    pub fn wait(mut self) {
        self.join();
    }

    fn command(&self, command: Command) -> LayoutResult<()> {
        self.commands
            .send(command)
            .map_err(|_| LayoutError::WorkerGone)
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("layout worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.commands.send(Command::Shutdown);
            self.join();
        }
    }
}

/// Consumer side of the snapshot channel.
///
/// Remembers the newest snapshot per graph so a renderer can always redraw
/// the last layout, even one that never settled.
pub struct PositionStream {
    snapshots: UnboundedReceiver<GraphSnapshot>,
    latest: HashMap<String, GraphSnapshot>,
}

impl PositionStream {
    fn new(snapshots: UnboundedReceiver<GraphSnapshot>) -> Self {
        Self {
            snapshots,
            latest: HashMap::new(),
        }
    }

    /// Next snapshot, or `None` once the worker has exited
    pub async fn next(&mut self) -> Option<GraphSnapshot> {
        let snapshot = self.snapshots.recv().await?;
        Some(self.remember(snapshot))
    }

    /// Blocking variant of [`PositionStream::next`] for non-async callers
    pub fn blocking_next(&mut self) -> Option<GraphSnapshot> {
        let snapshot = self.snapshots.blocking_recv()?;
        Some(self.remember(snapshot))
    }

    /// Next snapshot if one is already queued
    pub fn try_next(&mut self) -> Option<GraphSnapshot> {
        let snapshot = self.snapshots.try_recv().ok()?;
        Some(self.remember(snapshot))
    }

    pub fn latest(&self, graph_id: &str) -> Option<&GraphSnapshot> {
        self.latest.get(graph_id)
    }

    /// Drop the remembered layout for a graph the renderer no longer shows
    pub fn forget(&mut self, graph_id: &str) {
        self.latest.remove(graph_id);
    }

    fn remember(&mut self, snapshot: GraphSnapshot) -> GraphSnapshot {
        self.latest
            .insert(snapshot.graph_id.clone(), snapshot.clone());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_types::RawNode;

    fn nodes() -> Vec<RawNode> {
        vec![RawNode::new("a").with_children(["b"]), RawNode::new("b")]
    }

    #[test]
    fn blocking_consumer_sees_full_run() {
        let (handle, mut stream) = spawn(LayoutConfig::default().with_seed(5)).unwrap();
        handle.send(Message::update("g", nodes(), vec![])).unwrap();
        handle.finish().unwrap();

        let mut ticks = Vec::new();
        while let Some(snapshot) = stream.blocking_next() {
            ticks.push(snapshot.tick);
        }
        handle.wait();

        assert_eq!(ticks, (1..=100).collect::<Vec<_>>());
        assert_eq!(stream.latest("g").map(|s| s.tick), Some(100));
    }

    #[test]
    fn forget_clears_latest() {
        let (handle, mut stream) = spawn(LayoutConfig::default().with_seed(5)).unwrap();
        handle.send(Message::update("g", nodes(), vec![])).unwrap();
        handle.finish().unwrap();
        while stream.blocking_next().is_some() {}

        stream.forget("g");
        assert!(stream.latest("g").is_none());
    }

    #[test]
    fn send_after_shutdown_fails() {
        let (handle, _stream) = spawn(LayoutConfig::default()).unwrap();
        let commands = handle.commands.clone();
        handle.shutdown();

        assert!(commands.send(Command::Finish).is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = LayoutConfig {
            width: 0.0,
            ..LayoutConfig::default()
        };
        assert!(matches!(spawn(config), Err(LayoutError::Config(_))));
    }
}
