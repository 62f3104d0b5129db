//! Command dispatcher
//!
//! Single-threaded interpreter for the commands produced by every input
//! source. It is the only writer of the channel registry and the only caller
//! of queue control operations, so the clear-kill-enqueue sequence used for
//! preemption never races with another command.
//!
//! # Architecture
//!
//! ```text
//! InputHandle threads ──► CommandSender ──► inbound queue (crossbeam, FIFO)
//!                                               │
//!                                               ▼
//!                                  Dispatcher::run (this thread)
//!                                               │ resolve / clear / kill / enqueue
//!                                               ▼
//!                                  ChannelRegistry ──► ChannelQueue workers
//! ```
//!
//! # Shutdown
//!
//! `exit`, a failed input source, or the end of every registered source stops
//! and joins every input first, so no further command can arrive, then stops
//! and joins every channel worker.

use crate::clip::{ChannelId, Clip, SoundLibrary};
use crate::command::Command;
use crate::error::{ChimeError, CommandError, InputError};
use crate::input::{InputHandle, InputSet, LineSource};
use crate::player::Player;
use crate::registry::ChannelRegistry;
use crate::task::PlaybackTask;
use crossbeam::channel::{Receiver, Sender};
use std::sync::Arc;

/// Message on the inbound queue
#[derive(Debug)]
pub enum Inbound {
    /// Raw command line from a source
    Line(String),
    /// A source failed for good and could not recover
    SourceFailed { source_name: String, error: InputError },
    /// A source reached end of stream
    SourceEnded { source_name: String },
}

/// Handle given to input sources for feeding the dispatcher
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Inbound>,
}

impl CommandSender {
    /// Standalone sender/receiver pair
    pub fn channel() -> (Self, Receiver<Inbound>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        (Self { tx }, rx)
    }

    /// Queue a raw command line; `false` if the dispatcher is gone
    pub fn add_command(&self, line: impl Into<String>) -> bool {
        self.tx.send(Inbound::Line(line.into())).is_ok()
    }

    /// Escalate an unrecoverable source failure
    pub fn report_failure(&self, source_name: &str, error: InputError) -> bool {
        self.tx
            .send(Inbound::SourceFailed {
                source_name: source_name.to_string(),
                error,
            })
            .is_ok()
    }

    /// Tell the dispatcher a source has no more lines
    pub fn report_ended(&self, source_name: &str) -> bool {
        self.tx
            .send(Inbound::SourceEnded {
                source_name: source_name.to_string(),
            })
            .is_ok()
    }
}

/// Whether the dispatcher keeps running after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Snapshot of one channel for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub id: ChannelId,
    pub playing: Option<Clip>,
    pub pending: usize,
}

pub struct Dispatcher {
    sender: CommandSender,
    inbound: Receiver<Inbound>,
    registry: ChannelRegistry,
    library: SoundLibrary,
    player: Player,
    default_channel: ChannelId,
    inputs: InputSet,
    /// Registered sources that have not reached end of stream
    live_inputs: usize,
    /// Non-blank lines received, valid or not
    received: u64,
    terminated: bool,
}

impl Dispatcher {
    pub fn new(library: SoundLibrary, player: Player, default_channel: ChannelId) -> Self {
        let (sender, inbound) = CommandSender::channel();
        Self {
            sender,
            inbound,
            registry: ChannelRegistry::new(),
            library,
            player,
            default_channel,
            inputs: InputSet::new(),
            live_inputs: 0,
            received: 0,
            terminated: false,
        }
    }

    /// Sender for feeding commands from outside a registered source
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Start a reader thread for `source`; it is stopped at shutdown
    pub fn spawn_input(&mut self, source: Box<dyn LineSource>) -> std::io::Result<()> {
        let handle = InputHandle::spawn(source, self.sender())?;
        log::info!("Dispatcher: registered input '{}'", handle.name());
        self.inputs.push(handle);
        self.live_inputs += 1;
        Ok(())
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of non-blank command lines received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Per-channel status, sorted by channel
    pub fn channels(&self) -> Vec<ChannelStatus> {
        self.registry
            .all()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .map(|queue| ChannelStatus {
                id: queue.id(),
                playing: queue.current_clip(),
                pending: queue.pending_len(),
            })
            .collect()
    }

    /// Process commands until `exit`, an input source fails, or every
    /// registered source has ended
    pub fn run(&mut self) -> Result<(), ChimeError> {
        log::info!("Dispatcher: ready");

        while !self.terminated {
            match self.inbound.recv() {
                Ok(Inbound::Line(line)) => {
                    self.handle_line(&line);
                }
                Ok(Inbound::SourceFailed { source_name, error }) => {
                    log::error!("Dispatcher: input '{}' failed, shutting down", source_name);
                    self.shutdown();
                    return Err(ChimeError::SourceFailed { source_name, error });
                }
                Ok(Inbound::SourceEnded { source_name }) => {
                    self.live_inputs = self.live_inputs.saturating_sub(1);
                    log::info!(
                        "Dispatcher: input '{}' ended, {} still open",
                        source_name,
                        self.live_inputs
                    );
                    if self.live_inputs == 0 {
                        log::info!("Dispatcher: no input left, shutting down");
                        self.shutdown();
                    }
                }
                Err(_) => {
                    self.shutdown();
                    return Err(ChimeError::QueueClosed);
                }
            }
        }

        Ok(())
    }

    /// Parse and execute one raw line
    pub fn handle_line(&mut self, line: &str) -> Flow {
        let received = line.trim();
        if received.is_empty() {
            return Flow::Continue;
        }
        log::info!("> {}", received);
        self.received += 1;

        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                report(&e);
                return Flow::Continue;
            }
        };

        match self.execute(command) {
            Ok(flow) => flow,
            Err(e) => {
                report(&e);
                Flow::Continue
            }
        }
    }

    /// Execute a parsed command
    pub fn execute(&mut self, command: Command) -> Result<Flow, CommandError> {
        if self.terminated {
            log::debug!("Dispatcher: terminated, ignoring {:?}", command);
            return Ok(Flow::Exit);
        }

        match command {
            Command::Play {
                file,
                channel,
                looping,
            } => {
                self.play(&file, channel.unwrap_or(self.default_channel), looping)?;
            }
            Command::Stop { channel } => {
                let queue = self
                    .registry
                    .get(channel)
                    .ok_or(CommandError::UnknownChannel(channel))?;
                queue.kill_current();
            }
            Command::Silence { channel: Some(channel) } => {
                let queue = self
                    .registry
                    .get(channel)
                    .ok_or(CommandError::UnknownChannel(channel))?;
                queue.clear();
                queue.kill_current();
            }
            Command::Silence { channel: None } => {
                for id in self.registry.all() {
                    if let Some(queue) = self.registry.get(id) {
                        queue.clear();
                        queue.kill_current();
                    }
                }
            }
            Command::Exit => {
                self.shutdown();
                return Ok(Flow::Exit);
            }
        }

        Ok(Flow::Continue)
    }

    /// Preempt `channel` and queue `file` on it
    fn play(&mut self, file: &str, channel: ChannelId, looping: bool) -> Result<(), CommandError> {
        // Resolve first: a missing file must not create a channel
        let clip = self.library.resolve(file)?;

        let queue = self
            .registry
            .resolve(channel)
            .map_err(|e| CommandError::Spawn {
                channel,
                reason: e.to_string(),
            })?;

        queue.clear();
        queue.kill_current();
        queue.enqueue(Arc::new(PlaybackTask::new(
            clip,
            channel,
            looping,
            self.player.clone(),
        )));
        Ok(())
    }

    /// Orderly shutdown: inputs first, then channel workers
    pub fn shutdown(&mut self) {
        if self.terminated {
            return;
        }

        log::info!("Dispatcher: stopping {} input(s)", self.inputs.len());
        self.inputs.stop_all();
        log::info!("Dispatcher: inputs joined");

        let dropped = self.inbound.try_iter().count();
        if dropped > 0 {
            log::info!("Dispatcher: discarding {} command(s) received during shutdown", dropped);
        }

        log::info!("Dispatcher: stopping {} channel(s)", self.registry.len());
        self.registry.shutdown();

        self.terminated = true;
        log::info!("Dispatcher: shut down after {} command line(s)", self.received);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn report(error: &CommandError) {
    match error {
        CommandError::Unknown(_) | CommandError::Spawn { .. } => log::error!("{}", error),
        _ => log::warn!("{}", error),
    }
}
