//! Chime Core - Multi-channel clip dispatcher
//!
//! Plays short sound clips through an external player program on independent,
//! named channels. Commands arrive as text lines from any number of input
//! sources and are interpreted by a single [`Dispatcher`]:
//!
//! ```text
//! serial / console ─► CommandSender ─► Dispatcher ─► ChannelRegistry
//!                                                        │
//!                                   ┌────────────────────┼──────────────┐
//!                                   ▼                    ▼              ▼
//!                              ChannelQueue a       ChannelQueue b     ...
//!                              (worker thread)      (worker thread)
//!                                   │
//!                                   ▼
//!                              PlaybackTask ─► Player ─► external process
//! ```
//!
//! Each channel plays at most one clip at a time; channels play concurrently.
//! `play` on a busy channel preempts whatever it is doing.

pub mod announce;
pub mod channel;
pub mod clip;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod input;
pub mod player;
pub mod registry;
pub mod shutdown;
pub mod task;
pub mod volume;

#[cfg(test)]
mod test_support;

pub use announce::Announcer;
pub use channel::ChannelQueue;
pub use clip::{ChannelId, Clip, SoundLibrary};
pub use command::Command;
pub use config::ChimeConfig;
pub use dispatcher::{ChannelStatus, CommandSender, Dispatcher, Flow, Inbound};
pub use error::{ChimeError, CommandError, InputError, PlaybackError, ResolveError};
pub use player::{CommandLauncher, Launcher, Player, PlayerProcess};
pub use registry::ChannelRegistry;
pub use shutdown::StopFlag;
pub use task::PlaybackTask;
pub use volume::VolumeAdjuster;
