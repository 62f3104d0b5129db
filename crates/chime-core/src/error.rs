//! Error types for the clip dispatcher

use crate::clip::ChannelId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors resolving a file token to a playable clip
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Token was empty or reduced to nothing after stripping directories
    #[error("Empty sound file name")]
    EmptyName,

    /// No file with this name in the sounds directory
    #[error("Sound file '{token}' not found (looked for {path})")]
    NotFound { token: String, path: PathBuf },
}

/// Errors parsing or validating a command line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Missing sound file")]
    MissingFile,

    #[error("Missing channel name")]
    MissingChannel,

    #[error("Channel name must be exactly one character, got '{0}'")]
    InvalidChannel(String),

    #[error("Unknown command '{0}'")]
    Unknown(String),

    #[error("Channel {0} not found")]
    UnknownChannel(ChannelId),

    #[error("Failed to start worker for channel {channel}: {reason}")]
    Spawn { channel: ChannelId, reason: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Errors launching or signalling the external player
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal player process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for player process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Errors raised by input sources
#[derive(Error, Debug)]
pub enum InputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device {device} disconnected: {reason}")]
    Disconnected { device: String, reason: String },

    #[error("Gave up reconnecting to {device} after {attempts} attempt(s)")]
    ReconnectExhausted { device: String, attempts: u32 },
}

/// Top-level error returned by the dispatcher loop
#[derive(Error, Debug)]
pub enum ChimeError {
    #[error("Input source '{source_name}' failed: {error}")]
    SourceFailed { source_name: String, error: InputError },

    #[error("Command queue closed unexpectedly")]
    QueueClosed,
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;
