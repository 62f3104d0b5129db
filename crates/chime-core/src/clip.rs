//! Channel identifiers, clips and sound file resolution

use crate::error::{CommandError, ResolveError};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Single-character playback lane name, always lower case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(char);

impl ChannelId {
    /// Build from a character, folding case
    pub fn new(c: char) -> Self {
        Self(c.to_lowercase().next().unwrap_or(c))
    }

    /// Parse a channel token: must be exactly one character after case folding
    pub fn parse(token: &str) -> Result<Self, CommandError> {
        let folded = token.to_lowercase();
        let mut chars = folded.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Self(c)),
            _ => Err(CommandError::InvalidChannel(token.to_string())),
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved, playable sound file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    path: PathBuf,
}

impl Clip {
    /// Wrap a path without checking it; resolution goes through [`SoundLibrary`]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for log messages
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolves file tokens (or their aliases) to clips inside the sounds directory
#[derive(Debug, Clone)]
pub struct SoundLibrary {
    sounds_dir: PathBuf,
    aliases: BTreeMap<String, String>,
}

impl SoundLibrary {
    pub fn new(sounds_dir: impl Into<PathBuf>, aliases: BTreeMap<String, String>) -> Self {
        let sounds_dir = sounds_dir.into();
        // Relative directories are anchored once so clip paths stay absolute
        let sounds_dir = std::path::absolute(&sounds_dir).unwrap_or(sounds_dir);
        Self {
            sounds_dir,
            aliases,
        }
    }

    pub fn sounds_dir(&self) -> &Path {
        &self.sounds_dir
    }

    /// Expand a short code to its file name, or return the token unchanged
    pub fn expand_alias<'a>(&'a self, token: &'a str) -> &'a str {
        self.aliases.get(token).map(String::as_str).unwrap_or(token)
    }

    /// Resolve a file token to an existing file in the sounds directory
    ///
    /// Any directory part of the token is dropped, so clips can never escape
    /// the sounds directory.
    pub fn resolve(&self, token: &str) -> Result<Clip, ResolveError> {
        let expanded = self.expand_alias(token);
        let file_name = Path::new(expanded)
            .file_name()
            .ok_or(ResolveError::EmptyName)?;

        let path = self.sounds_dir.join(file_name);
        if !path.is_file() {
            return Err(ResolveError::NotFound {
                token: token.to_string(),
                path,
            });
        }

        if expanded != token {
            log::debug!("SoundLibrary: alias '{}' -> {}", token, expanded);
        }
        Ok(Clip { path })
    }
}
