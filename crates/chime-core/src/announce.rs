//! Spoken status messages through an optional text-to-speech program

use std::process::{Command, Stdio};

#[derive(Debug, Clone, Default)]
pub struct Announcer {
    command: Option<String>,
}

impl Announcer {
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }

    /// Announcer that never speaks
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.command.is_some()
    }

    /// Speak `text`, waiting for the program to finish
    ///
    /// Failures are logged and otherwise ignored.
    pub fn say(&self, text: &str) {
        log::info!("Announce: {}", text);
        let Some(program) = &self.command else {
            return;
        };

        match Command::new(program)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
        {
            Ok(status) if !status.success() => {
                log::debug!("Announce: {} exited with {}", program, status)
            }
            Ok(_) => {}
            Err(e) => log::debug!("Announce: failed to run {}: {}", program, e),
        }
    }
}
