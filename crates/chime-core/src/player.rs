//! External player processes
//!
//! A [`Launcher`] starts one player process per clip iteration. The returned
//! [`PlayerProcess`] is polled for exit and can be asked to terminate.
//! [`CommandLauncher`] runs a real executable with the clip path as its only
//! argument; tests substitute their own launcher.

use crate::clip::Clip;
use crate::error::{PlaybackError, PlaybackResult};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

/// A running player process
pub trait PlayerProcess: Send {
    /// OS process id, for logging
    fn id(&self) -> u32;

    /// Non-blocking exit check; `Ok(true)` once the process has exited and been reaped
    fn try_wait(&mut self) -> PlaybackResult<bool>;

    /// Ask the process to terminate (SIGTERM on Unix)
    fn terminate(&mut self) -> PlaybackResult<()>;
}

/// Starts player processes
pub trait Launcher: Send + Sync {
    fn launch(&self, clip: &Clip) -> PlaybackResult<Box<dyn PlayerProcess>>;
}

/// Launcher plus the exit-polling interval, shared by every task
#[derive(Clone)]
pub struct Player {
    launcher: Arc<dyn Launcher>,
    poll_interval: Duration,
}

impl Player {
    pub fn new(launcher: Arc<dyn Launcher>, poll_interval: Duration) -> Self {
        Self {
            launcher,
            poll_interval,
        }
    }

    pub fn launch(&self, clip: &Clip) -> PlaybackResult<Box<dyn PlayerProcess>> {
        self.launcher.launch(clip)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Launches a configured executable, e.g. `afplay <clip>`
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, clip: &Clip) -> PlaybackResult<Box<dyn PlayerProcess>> {
        let child = Command::new(&self.program)
            .arg(clip.path())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| PlaybackError::Launch {
                program: self.program.clone(),
                source,
            })?;

        log::debug!("Player: launched {} (pid {}) for {}", self.program, child.id(), clip);
        Ok(Box::new(ChildProcess { child }))
    }
}

/// [`PlayerProcess`] backed by a `std::process::Child`
struct ChildProcess {
    child: Child,
}

impl PlayerProcess for ChildProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> PlaybackResult<bool> {
        match self.child.try_wait().map_err(PlaybackError::Wait)? {
            Some(status) => {
                log::debug!("Player: pid {} exited with {}", self.child.id(), status);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> PlaybackResult<()> {
        let pid = self.child.id();
        // The child is not reaped until try_wait observes it, so the pid
        // cannot have been reused yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(PlaybackError::Signal {
                pid,
                source: std::io::Error::last_os_error(),
            })
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> PlaybackResult<()> {
        let pid = self.child.id();
        self.child
            .kill()
            .map_err(|source| PlaybackError::Signal { pid, source })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_exit(process: &mut Box<dyn PlayerProcess>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if process.try_wait().unwrap() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_launch_and_natural_exit() {
        let launcher = CommandLauncher::new("true");
        let mut process = launcher.launch(&Clip::from_path("ignored")).unwrap();
        assert!(wait_exit(&mut process, Duration::from_secs(5)));
    }

    #[test]
    fn test_terminate_running_process() {
        // `sleep 30` stands in for a long clip
        let launcher = CommandLauncher::new("sleep");
        let mut process = launcher.launch(&Clip::from_path("30")).unwrap();
        assert!(!process.try_wait().unwrap());

        process.terminate().unwrap();
        assert!(wait_exit(&mut process, Duration::from_secs(5)));
    }

    #[test]
    fn test_launch_missing_program() {
        let launcher = CommandLauncher::new("/nonexistent/player-binary");
        match launcher.launch(&Clip::from_path("x.wav")) {
            Err(PlaybackError::Launch { program, .. }) => {
                assert_eq!(program, "/nonexistent/player-binary")
            }
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("launch should fail"),
        }
    }
}
