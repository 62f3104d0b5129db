//! Best-effort output volume setup
//!
//! Right after login the audio system may not accept volume changes yet, so
//! the command is retried until it succeeds once or the server shuts down.

use crate::config::VolumeConfig;
use crate::shutdown::StopFlag;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

pub struct VolumeAdjuster {
    stop: StopFlag,
    handle: Option<JoinHandle<()>>,
}

impl VolumeAdjuster {
    pub fn spawn(config: VolumeConfig) -> std::io::Result<Self> {
        let stop = StopFlag::new();
        let thread_stop = stop.clone();

        let handle = thread::Builder::new()
            .name("volume-adjuster".into())
            .spawn(move || run(config, thread_stop))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn stop(&mut self) {
        self.stop.request();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Volume: adjuster thread panicked");
            }
        }
    }
}

impl Drop for VolumeAdjuster {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(config: VolumeConfig, stop: StopFlag) {
    let args = config.expanded_args();
    let retry = std::time::Duration::from_millis(config.retry_interval_ms);
    let mut attempts = 0u32;

    while !stop.is_requested() {
        attempts += 1;
        match Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {
                log::info!("Volume: set to {} after {} attempt(s)", config.level, attempts);
                return;
            }
            Ok(status) => log::debug!("Volume: {} exited with {}", config.program, status),
            Err(e) => log::debug!("Volume: failed to run {}: {}", config.program, e),
        }

        if !stop.sleep(retry) {
            break;
        }
    }

    log::info!("Volume: gave up after {} attempt(s)", attempts);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{wait_until, TIMEOUT};

    fn config(program: &str) -> VolumeConfig {
        VolumeConfig {
            enabled: true,
            program: program.to_string(),
            args: vec![],
            retry_interval_ms: 5,
            ..VolumeConfig::default()
        }
    }

    #[test]
    fn test_finishes_on_success() {
        let adjuster = VolumeAdjuster::spawn(config("true")).unwrap();
        assert!(wait_until(TIMEOUT, || !adjuster.is_alive()));
    }

    #[test]
    fn test_retries_until_stopped() {
        let mut adjuster = VolumeAdjuster::spawn(config("false")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(30));
        assert!(adjuster.is_alive());
        adjuster.stop();
        assert!(!adjuster.is_alive());
    }

    #[test]
    fn test_stop_after_worker_panic() {
        crate::test_support::init_logging();
        let mut adjuster = VolumeAdjuster {
            stop: StopFlag::new(),
            handle: Some(thread::spawn(|| panic!("osascript wrapper crashed"))),
        };
        assert!(wait_until(TIMEOUT, || !adjuster.is_alive()));
        adjuster.stop();
        assert!(adjuster.handle.is_none());
    }
}
