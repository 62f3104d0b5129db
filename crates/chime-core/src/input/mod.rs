//! Input sources
//!
//! Each source runs on its own thread, reads lines and hands them to the
//! dispatcher through a [`CommandSender`]. Reads block for a bounded time so
//! the thread notices a stop request; a source that fails for good reports it
//! to the dispatcher instead of dying silently.
//!
//! ```text
//! serial line ─► InputHandle thread ─┐
//!                                    ├─► CommandSender ─► Dispatcher
//! console     ─► InputHandle thread ─┘
//! ```

mod console;
#[cfg(unix)]
mod serial;

pub use console::ConsoleSource;
#[cfg(unix)]
pub use serial::{find_device, SerialSource};

use crate::dispatcher::CommandSender;
use crate::error::InputError;
use crate::shutdown::StopFlag;
use std::thread::{self, JoinHandle};

/// Outcome of one bounded read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, without its terminator
    Line(String),
    /// Nothing arrived within the read bound
    Idle,
    /// The stream ended
    Eof,
}

/// A stream of command lines
pub trait LineSource: Send {
    /// Name used in logs and failure reports
    fn name(&self) -> &str;

    /// Read the next line, blocking for a bounded time
    ///
    /// Long internal waits (e.g. reconnect delays) must honour `stop`.
    fn read_line(&mut self, stop: &StopFlag) -> Result<LineRead, InputError>;
}

/// Outcome of waiting for a descriptor to become readable
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Ready,
    Timeout,
    /// Peer closed or device hung up, with nothing left to read
    HungUp,
}

/// Wait up to `timeout` for `fd` to become readable
#[cfg(unix)]
pub(crate) fn wait_readable(
    fd: std::os::unix::io::RawFd,
    timeout: std::time::Duration,
) -> std::io::Result<Readiness> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;

    let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if ready < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(Readiness::Timeout);
        }
        return Err(err);
    }
    if ready == 0 {
        return Ok(Readiness::Timeout);
    }

    // Pending data is read before a hangup is reported
    if pfd.revents & libc::POLLIN != 0 {
        Ok(Readiness::Ready)
    } else if pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
        Ok(Readiness::HungUp)
    } else {
        Ok(Readiness::Timeout)
    }
}

/// Splits a byte stream into lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Next complete line, `\r\n` or `\n` terminated
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.bytes.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Unterminated trailing data, for end of stream
    pub fn take_rest(&mut self) -> Option<String> {
        if self.bytes.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.bytes);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// Thread running one [`LineSource`]
///
/// When dropped, signals the thread to stop and waits for it.
pub struct InputHandle {
    name: String,
    stop: StopFlag,
    handle: Option<JoinHandle<()>>,
}

impl InputHandle {
    /// Spawn a reader thread feeding `sink`
    pub fn spawn(source: Box<dyn LineSource>, sink: CommandSender) -> std::io::Result<Self> {
        let name = source.name().to_string();
        let stop = StopFlag::new();
        let thread_stop = stop.clone();

        let handle = thread::Builder::new()
            .name(format!("input-{}", name))
            .spawn(move || read_loop(source, sink, thread_stop))?;

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the reader thread is still running
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Ask the thread to stop without waiting
    pub fn request_stop(&self) {
        self.stop.request();
    }

    /// Wait for the thread to finish
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("[input {}] Waiting for reader thread to stop...", self.name);
            if handle.join().is_err() {
                log::error!("[input {}] Reader thread panicked", self.name);
            }
        }
    }

    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }
}

impl Drop for InputHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(mut source: Box<dyn LineSource>, sink: CommandSender, stop: StopFlag) {
    let name = source.name().to_string();
    log::info!("[input {}] Reader started", name);

    while !stop.is_requested() {
        match source.read_line(&stop) {
            Ok(LineRead::Line(line)) => {
                if !sink.add_command(line) {
                    log::debug!("[input {}] Dispatcher gone", name);
                    break;
                }
            }
            Ok(LineRead::Idle) => {}
            Ok(LineRead::Eof) => {
                log::info!("[input {}] End of stream", name);
                sink.report_ended(&name);
                break;
            }
            Err(e) => {
                log::error!("[input {}] {}", name, e);
                sink.report_failure(&name, e);
                break;
            }
        }
    }

    log::info!("[input {}] Reader stopped", name);
}

/// All registered input threads
#[derive(Default)]
pub struct InputSet {
    handles: Vec<InputHandle>,
}

impl InputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: InputHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every source, then join them all
    pub fn stop_all(&mut self) {
        for handle in &self.handles {
            handle.request_stop();
        }
        for mut handle in self.handles.drain(..) {
            handle.join();
            log::info!("[input {}] Joined", handle.name());
        }
    }
}
