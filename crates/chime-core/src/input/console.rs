//! Console input: commands typed on standard input
//!
//! On Unix the descriptor is polled with a timeout before each read, so a stop
//! request is noticed without waiting for another line. Elsewhere the read
//! blocks until the next line arrives.

use super::{LineBuffer, LineRead, LineSource};
#[cfg(unix)]
use super::{wait_readable, Readiness};
use crate::error::InputError;
use crate::shutdown::StopFlag;
use std::time::Duration;

pub struct ConsoleSource {
    poll_interval: Duration,
    buffer: LineBuffer,
    eof: bool,
}

impl ConsoleSource {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            buffer: LineBuffer::new(),
            eof: false,
        }
    }

    /// Next buffered line, or the unterminated rest once stdin has closed
    fn buffered_line(&mut self) -> Option<LineRead> {
        if let Some(line) = self.buffer.next_line() {
            return Some(LineRead::Line(line));
        }
        if self.eof {
            return Some(match self.buffer.take_rest() {
                Some(rest) => LineRead::Line(rest),
                None => LineRead::Eof,
            });
        }
        None
    }

    #[cfg(unix)]
    fn fill(&mut self) -> Result<bool, InputError> {
        // A hangup still needs the read below to observe end of stream
        match wait_readable(libc::STDIN_FILENO, self.poll_interval)? {
            Readiness::Timeout => return Ok(false),
            Readiness::Ready | Readiness::HungUp => {}
        }

        let mut chunk = [0u8; 1024];
        let n = unsafe {
            libc::read(
                libc::STDIN_FILENO,
                chunk.as_mut_ptr() as *mut libc::c_void,
                chunk.len(),
            )
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err.into());
        }
        if n == 0 {
            self.eof = true;
        } else {
            self.buffer.push(&chunk[..n as usize]);
        }
        Ok(true)
    }

    #[cfg(not(unix))]
    fn fill(&mut self) -> Result<bool, InputError> {
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            self.eof = true;
        } else {
            self.buffer.push(line.as_bytes());
        }
        Ok(true)
    }
}

impl LineSource for ConsoleSource {
    fn name(&self) -> &str {
        "console"
    }

    fn read_line(&mut self, _stop: &StopFlag) -> Result<LineRead, InputError> {
        if let Some(read) = self.buffered_line() {
            return Ok(read);
        }
        if !self.fill()? {
            return Ok(LineRead::Idle);
        }
        Ok(self.buffered_line().unwrap_or(LineRead::Idle))
    }
}
