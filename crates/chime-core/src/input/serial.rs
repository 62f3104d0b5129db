//! Serial line input from a USB microcontroller
//!
//! The device is found by scanning for configured path prefixes (e.g.
//! `/dev/tty.usbmodem*`). Until one shows up the source waits and retries.
//! Once connected, a vanished device is reopened a bounded number of times;
//! after that the failure is escalated so the server shuts down instead of
//! silently losing its main input.

use super::{wait_readable, LineBuffer, LineRead, LineSource, Readiness};
use crate::announce::Announcer;
use crate::config::SerialConfig;
use crate::error::InputError;
use crate::shutdown::StopFlag;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// First existing path starting with one of `prefixes`, in sorted order
pub fn find_device(prefixes: &[String]) -> Option<PathBuf> {
    prefixes.iter().find_map(|prefix| {
        let prefix = Path::new(prefix);
        let dir = prefix.parent()?;
        let stem = prefix.file_name()?.to_string_lossy().into_owned();

        let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&stem))
            .map(|entry| entry.path())
            .collect();
        matches.sort();
        matches.into_iter().next()
    })
}

struct Port {
    file: File,
    device: PathBuf,
}

pub struct SerialSource {
    config: SerialConfig,
    announcer: Announcer,
    port: Option<Port>,
    buffer: LineBuffer,
    connected_once: bool,
    waiting_logged: bool,
}

impl SerialSource {
    pub fn new(config: SerialConfig, announcer: Announcer) -> Self {
        Self {
            config,
            announcer,
            port: None,
            buffer: LineBuffer::new(),
            connected_once: false,
            waiting_logged: false,
        }
    }

    /// Apply debug-line and prefix filters; `None` drops the line
    fn accept(&self, line: &str) -> Option<String> {
        if self
            .config
            .ignore_prefixes
            .iter()
            .any(|p| !p.is_empty() && line.starts_with(p.as_str()))
        {
            log::trace!("[serial] Ignoring debug line: {}", line);
            return None;
        }

        match &self.config.prefix {
            Some(prefix) => line.strip_prefix(prefix.as_str()).map(str::to_string),
            None => Some(line.to_string()),
        }
    }

    /// Try to find and open the device once
    fn try_connect(&mut self) -> bool {
        let Some(device) = find_device(&self.config.device_prefixes) else {
            if !self.waiting_logged {
                log::info!(
                    "[serial] No device matching {:?}, waiting",
                    self.config.device_prefixes
                );
                self.waiting_logged = true;
            }
            return false;
        };

        match open_port(&device, self.config.baud, self.config.read_timeout()) {
            Ok(file) => {
                log::info!("[serial] Using {}", device.display());
                self.port = Some(Port { file, device });
                self.buffer = LineBuffer::new();
                self.connected_once = true;
                self.waiting_logged = false;
                self.announcer.say("serial device connected");
                true
            }
            Err(e) => {
                log::warn!("[serial] Failed to open {}: {}", device.display(), e);
                false
            }
        }
    }

    /// Device went away: reopen with bounded retries, or give up
    fn reconnect(&mut self, device: PathBuf, reason: String, stop: &StopFlag) -> Result<LineRead, InputError> {
        log::warn!("[serial] Device {} disappeared: {}", device.display(), reason);
        self.port = None;

        let attempts = self.config.reconnect_attempts;
        for attempt in 1..=attempts {
            if !stop.sleep(self.config.retry_interval()) {
                return Ok(LineRead::Idle);
            }
            log::info!("[serial] Reconnect attempt {}/{}", attempt, attempts);
            if self.try_connect() {
                return Ok(LineRead::Idle);
            }
        }

        self.announcer.say("serial device disconnected, exiting");
        if attempts == 0 {
            Err(InputError::Disconnected {
                device: device.display().to_string(),
                reason,
            })
        } else {
            Err(InputError::ReconnectExhausted {
                device: device.display().to_string(),
                attempts,
            })
        }
    }
}

impl LineSource for SerialSource {
    fn name(&self) -> &str {
        "serial"
    }

    fn read_line(&mut self, stop: &StopFlag) -> Result<LineRead, InputError> {
        loop {
            while let Some(line) = self.buffer.next_line() {
                if let Some(accepted) = self.accept(&line) {
                    return Ok(LineRead::Line(accepted));
                }
            }

            let Some(port) = self.port.as_mut() else {
                if !self.try_connect() {
                    stop.sleep(self.config.retry_interval());
                }
                return Ok(LineRead::Idle);
            };

            let device = port.device.clone();
            match wait_readable(port.file.as_raw_fd(), self.config.read_timeout()) {
                Ok(Readiness::Ready) => {}
                Ok(Readiness::Timeout) => return Ok(LineRead::Idle),
                Ok(Readiness::HungUp) => {
                    return self.reconnect(device, "device hung up".to_string(), stop);
                }
                Err(e) => return self.reconnect(device, e.to_string(), stop),
            }

            let mut chunk = [0u8; 256];
            match port.file.read(&mut chunk) {
                // Readable but empty: the line was hung up
                Ok(0) => return self.reconnect(device, "end of stream".to_string(), stop),
                Ok(n) => self.buffer.push(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(LineRead::Idle);
                }
                Err(e) => return self.reconnect(device, e.to_string(), stop),
            }
        }
    }
}

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return None,
    })
}

/// Open a tty in raw mode with the given baud rate and read timeout
fn open_port(device: &Path, baud: u32, read_timeout: Duration) -> std::io::Result<File> {
    let speed = baud_constant(baud).ok_or_else(|| {
        std::io::Error::new(ErrorKind::InvalidInput, format!("unsupported baud rate {}", baud))
    })?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(device)?;
    let fd = file.as_raw_fd();

    // VTIME is in tenths of a second, 1..=255
    let deciseconds = (read_timeout.as_millis() / 100).clamp(1, 255) as libc::cc_t;

    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut tio);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = deciseconds;
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(prefix: Option<&str>) -> SerialSource {
        let config = SerialConfig {
            prefix: prefix.map(str::to_string),
            ..SerialConfig::default()
        };
        SerialSource::new(config, Announcer::silent())
    }

    #[test]
    fn test_accept_filters() {
        let plain = source(None);
        assert_eq!(plain.accept("play chime a").as_deref(), Some("play chime a"));
        assert_eq!(plain.accept("A0=512"), None);

        let prefixed = source(Some("!"));
        assert_eq!(prefixed.accept("!play 4 b").as_deref(), Some("play 4 b"));
        assert_eq!(prefixed.accept("play 4 b"), None);
        assert_eq!(prefixed.accept("A0=!play"), None);
    }

    #[test]
    fn test_find_device_by_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ttyACM1"), b"").unwrap();
        std::fs::write(dir.path().join("ttyACM0"), b"").unwrap();
        std::fs::write(dir.path().join("ttyS0"), b"").unwrap();

        let prefixes = vec![
            dir.path().join("tty.usbmodem").display().to_string(),
            dir.path().join("ttyACM").display().to_string(),
        ];
        assert_eq!(find_device(&prefixes), Some(dir.path().join("ttyACM0")));

        let none = vec![dir.path().join("ttyUSB").display().to_string()];
        assert_eq!(find_device(&none), None);
    }

    #[test]
    fn test_open_regular_file_is_not_a_tty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ttyFAKE");
        std::fs::write(&path, b"").unwrap();
        assert!(open_port(&path, 115_200, Duration::from_millis(100)).is_err());
        assert!(open_port(&path, 12_345, Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_waits_without_device() {
        let dir = TempDir::new().unwrap();
        let config = SerialConfig {
            device_prefixes: vec![dir.path().join("ttyACM").display().to_string()],
            retry_interval_ms: 1,
            ..SerialConfig::default()
        };
        let mut serial = SerialSource::new(config, Announcer::silent());
        let stop = StopFlag::new();
        assert_eq!(serial.read_line(&stop).unwrap(), LineRead::Idle);
        assert_eq!(serial.read_line(&stop).unwrap(), LineRead::Idle);
        assert!(!serial.connected_once);
    }

    fn unreachable_device(dir: &TempDir, attempts: u32) -> SerialSource {
        let config = SerialConfig {
            device_prefixes: vec![dir.path().join("ttyACM").display().to_string()],
            retry_interval_ms: 1,
            reconnect_attempts: attempts,
            ..SerialConfig::default()
        };
        SerialSource::new(config, Announcer::silent())
    }

    #[test]
    fn test_reconnect_gives_up_after_attempts() {
        let dir = TempDir::new().unwrap();
        let mut serial = unreachable_device(&dir, 2);
        let result = serial.reconnect(dir.path().join("ttyACM0"), "gone".to_string(), &StopFlag::new());
        match result {
            Err(InputError::ReconnectExhausted { device, attempts }) => {
                assert_eq!(attempts, 2);
                assert!(device.ends_with("ttyACM0"));
            }
            other => panic!("expected ReconnectExhausted, got {:?}", other),
        }
        assert!(serial.port.is_none());
    }

    #[test]
    fn test_reconnect_without_attempts_disconnects() {
        let dir = TempDir::new().unwrap();
        let mut serial = unreachable_device(&dir, 0);
        let result = serial.reconnect(dir.path().join("ttyACM0"), "gone".to_string(), &StopFlag::new());
        assert!(matches!(result, Err(InputError::Disconnected { ref reason, .. }) if reason == "gone"));
    }

    #[test]
    fn test_reconnect_honours_stop() {
        let dir = TempDir::new().unwrap();
        let mut serial = unreachable_device(&dir, 5);
        let stop = StopFlag::new();
        stop.request();
        let result = serial.reconnect(dir.path().join("ttyACM0"), "gone".to_string(), &stop);
        assert_eq!(result.unwrap(), LineRead::Idle);
    }

    #[test]
    fn test_hung_up_line_is_a_disconnect() {
        let dir = TempDir::new().unwrap();
        // The device node stays in place, only the line is dead
        let device = dir.path().join("ttyACM0");
        std::fs::write(&device, b"").unwrap();

        let (reader, writer) = crate::input::tests::pipe();
        drop(writer);

        let config = SerialConfig {
            device_prefixes: vec![dir.path().join("ttyNONE").display().to_string()],
            retry_interval_ms: 1,
            reconnect_attempts: 0,
            ..SerialConfig::default()
        };
        let mut serial = SerialSource::new(config, Announcer::silent());
        serial.port = Some(Port { file: reader, device });

        let result = serial.read_line(&StopFlag::new());
        assert!(matches!(result, Err(InputError::Disconnected { .. })));
        assert!(serial.port.is_none());
    }

    #[test]
    fn test_buffered_lines_are_filtered() {
        let mut serial = source(None);
        serial.buffer.push(b"A0=100\nplay 1 c\n");
        let stop = StopFlag::new();
        assert_eq!(
            serial.read_line(&stop).unwrap(),
            LineRead::Line("play 1 c".to_string())
        );
    }
}
