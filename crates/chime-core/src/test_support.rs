//! Fake player used by the scheduling tests
//!
//! Records every launch, termination and natural exit, and tracks how many
//! fake processes are alive at once.

use crate::clip::Clip;
use crate::error::{PlaybackError, PlaybackResult};
use crate::player::{Launcher, Player, PlayerProcess};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Launched { clip: String, pid: u32 },
    Terminated { clip: String, pid: u32 },
    Exited { clip: String, pid: u32 },
}

#[derive(Default)]
struct FakeState {
    events: Vec<FakeEvent>,
    next_pid: u32,
    running: usize,
    max_running: usize,
}

/// Launcher whose processes live for a configured time per clip name
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<FakeState>>,
    /// Clip name -> lifetime; unlisted clips run until terminated
    durations: Arc<Mutex<HashMap<String, Duration>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        init_logging();
        Self::default()
    }

    /// Make processes for `clip` exit by themselves after `lifetime`
    pub fn with_duration(self, clip: &str, lifetime: Duration) -> Self {
        self.durations
            .lock()
            .unwrap()
            .insert(clip.to_string(), lifetime);
        self
    }

    pub fn player(&self) -> Player {
        Player::new(Arc::new(self.clone()), Duration::from_millis(2))
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn launches_of(&self, clip: &str) -> usize {
        self.count(|e| matches!(e, FakeEvent::Launched { clip: c, .. } if c == clip))
    }

    pub fn terminations_of(&self, clip: &str) -> usize {
        self.count(|e| matches!(e, FakeEvent::Terminated { clip: c, .. } if c == clip))
    }

    pub fn running(&self) -> usize {
        self.state.lock().unwrap().running
    }

    pub fn max_running(&self) -> usize {
        self.state.lock().unwrap().max_running
    }

    fn count(&self, pred: impl Fn(&FakeEvent) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, clip: &Clip) -> PlaybackResult<Box<dyn PlayerProcess>> {
        let name = clip.name();
        let lifetime = self.durations.lock().unwrap().get(&name).copied();

        let mut state = self.state.lock().unwrap();
        state.next_pid += 1;
        let pid = state.next_pid;
        state.running += 1;
        state.max_running = state.max_running.max(state.running);
        state.events.push(FakeEvent::Launched {
            clip: name.clone(),
            pid,
        });

        Ok(Box::new(FakeProcess {
            clip: name,
            pid,
            deadline: lifetime.map(|d| Instant::now() + d),
            terminated: false,
            reaped: false,
            state: self.state.clone(),
        }))
    }
}

struct FakeProcess {
    clip: String,
    pid: u32,
    deadline: Option<Instant>,
    terminated: bool,
    reaped: bool,
    state: Arc<Mutex<FakeState>>,
}

impl FakeProcess {
    fn reap(&mut self, natural: bool) {
        if self.reaped {
            return;
        }
        self.reaped = true;
        let mut state = self.state.lock().unwrap();
        state.running -= 1;
        if natural {
            state.events.push(FakeEvent::Exited {
                clip: self.clip.clone(),
                pid: self.pid,
            });
        }
    }
}

impl PlayerProcess for FakeProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> PlaybackResult<bool> {
        if self.terminated {
            self.reap(false);
            return Ok(true);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.reap(true);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn terminate(&mut self) -> PlaybackResult<()> {
        if self.reaped {
            return Err(PlaybackError::Signal {
                pid: self.pid,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such process"),
            });
        }
        self.terminated = true;
        self.state
            .lock()
            .unwrap()
            .events
            .push(FakeEvent::Terminated {
                clip: self.clip.clone(),
                pid: self.pid,
            });
        Ok(())
    }
}

/// Route log output through the test harness; RUST_LOG=debug to see it
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `cond` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub const TIMEOUT: Duration = Duration::from_secs(5);
