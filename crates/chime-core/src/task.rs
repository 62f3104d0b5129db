//! One scheduled playback of a clip
//!
//! A [`PlaybackTask`] is plain data run synchronously by its channel's worker
//! thread. `start` launches the player, waits for it to exit and repeats while
//! looping. `kill` may be called from any other thread at any time: it marks
//! the task stopped and terminates the live process, if there is one.
//!
//! The stop flag and the process handle share one mutex. A new iteration only
//! launches while holding it after checking the flag, so once `kill` has
//! returned no further process is started.

use crate::clip::{ChannelId, Clip};
use crate::player::{Player, PlayerProcess};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct TaskState {
    stopped: bool,
    process: Option<Box<dyn PlayerProcess>>,
}

pub struct PlaybackTask {
    clip: Clip,
    channel: ChannelId,
    looping: bool,
    player: Player,
    state: Mutex<TaskState>,
}

impl PlaybackTask {
    pub fn new(clip: Clip, channel: ChannelId, looping: bool, player: Player) -> Self {
        Self {
            clip,
            channel,
            looping,
            player,
            state: Mutex::new(TaskState::default()),
        }
    }

    pub fn clip(&self) -> &Clip {
        &self.clip
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_stopped(&self) -> bool {
        self.lock_state().stopped
    }

    /// Whether a player process is currently alive for this task
    pub fn has_process(&self) -> bool {
        self.lock_state().process.is_some()
    }

    fn lock_state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run the clip to completion, repeating while looping
    ///
    /// Blocks the calling thread. Returns the number of player processes launched.
    pub fn start(&self) -> u32 {
        let mut iterations = 0u32;

        loop {
            {
                let mut state = self.lock_state();
                if state.stopped {
                    break;
                }
                match self.player.launch(&self.clip) {
                    Ok(process) => {
                        log::debug!(
                            "[channel {}] {} iteration {} (pid {})",
                            self.channel,
                            self.clip,
                            iterations + 1,
                            process.id()
                        );
                        state.process = Some(process);
                    }
                    Err(e) => {
                        log::error!("[channel {}] {}", self.channel, e);
                        break;
                    }
                }
            }
            iterations += 1;

            self.wait_for_exit();

            if !self.looping || self.is_stopped() {
                break;
            }
        }

        iterations
    }

    /// Poll the live process until it exits, releasing the lock between polls
    fn wait_for_exit(&self) {
        loop {
            {
                let mut state = self.lock_state();
                let Some(process) = state.process.as_mut() else {
                    return;
                };
                match process.try_wait() {
                    Ok(true) => {
                        state.process = None;
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        log::error!("[channel {}] {}", self.channel, e);
                        state.process = None;
                        return;
                    }
                }
            }
            std::thread::sleep(self.player.poll_interval());
        }
    }

    /// Stop the task and terminate its process
    ///
    /// Safe to call concurrently with `start`, and more than once.
    pub fn kill(&self) {
        let mut state = self.lock_state();
        state.stopped = true;

        let Some(process) = state.process.as_mut() else {
            return;
        };
        match process.terminate() {
            Ok(()) => log::info!(
                "[channel {}] Terminated {} (pid {})",
                self.channel,
                self.clip,
                process.id()
            ),
            // Already gone: the process is not running, which is what we wanted
            Err(e) => log::warn!("[channel {}] {}", self.channel, e),
        }
    }
}

impl std::fmt::Debug for PlaybackTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackTask")
            .field("clip", &self.clip)
            .field("channel", &self.channel)
            .field("looping", &self.looping)
            .finish_non_exhaustive()
    }
}
