//! Per-channel playback queue
//!
//! Each channel owns one worker thread that takes tasks from a FIFO and runs
//! them one at a time, so at most one task is current per channel.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher thread                         Worker thread ("channel-a")
//!     │ enqueue ──► pending (crossbeam) ──►  select! ─► mark current ─► task.start()
//!     │ clear / kill_current ──► slot (Mutex)  ▲
//!     │ stop ──► drop cancel sender ───────────┘
//! ```
//!
//! Shutdown wakes the worker through a dedicated cancellation channel observed
//! in the same `select!` as the pending queue, so no fake task is needed.
//!
//! `clear` bumps an epoch under the slot lock. A task the worker has already
//! received but not yet marked current carries the old epoch and is dropped
//! instead of run, which keeps clear-then-kill atomic for the dispatcher.

use crate::clip::{ChannelId, Clip};
use crate::task::PlaybackTask;
use crossbeam::channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Task travelling through the pending queue
struct Queued {
    task: Arc<PlaybackTask>,
    epoch: u64,
}

#[derive(Default)]
struct Slot {
    current: Option<Arc<PlaybackTask>>,
    epoch: u64,
}

/// State shared between the owning handle and the worker
struct ChannelShared {
    slot: Mutex<Slot>,
    stopping: AtomicBool,
}

impl ChannelShared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to one channel's queue and worker thread
///
/// When dropped, stops the worker and waits for it.
pub struct ChannelQueue {
    id: ChannelId,
    pending_tx: Sender<Queued>,
    /// Dispatcher-side receiver, used only to drain pending tasks
    pending_rx: Receiver<Queued>,
    shared: Arc<ChannelShared>,
    /// Dropped to wake the worker for shutdown
    cancel_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelQueue {
    /// Create the queue and start its worker thread
    pub fn spawn(id: ChannelId) -> std::io::Result<Self> {
        let (pending_tx, pending_rx) = crossbeam::channel::unbounded::<Queued>();
        let (cancel_tx, cancel_rx) = crossbeam::channel::bounded::<()>(0);
        let shared = Arc::new(ChannelShared {
            slot: Mutex::new(Slot::default()),
            stopping: AtomicBool::new(false),
        });

        let worker_rx = pending_rx.clone();
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("channel-{}", id))
            .spawn(move || worker_loop(id, worker_rx, cancel_rx, worker_shared))?;

        log::debug!("[channel {}] Worker started", id);

        Ok(Self {
            id,
            pending_tx,
            pending_rx,
            shared,
            cancel_tx: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Append a task to the pending queue
    ///
    /// Does not touch the running task; preemption is `clear` + `kill_current`.
    pub fn enqueue(&self, task: Arc<PlaybackTask>) {
        if self.shared.stopping.load(Ordering::SeqCst) {
            log::warn!("[channel {}] Stopped, dropping {}", self.id, task.clip());
            return;
        }
        let epoch = self.shared.lock_slot().epoch;
        // Both ends are owned by this handle, so the queue cannot be disconnected
        let _ = self.pending_tx.send(Queued { task, epoch });
    }

    /// Discard every pending task without running it
    ///
    /// Returns how many queued tasks were dropped.
    pub fn clear(&self) -> usize {
        let mut slot = self.shared.lock_slot();
        slot.epoch += 1;
        let dropped = self.pending_rx.try_iter().count();
        if dropped > 0 {
            log::debug!("[channel {}] Cleared {} pending task(s)", self.id, dropped);
        }
        dropped
    }

    /// Kill the running task, if any; the pending queue is untouched
    pub fn kill_current(&self) {
        let current = self.shared.lock_slot().current.clone();
        if let Some(task) = current {
            task.kill();
        }
    }

    /// Whether a task is currently running on this channel
    pub fn is_busy(&self) -> bool {
        self.shared.lock_slot().current.is_some()
    }

    /// Clip of the running task
    pub fn current_clip(&self) -> Option<Clip> {
        self.shared
            .lock_slot()
            .current
            .as_ref()
            .map(|task| task.clip().clone())
    }

    /// Number of tasks waiting behind the current one
    pub fn pending_len(&self) -> usize {
        self.pending_rx.len()
    }

    /// Whether the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the worker: drop pending, kill current, wake the worker and join it
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.shared.stopping.store(true, Ordering::SeqCst);
        self.clear();
        self.kill_current();
        drop(self.cancel_tx.take());

        log::debug!("[channel {}] Waiting for worker to stop...", self.id);
        if handle.join().is_err() {
            log::error!("[channel {}] Worker panicked", self.id);
        }
        log::info!("[channel {}] Stopped", self.id);
    }
}

impl Drop for ChannelQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop: one task at a time until cancelled
fn worker_loop(
    id: ChannelId,
    pending_rx: Receiver<Queued>,
    cancel_rx: Receiver<()>,
    shared: Arc<ChannelShared>,
) {
    loop {
        crossbeam::select! {
            recv(pending_rx) -> msg => match msg {
                Ok(queued) => run_one(id, queued, &shared),
                Err(_) => break,
            },
            recv(cancel_rx) -> _ => break,
        }

        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
    }

    log::debug!("[channel {}] Worker exiting", id);
}

fn run_one(id: ChannelId, queued: Queued, shared: &ChannelShared) {
    let task = {
        let mut slot = shared.lock_slot();
        if shared.stopping.load(Ordering::SeqCst) || queued.epoch != slot.epoch {
            log::debug!("[channel {}] Skipping cleared task {}", id, queued.task.clip());
            return;
        }
        slot.current = Some(queued.task.clone());
        queued.task
    };

    log::info!(
        "[channel {}] {} {}",
        id,
        if task.is_looping() { "Looping" } else { "Playing" },
        task.clip()
    );
    let iterations = task.start();
    log::debug!("[channel {}] {} done after {} run(s)", id, task.clip(), iterations);

    shared.lock_slot().current = None;
}
