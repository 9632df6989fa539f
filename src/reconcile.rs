//! Snapshot reconciliation for hosts that drop connect/disconnect events
//!
//! Some host environments fail to deliver attach or detach notifications
//! for certain transports. The reconciler papers over that generically:
//! compare the last-known connected-device set with the current one and
//! synthesize [`HostEvent`]s for the deltas.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::manager::DeviceManager;
use crate::types::{DeviceHandle, HostEvent, UsbDeviceDescriptor};

/// Sleep slice between stop-flag checks while waiting out the interval
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Stateful snapshot differ
#[derive(Default)]
pub struct Reconciler {
    last_seen: HashSet<DeviceHandle>,
}

impl Reconciler {
    /// Create a differ with an empty snapshot (the first round reports
    /// every current device as an arrival)
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `current` against the previous snapshot and return synthetic
    /// events for the deltas: departures as `Detached`, arrivals as
    /// `Attached`
    pub fn diff(&mut self, current: Vec<UsbDeviceDescriptor>) -> Vec<HostEvent> {
        let current_handles: HashSet<DeviceHandle> =
            current.iter().map(|desc| desc.handle).collect();

        let mut events = Vec::new();
        for handle in &self.last_seen {
            if !current_handles.contains(handle) {
                events.push(HostEvent::Detached(*handle));
            }
        }
        for descriptor in current {
            if !self.last_seen.contains(&descriptor.handle) {
                events.push(HostEvent::Attached(descriptor));
            }
        }

        if !events.is_empty() {
            debug!("Reconciler found {} device set changes", events.len());
        }
        self.last_seen = current_handles;
        events
    }
}

/// Handle for a background reconciliation task.
///
/// The task stops (and its thread is joined) on [`stop`](Self::stop) or
/// drop.
pub struct ReconcilerTask {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReconcilerTask {
    /// Stop the task and wait for its thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ReconcilerTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run [`DeviceManager::reconcile_now`] every `interval` on a background
/// thread until the returned handle is stopped or dropped
pub fn spawn_reconciler(manager: Arc<DeviceManager>, interval: Duration) -> ReconcilerTask {
    let running = Arc::new(AtomicBool::new(true));
    let thread_running = Arc::clone(&running);
    let thread = std::thread::Builder::new()
        .name("hid-reconciler".into())
        .spawn(move || {
            debug!("Reconciler task started");
            while thread_running.load(Ordering::Relaxed) {
                let deadline = Instant::now() + interval;
                while thread_running.load(Ordering::Relaxed) && Instant::now() < deadline {
                    std::thread::sleep(POLL_SLICE);
                }
                if thread_running.load(Ordering::Relaxed) {
                    manager.reconcile_now();
                }
            }
            debug!("Reconciler task exiting");
        })
        .expect("Failed to spawn reconciler thread");

    ReconcilerTask {
        running,
        thread: Some(thread),
    }
}
