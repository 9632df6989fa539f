//! Device registry and event dispatch
//!
//! [`DeviceManager`] owns every live [`DeviceSession`] and routes host
//! events and consumer calls to them. It is an explicitly constructed,
//! explicitly owned service: create one, hand out references, call
//! [`shutdown`](DeviceManager::shutdown) (or drop it) when done.
//!
//! All registry mutation happens under one lock so concurrent attach,
//! detach, and permission events never observe a half-updated state.
//! Blocking work (session teardown) and outward notifications run outside
//! the lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::classify;
use crate::host::HostBus;
use crate::ident::IdentifierRegistry;
use crate::reconcile::Reconciler;
use crate::session::DeviceSession;
use crate::sink::EventSink;
use crate::types::{DeviceHandle, DeviceId, HostEvent, SessionState, UsbDeviceDescriptor};

#[derive(Default)]
struct Registry {
    by_handle: HashMap<DeviceHandle, Arc<DeviceSession>>,
    by_id: HashMap<DeviceId, Arc<DeviceSession>>,
}

/// Tracks all live sessions and dispatches events to them.
///
/// At most one session exists per physical device identity; a session is
/// registered in both maps or in neither.
pub struct DeviceManager {
    bus: Arc<dyn HostBus>,
    sink: Arc<dyn EventSink>,
    ids: IdentifierRegistry,
    registry: Mutex<Registry>,
    reconciler: Mutex<Reconciler>,
}

impl DeviceManager {
    /// Create a manager over the given bus, notification sink, and
    /// identifier store
    pub fn new(
        bus: Arc<dyn HostBus>,
        sink: Arc<dyn EventSink>,
        ids: IdentifierRegistry,
    ) -> Self {
        Self {
            bus,
            sink,
            ids,
            registry: Mutex::new(Registry::default()),
            reconciler: Mutex::new(Reconciler::new()),
        }
    }

    /// Register every HID-compatible device currently on the bus
    pub fn scan(&self) {
        for descriptor in self.bus.devices() {
            self.handle_attached(descriptor);
        }
    }

    /// Feed one host event (attach, detach, permission result) through the
    /// dispatcher
    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::Attached(descriptor) => self.handle_attached(descriptor),
            HostEvent::Detached(handle) => self.handle_detached(handle),
            HostEvent::PermissionResult { handle, granted } => {
                self.handle_permission_result(handle, granted)
            }
        }
    }

    /// One reconciliation round against the bus: emits synthetic
    /// attach/detach events for devices that appeared or vanished without a
    /// host event
    pub fn reconcile_now(&self) {
        let current = self.bus.devices();
        let events = self.reconciler.lock().diff(current);
        for event in events {
            self.handle_event(event);
        }
    }

    /// IDs of all currently-registered sessions
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.registry.lock().by_id.keys().copied().collect()
    }

    fn handle_attached(&self, descriptor: UsbDeviceDescriptor) {
        let Some(interface_index) = classify::match_hid_interface(&descriptor) else {
            debug!(
                "Ignoring non-HID device {:04x}:{:04x}",
                descriptor.vendor_id, descriptor.product_id
            );
            return;
        };

        let identity = descriptor.identity();
        let id = match self.ids.allocate_or_get(&identity) {
            Ok(id) => id,
            Err(e) => {
                warn!("Dropping attach for {}: {}", identity, e);
                return;
            }
        };

        let session = Arc::new(DeviceSession::new(
            id,
            identity,
            descriptor,
            interface_index,
            Arc::clone(&self.sink),
        ));

        let stale = {
            let mut registry = self.registry.lock();
            if registry.by_handle.contains_key(&session.handle()) {
                debug!("Device {:?} already registered", session.handle());
                return;
            }
            // A session under the same ID means a detach was missed; the
            // new attach supersedes it
            let stale = registry.by_id.remove(&id);
            if let Some(old) = &stale {
                registry.by_handle.remove(&old.handle());
            }
            registry.by_handle.insert(session.handle(), Arc::clone(&session));
            registry.by_id.insert(id, Arc::clone(&session));
            stale
        };

        if let Some(old) = stale {
            debug!("Replacing stale session for {}", old.identity());
            old.detach();
            self.sink.device_disconnected(old.id());
        }

        info!("Device {} connected as ID {}", session.display_name(), id);
        self.sink.device_connected(&session.info());
    }

    fn handle_detached(&self, handle: DeviceHandle) {
        let session = {
            let mut registry = self.registry.lock();
            let Some(session) = registry.by_handle.remove(&handle) else {
                // Duplicate or unknown detach signal
                return;
            };
            registry.by_id.remove(&session.id());
            session
        };

        session.detach();
        info!("Device {} disconnected", session.display_name());
        self.sink.device_disconnected(session.id());
    }

    fn handle_permission_result(&self, handle: DeviceHandle, granted: bool) {
        let Some(session) = self.lookup_by_handle(handle) else {
            return;
        };

        let opened = if granted {
            match session.open(self.bus.as_ref()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "Open after permission grant failed for device {}: {}",
                        session.id(),
                        e
                    );
                    false
                }
            }
        } else {
            debug!("Permission denied for device {}", session.id());
            false
        };

        if !opened && session.state() == SessionState::PermissionPending {
            // Back to Attached so a later open() can retry the handshake
            session.set_state(SessionState::Attached);
        }
        self.sink.device_open_result(session.id(), opened);
    }

    /// Open a device session.
    ///
    /// Returns `true` only when the open completed synchronously. `false`
    /// means the session is gone, the open failed, or (when the host had no
    /// standing permission) an asynchronous permission request is now
    /// outstanding and the outcome will arrive via `device_open_result`.
    pub fn open(&self, id: DeviceId) -> bool {
        let Some(session) = self.lookup(id) else {
            self.sink.device_disconnected(id);
            return false;
        };

        if !self.bus.has_permission(session.handle()) {
            session.set_state(SessionState::PermissionPending);
            self.sink.device_open_pending(id);
            if let Err(e) = self.bus.request_permission(session.handle()) {
                warn!(
                    "Couldn't request permission for {}: {}",
                    session.display_name(),
                    e
                );
                session.set_state(SessionState::Attached);
                self.sink.device_open_result(id, false);
            }
            return false;
        }

        match session.open(self.bus.as_ref()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to open {}: {}", session.display_name(), e);
                false
            }
        }
    }

    /// Write an output report; returns bytes written or -1
    pub fn send_output_report(&self, id: DeviceId, report: &[u8]) -> i32 {
        let Some(session) = self.lookup(id) else {
            self.sink.device_disconnected(id);
            return -1;
        };
        match session.send_output_report(report) {
            Ok(written) => written as i32,
            Err(e) => {
                warn!("Output report to device {} failed: {}", id, e);
                -1
            }
        }
    }

    /// Send a feature report; returns bytes sent (report-ID slot included)
    /// or -1
    pub fn send_feature_report(&self, id: DeviceId, report: &[u8]) -> i32 {
        let Some(session) = self.lookup(id) else {
            self.sink.device_disconnected(id);
            return -1;
        };
        match session.send_feature_report(report) {
            Ok(sent) => sent as i32,
            Err(e) => {
                warn!("Feature report to device {} failed: {}", id, e);
                -1
            }
        }
    }

    /// Retrieve a feature report into `report`; the payload is also
    /// forwarded through the sink. Returns whether the transfer succeeded.
    pub fn get_feature_report(&self, id: DeviceId, report: &mut [u8]) -> bool {
        let Some(session) = self.lookup(id) else {
            self.sink.device_disconnected(id);
            return false;
        };
        match session.get_feature_report(report) {
            Ok(_) => true,
            Err(e) => {
                warn!("Feature report from device {} failed: {}", id, e);
                false
            }
        }
    }

    /// Close a device session (idempotent)
    pub fn close(&self, id: DeviceId) {
        let Some(session) = self.lookup(id) else {
            self.sink.device_disconnected(id);
            return;
        };
        session.close();
    }

    /// Suppress or resume input forwarding on every registered session
    pub fn set_frozen_all(&self, frozen: bool) {
        let sessions: Vec<_> = self.registry.lock().by_id.values().cloned().collect();
        for session in sessions {
            session.set_frozen(frozen);
        }
    }

    /// Tear down every session and clear the registry.
    ///
    /// Consumer-initiated, so no `device_disconnected` notifications are
    /// emitted. Also runs on drop.
    pub fn shutdown(&self) {
        let sessions = {
            let mut registry = self.registry.lock();
            let sessions: Vec<_> = registry.by_id.values().cloned().collect();
            registry.by_handle.clear();
            registry.by_id.clear();
            sessions
        };
        for session in sessions {
            session.detach();
        }
        info!("Device manager shut down");
    }

    fn lookup(&self, id: DeviceId) -> Option<Arc<DeviceSession>> {
        let session = self.registry.lock().by_id.get(&id).cloned();
        if session.is_none() {
            debug!("No session for device ID {}", id);
        }
        session
    }

    fn lookup_by_handle(&self, handle: DeviceHandle) -> Option<Arc<DeviceSession>> {
        self.registry.lock().by_handle.get(&handle).cloned()
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
