//! Outbound callback surface toward the native application layer

use crate::types::{DeviceId, DeviceInfo};

/// The fixed notification surface the consumer registers with the manager.
///
/// Implementations must be cheap and non-blocking: `input_report` fires on
/// each session's reader thread, everything else on whichever thread drives
/// the dispatcher. Calling back into the manager from inside a notification
/// is allowed for the ID-keyed operations but will deadlock if it tries to
/// close the session currently delivering the notification.
pub trait EventSink: Send + Sync {
    /// A classified device was registered
    fn device_connected(&self, info: &DeviceInfo);

    /// An open is waiting on an asynchronous permission grant
    fn device_open_pending(&self, id: DeviceId);

    /// The asynchronous open sequence finished
    fn device_open_result(&self, id: DeviceId, success: bool);

    /// The device was unregistered (detach, or a stale ID was used)
    fn device_disconnected(&self, id: DeviceId);

    /// One input report, truncated to the bytes actually read
    fn input_report(&self, id: DeviceId, data: &[u8]);

    /// Payload retrieved by a feature-report read
    fn feature_report(&self, id: DeviceId, data: &[u8]);
}
