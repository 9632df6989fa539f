//! Per-device connection lifecycle and report I/O
//!
//! One [`DeviceSession`] per physical device, owned by the manager's
//! registry. The session drives the attach → permission → open → closed
//! lifecycle, serializes report transfers against the host connection, and
//! runs one background reader thread per open device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::HidError;
use crate::host::{usb, HostBus, HostConnection, TRANSFER_TIMEOUT};
use crate::sink::EventSink;
use crate::types::{
    DeviceHandle, DeviceId, DeviceInfo, EndpointDirection, SessionState, UsbDeviceDescriptor,
};

/// Timeout for one reader-loop read. Also bounds how long `close()` waits
/// for the reader thread to notice the stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Transport state of an open session
struct SessionIo {
    conn: Arc<dyn HostConnection>,
    output_endpoint: u8,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// One physical device's connection lifecycle.
///
/// Construction happens on attach (after classification); the session is
/// then driven by the manager: `open` on consumer request or permission
/// grant, `close` on consumer request, `detach` when the device disappears.
pub struct DeviceSession {
    id: DeviceId,
    identity: String,
    descriptor: UsbDeviceDescriptor,
    interface_index: usize,
    state: Mutex<SessionState>,
    frozen: Arc<AtomicBool>,
    io: Mutex<Option<SessionIo>>,
    sink: Arc<dyn EventSink>,
}

impl DeviceSession {
    pub(crate) fn new(
        id: DeviceId,
        identity: String,
        descriptor: UsbDeviceDescriptor,
        interface_index: usize,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id,
            identity,
            descriptor,
            interface_index,
            state: Mutex::new(SessionState::Attached),
            frozen: Arc::new(AtomicBool::new(false)),
            io: Mutex::new(None),
            sink,
        }
    }

    /// Registered device ID
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Stable identity string
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Native handle used for event routing
    pub fn handle(&self) -> DeviceHandle {
        self.descriptor.handle
    }

    /// Static descriptor snapshot
    pub fn descriptor(&self) -> &UsbDeviceDescriptor {
        &self.descriptor
    }

    /// Index of the matched HID interface
    pub fn interface_index(&self) -> usize {
        self.interface_index
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Human-readable name for log messages
    pub fn display_name(&self) -> String {
        self.descriptor.display_name()
    }

    /// Metadata for the `device_connected` notification
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id,
            identity: self.identity.clone(),
            vendor_id: self.descriptor.vendor_id,
            product_id: self.descriptor.product_id,
            serial: self.descriptor.serial_number(),
            version: self.descriptor.version,
            manufacturer: self.descriptor.manufacturer_name(),
            product: self.descriptor.product_name(),
            interface_index: self.interface_index,
            kind: self.descriptor.kind,
        }
    }

    /// Open the transport: claim every interface, resolve the input/output
    /// endpoints of the matched interface, start the reader loop.
    ///
    /// Requires standing permission on the bus. Idempotent while open;
    /// reopening after `close()` runs the full sequence again.
    pub fn open(&self, bus: &dyn HostBus) -> Result<(), HidError> {
        let mut io = self.io.lock();
        if io.is_some() {
            return Ok(());
        }

        let conn = bus.open(self.descriptor.handle)?;

        // Claim all interfaces up front; a single failure aborts the open
        for index in 0..self.descriptor.interfaces.len() {
            if let Err(e) = conn.claim_interface(index) {
                warn!(
                    "Failed to claim interface {} on {}: {}",
                    index,
                    self.display_name(),
                    e
                );
                release_interfaces(conn.as_ref(), index);
                return Err(HidError::ClaimFailed(index));
            }
        }

        let iface = &self.descriptor.interfaces[self.interface_index];
        let input = iface
            .endpoints
            .iter()
            .find(|ep| ep.direction == EndpointDirection::In);
        let output = iface
            .endpoints
            .iter()
            .find(|ep| ep.direction == EndpointDirection::Out);
        let (input, output) = match (input, output) {
            (Some(input), Some(output)) => (input, output),
            _ => {
                warn!("Missing required endpoint on {}", self.display_name());
                release_interfaces(conn.as_ref(), self.descriptor.interfaces.len());
                return Err(HidError::MissingEndpoint(self.interface_index));
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let reader = {
            let conn = Arc::clone(&conn);
            let running = Arc::clone(&running);
            let frozen = Arc::clone(&self.frozen);
            let sink = Arc::clone(&self.sink);
            let endpoint = input.address;
            let max_packet = input.max_packet_size;
            let id = self.id;
            std::thread::Builder::new()
                .name(format!("hid-reader-{}", self.id))
                .spawn(move || {
                    run_input_reader_loop(conn, endpoint, max_packet, running, frozen, sink, id);
                })
                .expect("Failed to spawn input reader thread")
        };

        *io = Some(SessionIo {
            conn,
            output_endpoint: output.address,
            running,
            reader: Some(reader),
        });
        drop(io);

        *self.state.lock() = SessionState::Open;
        debug!("Opened {} as device {}", self.display_name(), self.id);
        Ok(())
    }

    /// Close the transport.
    ///
    /// Idempotent. Blocks until the reader thread has exited, so no input
    /// callback fires after this returns.
    pub fn close(&self) {
        self.teardown();
        let mut state = self.state.lock();
        if *state != SessionState::Detached {
            *state = SessionState::Closed;
        }
    }

    /// Physical disconnection observed: tear down and mark terminal
    pub(crate) fn detach(&self) {
        self.teardown();
        *self.state.lock() = SessionState::Detached;
    }

    fn teardown(&self) {
        let Some(mut io) = self.io.lock().take() else {
            return;
        };

        io.running.store(false, Ordering::SeqCst);
        if let Some(reader) = io.reader.take() {
            // The reader wakes within one read timeout; wait it out
            if reader.join().is_err() {
                warn!("Input reader for device {} panicked during teardown", self.id);
            }
        }
        release_interfaces(io.conn.as_ref(), self.descriptor.interfaces.len());
        debug!("Closed device {}", self.id);
    }

    /// Write one output report, returning bytes actually written.
    ///
    /// A short write is logged but not retried.
    pub fn send_output_report(&self, report: &[u8]) -> Result<usize, HidError> {
        let io = self.io.lock();
        let io = io.as_ref().ok_or(HidError::NotOpen)?;
        let written = io
            .conn
            .write_interrupt(io.output_endpoint, report, TRANSFER_TIMEOUT)?;
        if written != report.len() {
            warn!(
                "Output report to device {} wrote {} of {} bytes",
                self.id,
                written,
                report.len()
            );
        }
        Ok(written)
    }

    /// Send a feature report via a SET_REPORT control transfer.
    ///
    /// Report ID 0 is a sentinel meaning "no report ID on the wire": the
    /// payload is shifted by one byte and the returned count re-adds the
    /// report-ID slot.
    pub fn send_feature_report(&self, report: &[u8]) -> Result<usize, HidError> {
        let report_id = *report.first().ok_or(HidError::EmptyReport)?;
        let skip = report_id == 0;
        let mut payload = if skip {
            report[1..].to_vec()
        } else {
            report.to_vec()
        };

        let io = self.io.lock();
        let io = io.as_ref().ok_or(HidError::NotOpen)?;
        let sent = io.conn.control_transfer(
            usb::REQUEST_TYPE_CLASS_INTERFACE_OUT,
            usb::HID_SET_REPORT,
            (usb::HID_REPORT_TYPE_FEATURE << 8) | u16::from(report_id),
            0,
            &mut payload,
            TRANSFER_TIMEOUT,
        )?;
        Ok(if skip { sent + 1 } else { sent })
    }

    /// Retrieve a feature report via a GET_REPORT control transfer.
    ///
    /// Same report-ID-0 sentinel as [`send_feature_report`]: byte 0 of the
    /// caller's buffer is preserved and the count adjusted. On success the
    /// retrieved bytes (including the report-ID slot) are also forwarded
    /// through the event sink.
    ///
    /// [`send_feature_report`]: Self::send_feature_report
    pub fn get_feature_report(&self, report: &mut [u8]) -> Result<usize, HidError> {
        let report_id = *report.first().ok_or(HidError::EmptyReport)?;
        let offset = usize::from(report_id == 0);

        let read = {
            let io = self.io.lock();
            let io = io.as_ref().ok_or(HidError::NotOpen)?;
            io.conn.control_transfer(
                usb::REQUEST_TYPE_CLASS_INTERFACE_IN,
                usb::HID_GET_REPORT,
                (usb::HID_REPORT_TYPE_FEATURE << 8) | u16::from(report_id),
                0,
                &mut report[offset..],
                TRANSFER_TIMEOUT,
            )?
        };

        let total = (read + offset).min(report.len());
        self.sink.feature_report(self.id, &report[..total]);
        Ok(total)
    }

    /// Suppress (or resume) input-report forwarding without touching the
    /// connection. The reader loop keeps draining the device either way.
    pub fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::SeqCst);
    }

    /// Whether input forwarding is currently suppressed
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

fn release_interfaces(conn: &dyn HostConnection, count: usize) {
    for index in 0..count {
        if let Err(e) = conn.release_interface(index) {
            debug!("Failed to release interface {}: {}", index, e);
        }
    }
}

/// Reader loop for one open session.
///
/// One bounded read per iteration. `Ok(0)` (timeout or transient error)
/// keeps the loop alive; `Err` means the transport is gone and terminates
/// only this loop. While frozen, data is discarded but reading continues so
/// the device's liveness is preserved.
fn run_input_reader_loop(
    conn: Arc<dyn HostConnection>,
    endpoint: u8,
    max_packet: usize,
    running: Arc<AtomicBool>,
    frozen: Arc<AtomicBool>,
    sink: Arc<dyn EventSink>,
    id: DeviceId,
) {
    debug!("Input reader for device {} started", id);
    let mut packet = vec![0u8; max_packet];

    while running.load(Ordering::Relaxed) {
        match conn.read_interrupt(endpoint, &mut packet, READ_TIMEOUT) {
            Ok(0) => {}
            Ok(len) => {
                if !frozen.load(Ordering::Relaxed) {
                    sink.input_report(id, &packet[..len.min(packet.len())]);
                }
            }
            Err(e) => {
                debug!("Input reader for device {} stopping: {}", id, e);
                break;
            }
        }
    }

    debug!("Input reader for device {} exiting", id);
}
