//! Host platform seam: enumeration, permission handshake, transfers
//!
//! All hardware access goes through the host's device service. This module
//! defines the two traits the host glue implements: [`HostBus`] for
//! enumeration/permissions/opening and [`HostConnection`] for per-device
//! transfers. The fixed HID transfer constants live here too.

use std::sync::Arc;
use std::time::Duration;

use crate::error::HidError;
use crate::types::{DeviceHandle, UsbDeviceDescriptor};

/// Fixed per-transfer timeout imposed on every blocking transfer
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);

/// USB/HID constants for feature-report control transfers.
///
/// Values come straight from the HID class specification; the request type
/// bytes are class | interface-recipient with the direction bit.
pub mod usb {
    /// USB interface class for HID devices
    pub const CLASS_HID: u8 = 0x03;
    /// USB interface class for vendor-specific protocols
    pub const CLASS_VENDOR_SPEC: u8 = 0xFF;

    /// HID class request: SET_REPORT
    pub const HID_SET_REPORT: u8 = 0x09;
    /// HID class request: GET_REPORT
    pub const HID_GET_REPORT: u8 = 0x01;
    /// HID report type for feature reports (high byte of wValue)
    pub const HID_REPORT_TYPE_FEATURE: u16 = 3;

    /// bmRequestType: class request, interface recipient, host to device
    pub const REQUEST_TYPE_CLASS_INTERFACE_OUT: u8 = 0x21;
    /// bmRequestType: class request, interface recipient, device to host
    pub const REQUEST_TYPE_CLASS_INTERFACE_IN: u8 = 0xA1;
}

/// Host bus abstraction.
///
/// One implementation per host environment. `request_permission` must not
/// block on the user: the grant/deny answer arrives later as
/// [`HostEvent::PermissionResult`](crate::HostEvent::PermissionResult).
pub trait HostBus: Send + Sync {
    /// Snapshot of currently-connected devices
    fn devices(&self) -> Vec<UsbDeviceDescriptor>;

    /// Whether the consumer already holds standing access to this device
    fn has_permission(&self, handle: DeviceHandle) -> bool;

    /// Ask the host to prompt for access to this device
    fn request_permission(&self, handle: DeviceHandle) -> Result<(), HidError>;

    /// Open a connection. Requires standing permission.
    fn open(&self, handle: DeviceHandle) -> Result<Arc<dyn HostConnection>, HidError>;
}

/// An open connection to one device.
///
/// Shared between the session (writes, control transfers) and its reader
/// thread (input reads), so every method takes `&self`. The connection is
/// released by dropping the last `Arc`.
pub trait HostConnection: Send + Sync {
    /// Claim exclusive access to one interface
    fn claim_interface(&self, index: usize) -> Result<(), HidError>;

    /// Release a previously claimed interface
    fn release_interface(&self, index: usize) -> Result<(), HidError>;

    /// Read one packet from an IN endpoint.
    ///
    /// Returns `Ok(0)` on timeout or a transient error; `Err` only when the
    /// transfer cannot continue (device gone, handle revoked).
    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, HidError>;

    /// Write one packet to an OUT endpoint, returning bytes actually written
    fn write_interrupt(
        &self,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, HidError>;

    /// Control transfer on endpoint zero.
    ///
    /// Direction comes from `request_type`: `buf` is filled for IN transfers
    /// and consumed for OUT transfers. Returns bytes transferred.
    fn control_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, HidError>;
}
