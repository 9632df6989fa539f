//! Common types for device identity, descriptors, and host events

use serde::{Deserialize, Serialize};

/// Small integer handle the application layer uses to refer to a session.
///
/// Allocated once per distinct [`UsbDeviceDescriptor::identity`] by the
/// identifier registry and reused when the same physical device reconnects.
pub type DeviceId = u32;

/// Opaque native handle for one currently-connected device.
///
/// Assigned by the host glue; used to route attach/detach/permission events
/// to the right session. Unlike [`DeviceId`], a handle is only meaningful
/// while the device stays connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u64);

/// Transport the device is connected over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// USB host connection
    Usb,
    /// Bluetooth Low Energy
    Ble,
}

/// Endpoint direction as declared in the interface descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointDirection {
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// Static endpoint descriptor snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Endpoint address (including the direction bit)
    pub address: u8,
    /// Transfer direction
    pub direction: EndpointDirection,
    /// Maximum packet size in bytes
    pub max_packet_size: usize,
}

/// Static interface descriptor snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    /// Interface class code
    pub class: u8,
    /// Interface subclass code
    pub subclass: u8,
    /// Interface protocol code
    pub protocol: u8,
    /// Declared endpoints
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Everything classification and the open sequence need about one device,
/// captured at enumeration time. No I/O happens against a descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbDeviceDescriptor {
    /// Native handle for event routing
    pub handle: DeviceHandle,
    /// Bus path (USB) or hardware address (BLE)
    pub path: String,
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Device release number
    pub version: u16,
    /// Serial number if the host exposes it
    pub serial: Option<String>,
    /// Manufacturer string if the host exposes it
    pub manufacturer: Option<String>,
    /// Product string if the host exposes it
    pub product: Option<String>,
    /// Transport kind
    pub kind: TransportKind,
    /// Declared interfaces, in descriptor order
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl UsbDeviceDescriptor {
    /// Stable identity string for this physical device.
    ///
    /// Stays the same across reconnects of the same unit as long as the host
    /// reports the same path/vendor/product triple.
    pub fn identity(&self) -> String {
        format!("{}/{:x}/{:x}", self.path, self.vendor_id, self.product_id)
    }

    /// Manufacturer name, falling back to the hex vendor ID
    pub fn manufacturer_name(&self) -> String {
        self.manufacturer
            .clone()
            .unwrap_or_else(|| format!("{:x}", self.vendor_id))
    }

    /// Product name, falling back to the hex product ID
    pub fn product_name(&self) -> String {
        self.product
            .clone()
            .unwrap_or_else(|| format!("{:x}", self.product_id))
    }

    /// Serial number, empty when the host does not expose one
    pub fn serial_number(&self) -> String {
        self.serial.clone().unwrap_or_default()
    }

    /// Human-readable name for log messages
    pub fn display_name(&self) -> String {
        format!(
            "{} {} (0x{:x}/0x{:x})",
            self.manufacturer_name(),
            self.product_name(),
            self.vendor_id,
            self.product_id
        )
    }
}

/// Metadata delivered with `device_connected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Registered device ID
    pub id: DeviceId,
    /// Stable identity string
    pub identity: String,
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Serial number (empty if unavailable)
    pub serial: String,
    /// Device release number
    pub version: u16,
    /// Manufacturer name (hex vendor ID if unavailable)
    pub manufacturer: String,
    /// Product name (hex product ID if unavailable)
    pub product: String,
    /// Index of the matched HID interface
    pub interface_index: usize,
    /// Transport kind
    pub kind: TransportKind,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Discovered and classified, ID assigned, not yet accessed
    Attached,
    /// An open is waiting on an asynchronous permission grant
    PermissionPending,
    /// Access granted, endpoints resolved, reader loop running
    Open,
    /// Explicitly closed by the consumer; may be reopened
    Closed,
    /// Physical disconnection observed; terminal
    Detached,
}

/// Inbound events from the host platform.
///
/// The host glue (or the reconciler) feeds these to
/// [`DeviceManager::handle_event`](crate::DeviceManager::handle_event).
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A device was connected
    Attached(UsbDeviceDescriptor),
    /// A device was disconnected
    Detached(DeviceHandle),
    /// The host answered an outstanding permission request
    PermissionResult {
        /// Device the request was for
        handle: DeviceHandle,
        /// Whether access was granted
        granted: bool,
    },
}
