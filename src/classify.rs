//! HID compatibility classification
//!
//! A device qualifies if any interface declares the generic HID class, or if
//! interface 0 matches one of the two vendor-specific game-controller
//! signatures below. Classification is a pure function of static descriptor
//! fields; no I/O.

use crate::host::usb;
use crate::types::{InterfaceDescriptor, UsbDeviceDescriptor};

/// Interface subclass for the legacy wired controller protocol
const XB360_IFACE_SUBCLASS: u8 = 93;
/// Interface protocol for the legacy wired controller protocol (wired only)
const XB360_IFACE_PROTOCOL: u8 = 1;

/// Vendors shipping legacy-protocol controllers
const XB360_VENDORS: &[u16] = &[
    0x0079, // GPD Win 2
    0x044f, // Thrustmaster
    0x045e, // Microsoft
    0x046d, // Logitech
    0x056e, // Elecom
    0x06a3, // Saitek
    0x0738, // Mad Catz
    0x07ff, // Mad Catz
    0x0e6f, // Unknown
    0x0f0d, // Hori
    0x11c9, // Nacon
    0x12ab, // Unknown
    0x1430, // RedOctane
    0x146b, // BigBen
    0x1532, // Razer Sabertooth
    0x15e4, // Numark
    0x162e, // Joytech
    0x1689, // Razer Onza
    0x1bad, // Harmonix
    0x24c6, // PowerA
];

/// Interface subclass for the modern controller protocol
const XB1_IFACE_SUBCLASS: u8 = 71;
/// Interface protocol for the modern controller protocol
const XB1_IFACE_PROTOCOL: u8 = 208;

/// Vendors shipping modern-protocol controllers
const XB1_VENDORS: &[u16] = &[
    0x045e, // Microsoft
    0x0738, // Mad Catz
    0x0e6f, // Unknown
    0x0f0d, // Hori
    0x1532, // Razer Wildcat
    0x24c6, // PowerA
];

/// Find the first HID-compatible interface, if any.
///
/// First matching interface wins. Vendor-specific controller signatures are
/// only honored on interface index 0.
pub fn match_hid_interface(descriptor: &UsbDeviceDescriptor) -> Option<usize> {
    descriptor
        .interfaces
        .iter()
        .enumerate()
        .find(|(index, iface)| is_hid_interface(descriptor.vendor_id, *index, iface))
        .map(|(index, _)| index)
}

/// Check whether any interface qualifies
pub fn is_hid_compatible(descriptor: &UsbDeviceDescriptor) -> bool {
    match_hid_interface(descriptor).is_some()
}

fn is_hid_interface(vendor_id: u16, index: usize, iface: &InterfaceDescriptor) -> bool {
    if iface.class == usb::CLASS_HID {
        return true;
    }
    index == 0 && (is_xbox360_interface(vendor_id, iface) || is_xbox_one_interface(vendor_id, iface))
}

#[inline]
fn is_xbox360_interface(vendor_id: u16, iface: &InterfaceDescriptor) -> bool {
    iface.class == usb::CLASS_VENDOR_SPEC
        && iface.subclass == XB360_IFACE_SUBCLASS
        && iface.protocol == XB360_IFACE_PROTOCOL
        && XB360_VENDORS.contains(&vendor_id)
}

#[inline]
fn is_xbox_one_interface(vendor_id: u16, iface: &InterfaceDescriptor) -> bool {
    iface.class == usb::CLASS_VENDOR_SPEC
        && iface.subclass == XB1_IFACE_SUBCLASS
        && iface.protocol == XB1_IFACE_PROTOCOL
        && XB1_VENDORS.contains(&vendor_id)
}

/// Check whether a BLE peripheral is a supported controller.
///
/// Keyed on the exact advertised name; devices without a name never match.
pub fn is_ble_controller(name: Option<&str>, is_low_energy: bool) -> bool {
    matches!(name, Some("SteamController")) && is_low_energy
}
