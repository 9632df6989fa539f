//! Device-session management for HID devices on permission-mediated hosts
//!
//! This crate tracks HID devices (including vendor-specific game-controller
//! protocols) across attach, permission, open, and detach, assigns each
//! physical device a stable integer ID, and relays input/output/feature
//! reports between the host transport and a fixed callback surface:
//!
//! - devices are classified from static interface descriptors, no I/O
//! - each identity gets a durable [`DeviceId`], reused across reconnects
//! - report I/O runs through one background reader per open device
//! - all registry mutation is serialized against concurrent host events
//!
//! The host platform (enumeration, permission prompts, transfers) sits
//! behind the [`HostBus`]/[`HostConnection`] traits; the consuming
//! application registers an [`EventSink`] for the outbound notifications
//! and drives [`DeviceManager`] by [`DeviceId`].

pub mod classify;
pub mod error;
pub mod host;
pub mod ident;
pub mod manager;
pub mod reconcile;
pub mod session;
pub mod sink;
pub mod types;

pub use error::HidError;
pub use host::{HostBus, HostConnection, TRANSFER_TIMEOUT};
pub use ident::IdentifierRegistry;
pub use manager::DeviceManager;
pub use reconcile::{spawn_reconciler, Reconciler, ReconcilerTask};
pub use session::DeviceSession;
pub use sink::EventSink;
pub use types::{
    DeviceHandle, DeviceId, DeviceInfo, EndpointDescriptor, EndpointDirection, HostEvent,
    InterfaceDescriptor, SessionState, TransportKind, UsbDeviceDescriptor,
};
