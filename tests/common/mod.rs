//! Shared mock host bus and recording sink for the behavioral tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use hidbridge::{
    DeviceHandle, DeviceId, DeviceInfo, DeviceManager, EndpointDescriptor, EndpointDirection,
    EventSink, HidError, HostBus, HostConnection, IdentifierRegistry, InterfaceDescriptor,
    TransportKind, UsbDeviceDescriptor,
};

/// One recorded control transfer
#[derive(Debug, Clone)]
pub struct ControlCall {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub payload: Vec<u8>,
}

/// Scriptable device connection
#[derive(Default)]
pub struct MockConnection {
    pub claimed: Mutex<Vec<usize>>,
    pub released: Mutex<Vec<usize>>,
    /// Packets the reader loop will receive, in order
    input: Mutex<VecDeque<Vec<u8>>>,
    /// Bytes returned by GET_REPORT control transfers
    pub feature_data: Mutex<Vec<u8>>,
    /// Interrupt writes, as delivered
    pub written: Mutex<Vec<Vec<u8>>>,
    /// Control transfers, as delivered
    pub control_log: Mutex<Vec<ControlCall>>,
    /// Force every interrupt write to report this many bytes
    pub short_write: Mutex<Option<usize>>,
    /// Make claim_interface fail
    pub fail_claims: AtomicBool,
    /// Make control transfers fail
    pub fail_control: AtomicBool,
    /// Make reads fail unrecoverably (device gone)
    pub dead: AtomicBool,
}

impl MockConnection {
    pub fn push_input(&self, packet: Vec<u8>) {
        self.input.lock().push_back(packet);
    }
}

impl HostConnection for MockConnection {
    fn claim_interface(&self, index: usize) -> Result<(), HidError> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(HidError::ClaimFailed(index));
        }
        self.claimed.lock().push(index);
        Ok(())
    }

    fn release_interface(&self, index: usize) -> Result<(), HidError> {
        self.released.lock().push(index);
        Ok(())
    }

    fn read_interrupt(
        &self,
        _endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, HidError> {
        if let Some(packet) = self.input.lock().pop_front() {
            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            return Ok(len);
        }
        if self.dead.load(Ordering::SeqCst) {
            return Err(HidError::Disconnected);
        }
        // Simulate a read timeout without stalling the tests
        std::thread::sleep(Duration::from_millis(2));
        Ok(0)
    }

    fn write_interrupt(
        &self,
        _endpoint: u8,
        buf: &[u8],
        _timeout: Duration,
    ) -> Result<usize, HidError> {
        self.written.lock().push(buf.to_vec());
        Ok(self.short_write.lock().unwrap_or(buf.len()))
    }

    fn control_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, HidError> {
        if self.fail_control.load(Ordering::SeqCst) {
            return Err(HidError::Transfer("control transfer stalled".into()));
        }
        let transferred = if request_type & 0x80 != 0 {
            let data = self.feature_data.lock();
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            len
        } else {
            buf.len()
        };
        self.control_log.lock().push(ControlCall {
            request_type,
            request,
            value,
            index,
            payload: buf.to_vec(),
        });
        Ok(transferred)
    }
}

/// Scriptable host bus
#[derive(Default)]
pub struct MockBus {
    pub devices: Mutex<Vec<UsbDeviceDescriptor>>,
    pub permitted: Mutex<HashSet<DeviceHandle>>,
    pub requests: Mutex<Vec<DeviceHandle>>,
    pub connections: Mutex<HashMap<DeviceHandle, Arc<MockConnection>>>,
    pub fail_permission_request: AtomicBool,
}

impl MockBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a descriptor and back it with a fresh connection
    pub fn add_device(&self, descriptor: UsbDeviceDescriptor) -> Arc<MockConnection> {
        let conn = Arc::new(MockConnection::default());
        self.connections
            .lock()
            .insert(descriptor.handle, Arc::clone(&conn));
        self.devices.lock().push(descriptor);
        conn
    }

    pub fn remove_device(&self, handle: DeviceHandle) {
        self.devices.lock().retain(|desc| desc.handle != handle);
    }

    /// Grant standing permission for a device
    pub fn grant(&self, handle: DeviceHandle) {
        self.permitted.lock().insert(handle);
    }
}

impl HostBus for MockBus {
    fn devices(&self) -> Vec<UsbDeviceDescriptor> {
        self.devices.lock().clone()
    }

    fn has_permission(&self, handle: DeviceHandle) -> bool {
        self.permitted.lock().contains(&handle)
    }

    fn request_permission(&self, handle: DeviceHandle) -> Result<(), HidError> {
        if self.fail_permission_request.load(Ordering::SeqCst) {
            return Err(HidError::PermissionRequest("no permission broker".into()));
        }
        self.requests.lock().push(handle);
        Ok(())
    }

    fn open(&self, handle: DeviceHandle) -> Result<Arc<dyn HostConnection>, HidError> {
        self.connections
            .lock()
            .get(&handle)
            .cloned()
            .map(|conn| conn as Arc<dyn HostConnection>)
            .ok_or_else(|| HidError::DeviceNotFound(format!("{handle:?}")))
    }
}

/// Everything the sink was told, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Connected(DeviceInfo),
    OpenPending(DeviceId),
    OpenResult(DeviceId, bool),
    Disconnected(DeviceId),
    Input(DeviceId, Vec<u8>),
    Feature(DeviceId, Vec<u8>),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, matcher: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| matcher(e)).count()
    }

    /// Poll until `cond` holds over the recorded events, or time out
    pub fn wait_for(
        &self,
        cond: impl Fn(&[SinkEvent]) -> bool,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if cond(&self.events.lock()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl EventSink for RecordingSink {
    fn device_connected(&self, info: &DeviceInfo) {
        self.events.lock().push(SinkEvent::Connected(info.clone()));
    }

    fn device_open_pending(&self, id: DeviceId) {
        self.events.lock().push(SinkEvent::OpenPending(id));
    }

    fn device_open_result(&self, id: DeviceId, success: bool) {
        self.events.lock().push(SinkEvent::OpenResult(id, success));
    }

    fn device_disconnected(&self, id: DeviceId) {
        self.events.lock().push(SinkEvent::Disconnected(id));
    }

    fn input_report(&self, id: DeviceId, data: &[u8]) {
        self.events.lock().push(SinkEvent::Input(id, data.to_vec()));
    }

    fn feature_report(&self, id: DeviceId, data: &[u8]) {
        self.events.lock().push(SinkEvent::Feature(id, data.to_vec()));
    }
}

/// Generic HID gamepad: one HID-class interface with an IN and an OUT
/// endpoint
pub fn hid_device(handle: u64) -> UsbDeviceDescriptor {
    UsbDeviceDescriptor {
        handle: DeviceHandle(handle),
        path: format!("/dev/bus/usb/001/{handle:03}"),
        vendor_id: 0x045e,
        product_id: 0x028e,
        version: 0x0114,
        serial: Some(format!("SN{handle:04}")),
        manufacturer: Some("Microsoft".into()),
        product: Some("Controller".into()),
        kind: TransportKind::Usb,
        interfaces: vec![InterfaceDescriptor {
            class: 0x03,
            subclass: 0,
            protocol: 0,
            endpoints: vec![
                EndpointDescriptor {
                    address: 0x81,
                    direction: EndpointDirection::In,
                    max_packet_size: 64,
                },
                EndpointDescriptor {
                    address: 0x01,
                    direction: EndpointDirection::Out,
                    max_packet_size: 64,
                },
            ],
        }],
    }
}

/// Legacy-protocol controller: vendor-specific interface 0 with the known
/// subclass/protocol signature
pub fn xbox360_device(handle: u64, vendor_id: u16) -> UsbDeviceDescriptor {
    let mut desc = hid_device(handle);
    desc.vendor_id = vendor_id;
    desc.interfaces[0].class = 0xFF;
    desc.interfaces[0].subclass = 93;
    desc.interfaces[0].protocol = 1;
    desc
}

/// Device with no HID-compatible interface
pub fn non_hid_device(handle: u64) -> UsbDeviceDescriptor {
    let mut desc = hid_device(handle);
    desc.interfaces[0].class = 0x08;
    desc
}

/// HID device whose matched interface is missing the OUT endpoint
pub fn input_only_device(handle: u64) -> UsbDeviceDescriptor {
    let mut desc = hid_device(handle);
    desc.interfaces[0].endpoints.retain(|ep| ep.direction == EndpointDirection::In);
    desc
}

/// Manager over a fresh in-memory identifier registry
pub fn manager_with(bus: &Arc<MockBus>, sink: &Arc<RecordingSink>) -> DeviceManager {
    DeviceManager::new(
        Arc::clone(bus) as Arc<dyn HostBus>,
        Arc::clone(sink) as Arc<dyn EventSink>,
        IdentifierRegistry::temporary().expect("in-memory registry"),
    )
}

/// Attach a device and return the ID the sink saw for it
pub fn attached_id(sink: &RecordingSink, handle: u64) -> DeviceId {
    sink.events()
        .iter()
        .rev()
        .find_map(|e| match e {
            SinkEvent::Connected(info) => Some(info.id),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no device_connected recorded for handle {handle}"))
}
