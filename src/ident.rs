//! Durable identity-to-ID allocation
//!
//! Maps the stable identity string of a physical device to a small integer
//! [`DeviceId`]. The map only grows: IDs are handed out monotonically and a
//! mapping, once written, never changes. Both the new mapping and the
//! advanced counter hit disk before `allocate_or_get` returns, so a crash
//! right after allocation can never hand the same ID to a different device.

use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::HidError;
use crate::types::DeviceId;

/// Key holding the next unallocated ID
const NEXT_ID_KEY: &[u8] = b"__next_device_id";

/// Persistent identity → [`DeviceId`] registry
pub struct IdentifierRegistry {
    db: sled::Db,
    /// Serializes allocation so concurrent attaches cannot both read the
    /// same counter value
    alloc: Mutex<()>,
}

impl IdentifierRegistry {
    /// Open (or create) the registry at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HidError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            alloc: Mutex::new(()),
        })
    }

    /// In-memory registry that vanishes on drop (tests, ephemeral hosts)
    pub fn temporary() -> Result<Self, HidError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            alloc: Mutex::new(()),
        })
    }

    /// Return the ID for `identity`, allocating the next free one on first
    /// sight. Deterministic across process restarts over the same store.
    pub fn allocate_or_get(&self, identity: &str) -> Result<DeviceId, HidError> {
        let _guard = self.alloc.lock();

        if let Some(raw) = self.db.get(identity.as_bytes())? {
            return Ok(decode_id(&raw));
        }

        let id = self.next_id()?;
        let mut batch = sled::Batch::default();
        batch.insert(identity.as_bytes(), id.to_le_bytes().to_vec());
        batch.insert(NEXT_ID_KEY, (id + 1).to_le_bytes().to_vec());
        self.db.apply_batch(batch)?;
        // The mapping must be durable before the ID is handed out
        self.db.flush()?;

        debug!("Allocated device ID {} for {}", id, identity);
        Ok(id)
    }

    /// Next ID that would be handed to a new identity
    pub fn next_id(&self) -> Result<DeviceId, HidError> {
        Ok(self
            .db
            .get(NEXT_ID_KEY)?
            .map(|raw| decode_id(&raw))
            .unwrap_or(0))
    }
}

fn decode_id(raw: &[u8]) -> DeviceId {
    let mut bytes = [0u8; 4];
    let len = raw.len().min(4);
    bytes[..len].copy_from_slice(&raw[..len]);
    DeviceId::from_le_bytes(bytes)
}
