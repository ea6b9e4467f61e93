//! Small non-volatile store for flags that must survive a power cycle.
//!
//! Every value has a fixed byte address. Values are read once at boot and
//! written only on mode transitions that record an event, never per cycle.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub const STORE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreKey {
    InitializationHoldFlag,
    SafeHoldFlag,
    BootCount,
}

impl StoreKey {
    pub const ALL: [Self; 3] = [
        Self::InitializationHoldFlag,
        Self::SafeHoldFlag,
        Self::BootCount,
    ];

    pub const fn address(self) -> usize {
        match self {
            Self::InitializationHoldFlag => 0x00,
            Self::SafeHoldFlag => 0x01,
            Self::BootCount => 0x02,
        }
    }
}

pub trait PersistentStore: Send {
    fn read_byte(&self, address: usize) -> Result<u8, StoreError>;
    fn write_byte(&mut self, address: usize, value: u8) -> Result<(), StoreError>;

    fn read(&self, key: StoreKey) -> Result<u8, StoreError> {
        self.read_byte(key.address())
    }

    fn write(&mut self, key: StoreKey, value: u8) -> Result<(), StoreError> {
        self.write_byte(key.address(), value)
    }

    fn read_flag(&self, key: StoreKey) -> Result<bool, StoreError> {
        Ok(self.read(key)? != 0)
    }

    fn write_flag(&mut self, key: StoreKey, value: bool) -> Result<(), StoreError> {
        self.write(key, u8::from(value))
    }
}

fn check_address(address: usize) -> Result<(), StoreError> {
    if address >= STORE_CAPACITY {
        return Err(StoreError::OutOfRange {
            address,
            capacity: STORE_CAPACITY,
        });
    }
    Ok(())
}

/// RAM-backed store. Clones share the same cells, so a test can keep one
/// clone to inspect what the supervisor persisted and to inject failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    cells: Arc<Mutex<[u8; STORE_CAPACITY]>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: &[(StoreKey, u8)]) -> Self {
        let store = Self::new();
        {
            let mut cells = store.cells.lock().unwrap_or_else(PoisonError::into_inner);
            for &(key, value) in contents {
                cells[key.address()] = value;
            }
        }
        store
    }

    /// Makes every subsequent write fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> [u8; STORE_CAPACITY] {
        *self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistentStore for MemoryStore {
    fn read_byte(&self, address: usize) -> Result<u8, StoreError> {
        check_address(address)?;
        Ok(self.cells.lock().unwrap_or_else(PoisonError::into_inner)[address])
    }

    fn write_byte(&mut self, address: usize, value: u8) -> Result<(), StoreError> {
        check_address(address)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected { address });
        }
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)[address] = value;
        Ok(())
    }
}

/// Fixed-size image file, written through on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    image: [u8; STORE_CAPACITY],
}

impl FileStore {
    /// Opens the image at `path`, creating a zeroed one if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut image = [0u8; STORE_CAPACITY];

        if path.exists() {
            let bytes = std::fs::read(&path)?;
            let n = bytes.len().min(STORE_CAPACITY);
            image[..n].copy_from_slice(&bytes[..n]);
            debug!(path = %path.display(), "opened store image");
        } else {
            std::fs::write(&path, image)?;
            info!(path = %path.display(), "created blank store image");
        }

        Ok(Self { path, image })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentStore for FileStore {
    fn read_byte(&self, address: usize) -> Result<u8, StoreError> {
        check_address(address)?;
        Ok(self.image[address])
    }

    fn write_byte(&mut self, address: usize, value: u8) -> Result<(), StoreError> {
        check_address(address)?;
        let mut next = self.image;
        next[address] = value;
        std::fs::write(&self.path, next)?;
        self.image = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("satcore-{}-{}.img", tag, std::process::id()))
    }

    #[test]
    fn test_memory_store_shared_and_injectable() {
        let store = MemoryStore::new();
        let mut handle = store.clone();

        handle.write_flag(StoreKey::SafeHoldFlag, true).unwrap();
        assert_eq!(store.snapshot()[1], 1);

        store.set_fail_writes(true);
        assert!(matches!(
            handle.write_flag(StoreKey::SafeHoldFlag, false),
            Err(StoreError::WriteRejected { address: 1 })
        ));
        // Failed write leaves the old value
        assert!(store.read_flag(StoreKey::SafeHoldFlag).unwrap());
    }

    #[test]
    fn test_out_of_range_address() {
        let mut store = MemoryStore::new();
        assert!(store.read_byte(STORE_CAPACITY).is_err());
        assert!(store.write_byte(99, 1).is_err());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = scratch_path("reopen");
        let _ = std::fs::remove_file(&path);

        {
            let mut store = FileStore::open(&path).unwrap();
            assert!(!store.read_flag(StoreKey::InitializationHoldFlag).unwrap());
            store.write_flag(StoreKey::InitializationHoldFlag, true).unwrap();
            store.write(StoreKey::BootCount, 7).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert!(store.read_flag(StoreKey::InitializationHoldFlag).unwrap());
        assert_eq!(store.read(StoreKey::BootCount).unwrap(), 7);
        assert_eq!(std::fs::read(&path).unwrap().len(), STORE_CAPACITY);

        let _ = std::fs::remove_file(&path);
    }
}
