//! Persistent local texture store. Only ever a cache: every miss or I/O
//! failure is treated as "not stored".

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{trace, warn};

use crate::error::Result;

/// Key -> blob store keyed by `"namespace:key"`
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// One file per key under a directory.
///
/// Files are named by the CRC-32 of the key and start with the key itself
/// followed by a newline, so a checksum collision reads as a miss.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{:08x}.bin", crc32fast::hash(key.as_bytes())))
    }
}

impl LocalStore for DiskStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let data = std::fs::read(self.path_for(key)).ok()?;
        let split = data.iter().position(|&b| b == b'\n')?;
        if &data[..split] != key.as_bytes() {
            trace!(key, "store checksum collision");
            return None;
        }
        Some(data[split + 1..].to_vec())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let mut file = std::fs::File::create(self.path_for(key))?;
        file.write_all(key.as_bytes())?;
        file.write_all(b"\n")?;
        file.write_all(bytes)?;
        Ok(())
    }
}

/// In-memory store for tests and for running without a disk cache
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        match self.blobs.lock() {
            Ok(mut blobs) => {
                blobs.insert(key.to_string(), bytes.to_vec());
            }
            Err(_) => warn!(key, "memory store poisoned"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("colony-view-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_disk_store_round_trip() {
        let dir = temp_dir("disk");
        let store = DiskStore::new(&dir);
        assert!(store.get("thing:Wall").is_none());

        store.put("thing:Wall", b"\x89PNG\nbytes").unwrap();
        assert_eq!(store.get("thing:Wall").unwrap(), b"\x89PNG\nbytes".to_vec());
        assert!(store.get("thing:Door").is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_disk_store_key_mismatch_is_miss() {
        let dir = temp_dir("collide");
        let store = DiskStore::new(&dir);
        store.put("terrain:Soil", b"data").unwrap();
        // simulate a collision by writing another key's header into the file
        std::fs::write(store.path_for("terrain:Soil"), b"terrain:Other\ndata").unwrap();
        assert!(store.get("terrain:Soil").is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.put("a", b"1").unwrap();
        assert_eq!(store.get("a"), Some(b"1".to_vec()));
        assert_eq!(store.len(), 1);
    }
}
