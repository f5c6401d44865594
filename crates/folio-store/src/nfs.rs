//! Network filesystem and disk-space doubles.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use folio_core::{DiskSpaceSource, NfsFileSource, Result};

/// NFS files held in memory, keyed by file system id and path.
#[derive(Debug, Default)]
pub struct MemoryNfs {
    files: RwLock<HashMap<(u64, String), Vec<u8>>>,
}

impl MemoryNfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, file_system_id: u64, path: &str, bytes: Vec<u8>) {
        self.files
            .write()
            .await
            .insert((file_system_id, path.to_string()), bytes);
    }
}

#[async_trait]
impl NfsFileSource for MemoryNfs {
    async fn read(
        &self,
        file_system_id: u64,
        path: &str,
        max_bytes: u64,
    ) -> Result<Option<Vec<u8>>> {
        let files = self.files.read().await;
        match files.get(&(file_system_id, path.to_string())) {
            Some(bytes) if bytes.len() as u64 <= max_bytes => Ok(Some(bytes.clone())),
            Some(bytes) => {
                debug!(file_system_id, path, size = bytes.len(), "NFS file over size limit");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Disk space source reporting a fixed, adjustable amount of free space.
#[derive(Debug)]
pub struct FixedDiskSpace {
    available: AtomicU64,
}

impl FixedDiskSpace {
    pub fn new(available: u64) -> Self {
        Self {
            available: AtomicU64::new(available),
        }
    }

    pub fn set(&self, available: u64) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl DiskSpaceSource for FixedDiskSpace {
    fn available_bytes(&self, _path: &Path) -> Result<u64> {
        Ok(self.available.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_respects_size_limit() {
        let nfs = MemoryNfs::new();
        nfs.put(3, "/runs/a.csv", vec![0; 10]).await;
        assert!(nfs.read(3, "/runs/a.csv", 10).await.unwrap().is_some());
        assert!(nfs.read(3, "/runs/a.csv", 9).await.unwrap().is_none());
        assert!(nfs.read(4, "/runs/a.csv", 10).await.unwrap().is_none());
    }

    #[test]
    fn test_fixed_disk_space() {
        let disk = FixedDiskSpace::new(100);
        disk.set(5);
        assert_eq!(disk.available_bytes(Path::new("/tmp")).unwrap(), 5);
    }
}
