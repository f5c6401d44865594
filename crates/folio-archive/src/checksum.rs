//! Archive checksums.
//!
//! Two checksums protect an archive:
//!
//! - the content checksum, SHA-256 over every unhidden file's relative path
//!   and bytes in sorted path order, stored inside the archive in `.checksum`;
//! - the package checksum, BLAKE3 over the packaged file, stored in a
//!   `<package>.blake3` sidecar next to it.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::trace;

use folio_core::defaults::PACKAGE_CHECKSUM_EXTENSION;
use folio_core::Result;

use crate::package::ArchiveTree;

/// Hidden files (any path component starting with `.`) are excluded.
pub fn is_hidden(path: &str) -> bool {
    path.split('/').any(|part| part.starts_with('.'))
}

/// Content checksum of a tree, formatted `sha256:<hex>`.
///
/// Returns `None` when the tree holds no unhidden file.
pub fn content_checksum(tree: &ArchiveTree) -> Option<String> {
    let mut hasher = Sha256::new();
    let mut hashed = 0usize;
    for (path, bytes) in tree.iter().filter(|(p, _)| !is_hidden(p)) {
        trace!(path, size = bytes.len(), "Checksum input");
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
        hashed += 1;
    }
    (hashed > 0).then(|| format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// BLAKE3 checksum of a file on disk, formatted `blake3:<hex>`.
pub fn package_checksum(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// `<package>.blake3`
pub fn sidecar_path(package: &Path) -> PathBuf {
    let mut name = package.as_os_str().to_owned();
    name.push(".");
    name.push(PACKAGE_CHECKSUM_EXTENSION);
    PathBuf::from(name)
}

pub fn write_sidecar(package: &Path, checksum: &str) -> Result<PathBuf> {
    let path = sidecar_path(package);
    std::fs::write(&path, format!("{}\n", checksum))?;
    Ok(path)
}

/// Stored package checksum, if a sidecar exists.
pub fn read_sidecar(package: &Path) -> Result<Option<String>> {
    let path = sidecar_path(package);
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Some(text.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ArchiveTree {
        let mut tree = ArchiveTree::new();
        tree.insert("manifest.txt", b"Source: folio\n".to_vec());
        tree.insert("records/SD1v1/doc.json", b"{\"a\":1}".to_vec());
        tree
    }

    #[test]
    fn test_hidden_files_are_excluded() {
        let mut with_hidden = tree();
        with_hidden.insert(".checksum", b"whatever".to_vec());
        with_hidden.insert("media/.DS_Store", b"junk".to_vec());
        assert_eq!(content_checksum(&tree()), content_checksum(&with_hidden));
    }

    #[test]
    fn test_content_change_changes_checksum() {
        let mut changed = tree();
        changed.insert("records/SD1v1/doc.json", b"{\"a\":2}".to_vec());
        assert_ne!(content_checksum(&tree()), content_checksum(&changed));
    }

    #[test]
    fn test_rename_changes_checksum() {
        let mut renamed = ArchiveTree::new();
        renamed.insert("manifest.txt", b"Source: folio\n".to_vec());
        renamed.insert("records/SD2v1/doc.json", b"{\"a\":1}".to_vec());
        assert_ne!(content_checksum(&tree()), content_checksum(&renamed));
    }

    #[test]
    fn test_empty_tree_has_no_checksum() {
        let mut only_hidden = ArchiveTree::new();
        only_hidden.insert(".checksum", b"x".to_vec());
        assert!(content_checksum(&only_hidden).is_none());
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("a.tar.gz");
        std::fs::write(&package, b"bytes").unwrap();
        assert!(read_sidecar(&package).unwrap().is_none());

        let checksum = package_checksum(&package).unwrap();
        assert!(checksum.starts_with("blake3:"));
        let sidecar = write_sidecar(&package, &checksum).unwrap();
        assert_eq!(sidecar, dir.path().join("a.tar.gz.blake3"));
        assert_eq!(read_sidecar(&package).unwrap(), Some(checksum));
    }
}
