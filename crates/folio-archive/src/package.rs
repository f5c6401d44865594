//! In-memory archive tree and its `.tar.gz` packaging.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::{debug, trace};

use folio_core::{Error, Result};

/// Archive contents keyed by relative path (`/`-separated), sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl ArchiveTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, b)| (p.as_str(), b.as_slice()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Files directly inside `dir`, as `(file name, bytes)`.
    pub fn files_in(&self, dir: &str) -> Vec<(&str, &[u8])> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter_map(|(p, b)| {
                let name = &p[prefix.len()..];
                (!name.contains('/')).then_some((name, b.as_slice()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Write `tree` as a gzip-compressed tar under a single `root` directory.
///
/// The package is staged next to `dest` and moved into place once complete.
/// Returns the package size in bytes.
pub fn pack(tree: &ArchiveTree, root: &str, dest: &Path) -> Result<u64> {
    let dir = dest
        .parent()
        .ok_or_else(|| Error::InvalidInput(format!("{} has no parent", dest.display())))?;
    std::fs::create_dir_all(dir)?;

    let staging = tempfile::NamedTempFile::new_in(dir)?;
    {
        let encoder = GzEncoder::new(staging.as_file(), Compression::default());
        let mut tar = Builder::new(encoder);
        let mtime = chrono::Utc::now().timestamp().max(0) as u64;

        for (path, data) in tree.iter() {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            header.set_cksum();
            tar.append_data(&mut header, format!("{}/{}", root, path), data)?;
            trace!(path, size = data.len(), "Packed archive entry");
        }
        tar.into_inner()?.finish()?;
    }
    staging.persist(dest).map_err(|e| Error::Io(e.error))?;

    let size = std::fs::metadata(dest)?.len();
    debug!(archive_path = %dest.display(), size, entries = tree.len(), "Archive packed");
    Ok(size)
}

/// Read a package back into a tree.
///
/// When every entry lives under one common top-level directory, that
/// directory is stripped. Entries escaping the root are rejected.
pub fn unpack(path: &Path) -> Result<ArchiveTree> {
    let file = File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut entries: Vec<(Vec<String>, Vec<u8>)> = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry.path()?.into_owned();
        let mut parts = Vec::new();
        for component in entry_path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(Error::Format(format!(
                        "archive entry escapes the archive root: {}",
                        entry_path.display()
                    )))
                }
            }
        }
        if parts.is_empty() {
            continue;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        entries.push((parts, contents));
    }

    let common_root = entries.first().and_then(|(first, _)| {
        let root = first.first()?;
        entries
            .iter()
            .all(|(p, _)| p.len() > 1 && p.first() == Some(root))
            .then(|| root.clone())
    });

    let mut tree = ArchiveTree::new();
    for (parts, contents) in entries {
        let skip = usize::from(common_root.is_some());
        tree.insert(parts[skip..].join("/"), contents);
    }
    Ok(tree)
}
