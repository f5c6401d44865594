//! Old → new identifier table filled while the graph is recreated.

use std::collections::{BTreeMap, HashMap};

use folio_core::{GlobalIdentifier, LinkKey};

/// One remapped record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapEntry {
    pub old: GlobalIdentifier,
    pub new: GlobalIdentifier,
}

/// Entries live in an arena; lookups go through a link-key index, so any
/// revision of an archived record resolves to the same new record.
#[derive(Debug, Default, Clone)]
pub struct RemapTable {
    entries: Vec<RemapEntry>,
    by_key: HashMap<LinkKey, usize>,
    folders: HashMap<u64, u64>,
    forms: HashMap<u64, u64>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping. The first mapping for a link key wins.
    pub fn insert(&mut self, old: GlobalIdentifier, new: GlobalIdentifier) -> usize {
        let key = old.link_key();
        if let Some(&index) = self.by_key.get(&key) {
            return index;
        }
        let index = self.entries.len();
        self.entries.push(RemapEntry {
            old: old.unversioned(),
            new: new.unversioned(),
        });
        self.by_key.insert(key, index);
        index
    }

    /// New identifier for any revision of `old`. The result is unversioned
    /// and therefore names the current revision.
    pub fn resolve(&self, old: &GlobalIdentifier) -> Option<GlobalIdentifier> {
        self.by_key
            .get(&old.link_key())
            .map(|&index| self.entries[index].new)
    }

    pub fn contains(&self, old: &GlobalIdentifier) -> bool {
        self.by_key.contains_key(&old.link_key())
    }

    pub fn map_folder(&mut self, old: u64, new: u64) {
        self.folders.entry(old).or_insert(new);
    }

    pub fn folder(&self, old: u64) -> Option<u64> {
        self.folders.get(&old).copied()
    }

    pub fn map_form(&mut self, old: u64, new: u64) {
        self.forms.entry(old).or_insert(new);
    }

    pub fn form(&self, old: u64) -> Option<u64> {
        self.forms.get(&old).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RemapEntry] {
        &self.entries
    }

    /// Old identifier → new identifier, as strings.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.old.to_string(), e.new.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_revision_resolves_unversioned() {
        let mut table = RemapTable::new();
        table.insert(
            GlobalIdentifier::document(5).with_version(3),
            GlobalIdentifier::document(105),
        );
        let resolved = table.resolve(&GlobalIdentifier::document(5).with_version(1)).unwrap();
        assert_eq!(resolved, GlobalIdentifier::document(105));
        assert!(resolved.version.is_none());
        assert!(table.resolve(&GlobalIdentifier::document(6)).is_none());
    }

    #[test]
    fn test_first_mapping_wins() {
        let mut table = RemapTable::new();
        let a = table.insert(GlobalIdentifier::document(1), GlobalIdentifier::document(10));
        let b = table.insert(GlobalIdentifier::document(1), GlobalIdentifier::document(20));
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
        assert_eq!(table.to_map().get("SD1").map(String::as_str), Some("SD10"));
    }

    #[test]
    fn test_folder_and_form_maps() {
        let mut table = RemapTable::new();
        table.map_folder(1, 11);
        table.map_form(2, 22);
        assert_eq!(table.folder(1), Some(11));
        assert_eq!(table.form(2), Some(22));
        assert_eq!(table.folder(2), None);
        assert!(table.is_empty());
    }
}
