//! What happens to each archived folder kind on import.

use std::collections::HashMap;

use serde::Serialize;

use folio_core::FolderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderReuse {
    /// Map onto the importing user's existing folder of the same kind.
    Reuse,
    /// Create a fresh folder.
    Create,
    /// Drop the folder; its contents move to the folder's parent.
    Skip,
}

/// Table from folder kind to [`FolderReuse`]. Kinds absent from the table are created.
#[derive(Debug, Clone)]
pub struct FolderReusePolicy {
    table: HashMap<FolderKind, FolderReuse>,
}

impl Default for FolderReusePolicy {
    fn default() -> Self {
        Self {
            table: HashMap::from([
                (FolderKind::Root, FolderReuse::Reuse),
                (FolderKind::MediaRoot, FolderReuse::Reuse),
                (FolderKind::ApiInbox, FolderReuse::Reuse),
                (FolderKind::Templates, FolderReuse::Reuse),
                (FolderKind::System, FolderReuse::Reuse),
                (FolderKind::Shared, FolderReuse::Skip),
                (FolderKind::Normal, FolderReuse::Create),
                (FolderKind::Notebook, FolderReuse::Create),
            ]),
        }
    }
}

impl FolderReusePolicy {
    /// Create every folder, including system ones.
    pub fn create_all() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn with(mut self, kind: FolderKind, action: FolderReuse) -> Self {
        self.table.insert(kind, action);
        self
    }

    pub fn action(&self, kind: FolderKind) -> FolderReuse {
        self.table.get(&kind).copied().unwrap_or(FolderReuse::Create)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = FolderReusePolicy::default();
        assert_eq!(policy.action(FolderKind::Root), FolderReuse::Reuse);
        assert_eq!(policy.action(FolderKind::MediaRoot), FolderReuse::Reuse);
        assert_eq!(policy.action(FolderKind::Shared), FolderReuse::Skip);
        assert_eq!(policy.action(FolderKind::Normal), FolderReuse::Create);
        assert_eq!(policy.action(FolderKind::Notebook), FolderReuse::Create);
    }

    #[test]
    fn test_override() {
        let policy = FolderReusePolicy::create_all().with(FolderKind::Shared, FolderReuse::Skip);
        assert_eq!(policy.action(FolderKind::Root), FolderReuse::Create);
        assert_eq!(policy.action(FolderKind::Shared), FolderReuse::Skip);
    }
}
