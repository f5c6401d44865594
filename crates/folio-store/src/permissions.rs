//! Ownership-based permission model backed by a [`MemoryStore`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use folio_core::{GlobalIdentifier, LinkKey, PermissionEvaluator, Principal, Result};

use crate::memory::MemoryStore;

/// Grants read access to owners, admins and explicitly shared principals.
///
/// A user may export their own content; group exports are limited to the
/// group owner. Admins may do everything.
pub struct MemoryPermissions {
    store: Arc<MemoryStore>,
    grants: RwLock<HashSet<(String, LinkKey)>>,
    denied: RwLock<HashSet<(String, LinkKey)>>,
}

impl MemoryPermissions {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            grants: RwLock::new(HashSet::new()),
            denied: RwLock::new(HashSet::new()),
        }
    }

    /// Share a record with a user who does not own it.
    pub async fn grant_read(&self, username: &str, record: &GlobalIdentifier) {
        self.grants
            .write()
            .await
            .insert((username.to_string(), record.link_key()));
    }

    /// Hide a record from a user, owner included.
    pub async fn deny_read(&self, username: &str, record: &GlobalIdentifier) {
        self.denied
            .write()
            .await
            .insert((username.to_string(), record.link_key()));
    }
}

#[async_trait]
impl PermissionEvaluator for MemoryPermissions {
    async fn can_read(&self, principal: &Principal, record: &GlobalIdentifier) -> Result<bool> {
        let key = (principal.username.clone(), record.link_key());
        if self.denied.read().await.contains(&key) {
            return Ok(false);
        }
        if principal.is_admin || self.grants.read().await.contains(&key) {
            return Ok(true);
        }
        Ok(self.store.owner_of(record).await.as_deref() == Some(principal.username.as_str()))
    }

    async fn can_export_user(&self, principal: &Principal, username: &str) -> Result<bool> {
        Ok(principal.is_admin || principal.username == username)
    }

    async fn can_export_group(&self, principal: &Principal, group: &str) -> Result<bool> {
        if principal.is_admin {
            return Ok(true);
        }
        Ok(self.store.group_owner(group).await.as_deref() == Some(principal.username.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::Field;

    async fn fixture() -> (Arc<MemoryStore>, MemoryPermissions, u64) {
        let store = Arc::new(MemoryStore::new());
        let home = store.add_user("alice").await;
        store.add_user("bob").await;
        let doc = store
            .add_document(home.root, "Doc", "alice", None, vec![Field::text("a", "b")])
            .await;
        let perms = MemoryPermissions::new(store.clone());
        (store, perms, doc)
    }

    #[tokio::test]
    async fn test_owner_and_admin_can_read() {
        let (_store, perms, doc) = fixture().await;
        let gid = GlobalIdentifier::document(doc);
        assert!(perms.can_read(&Principal::new("alice"), &gid).await.unwrap());
        assert!(!perms.can_read(&Principal::new("bob"), &gid).await.unwrap());
        assert!(perms.can_read(&Principal::admin("root"), &gid).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_and_deny() {
        let (_store, perms, doc) = fixture().await;
        let gid = GlobalIdentifier::document(doc);
        perms.grant_read("bob", &gid).await;
        assert!(perms.can_read(&Principal::new("bob"), &gid).await.unwrap());
        perms.deny_read("alice", &gid).await;
        assert!(!perms.can_read(&Principal::new("alice"), &gid).await.unwrap());
    }

    #[tokio::test]
    async fn test_export_scopes() {
        let (store, perms, _) = fixture().await;
        store.add_group("lab", "alice", &["alice", "bob"]).await;
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");
        assert!(perms.can_export_user(&alice, "alice").await.unwrap());
        assert!(!perms.can_export_user(&bob, "alice").await.unwrap());
        assert!(perms.can_export_group(&alice, "lab").await.unwrap());
        assert!(!perms.can_export_group(&bob, "lab").await.unwrap());
    }
}
