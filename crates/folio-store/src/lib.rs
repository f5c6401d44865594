//! # folio-store
//!
//! In-memory implementations of the collaborator traits the folio archive
//! engine depends on.
//!
//! This crate provides:
//! - [`MemoryStore`]: folders, documents with revision history, media items
//!   and forms behind the persistence traits
//! - [`MemoryPermissions`]: an ownership and sharing permission model
//! - [`MemoryNfs`] and [`FixedDiskSpace`]: network filesystem and free disk space
//!
//! ## Example
//!
//! ```rust,ignore
//! use folio_store::{MemoryStore, Field};
//!
//! let store = MemoryStore::new();
//! let home = store.add_user("alice").await;
//! let doc = store
//!     .add_document(home.root, "Protocol", "alice", None, vec![Field::text("Data", "...")])
//!     .await;
//! ```

pub mod memory;
pub mod nfs;
pub mod permissions;

pub use memory::{MemoryStore, UserHome};
pub use nfs::{FixedDiskSpace, MemoryNfs};
pub use permissions::MemoryPermissions;

// Re-export core types for convenience
pub use folio_core::*;
