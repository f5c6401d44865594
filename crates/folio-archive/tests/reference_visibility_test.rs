// Test: references to records the exporter cannot read
//
// A selected document may link to or embed records owned by someone else.
// Their names and file metadata reach the archive only when the exporting
// principal may read them.

mod common;

use common::Fixture;
use folio_archive::{package, ArchiveResult, ExportScope};
use folio_core::{
    render_ref, ArchivalDocument, Field, GalleryRef, GlobalIdPrefix, GlobalIdentifier, MediaKind,
    Principal, RefKind, StoredFile,
};

struct Seeded {
    alice_doc: u64,
    bob_doc: u64,
    bob_image: u64,
}

/// alice's document links to bob's document and embeds bob's image.
async fn seed(fx: &Fixture) -> Seeded {
    let alice = fx.source.add_user("alice").await;
    let bob = fx.source.add_user("bob").await;
    let bob_image = fx
        .source
        .add_media(
            bob.gallery(),
            MediaKind::Image,
            "Bob private scan",
            "bob",
            vec![StoredFile {
                file_name: "secret.png".into(),
                bytes: b"png-bytes".to_vec(),
            }],
        )
        .await;
    let bob_doc = fx
        .source
        .add_document(bob.root, "Bob secret plan", "bob", None, vec![Field::text("Data", "x")])
        .await;
    let data = format!(
        "{} {}",
        render_ref(RefKind::Link, &GlobalIdentifier::document(bob_doc), "plan"),
        render_ref(RefKind::Image, &GlobalIdentifier::new(GlobalIdPrefix::IM, bob_image), "pic"),
    );
    let alice_doc = fx
        .source
        .add_document(alice.root, "Notes", "alice", None, vec![Field::text("Data", data)])
        .await;
    Seeded {
        alice_doc,
        bob_doc,
        bob_image,
    }
}

async fn export_as_alice(fx: &Fixture, seeded: &Seeded) -> anyhow::Result<ArchiveResult> {
    Ok(fx
        .export(
            ExportScope::Selection(vec![GlobalIdentifier::document(seeded.alice_doc)]),
            &Principal::new("alice"),
        )
        .await?)
}

fn exported_document(archive: &ArchiveResult) -> anyhow::Result<(ArchivalDocument, String)> {
    let tree = package::unpack(&archive.path)?;
    let (_, bytes) = tree
        .iter()
        .find(|(p, _)| p.ends_with("/doc.json"))
        .ok_or_else(|| anyhow::anyhow!("no document in archive"))?;
    let raw = String::from_utf8(bytes.to_vec())?;
    Ok((serde_json::from_slice(bytes)?, raw))
}

#[tokio::test]
async fn test_unreadable_targets_are_exported_without_names() -> anyhow::Result<()> {
    let fx = Fixture::new();
    let seeded = seed(&fx).await;

    let archive = export_as_alice(&fx, &seeded).await?;
    let (doc, raw) = exported_document(&archive)?;

    assert!(!raw.contains("Bob secret plan"));
    assert!(!raw.contains("Bob private scan"));
    assert!(!raw.contains("secret.png"));
    assert!(!archive.files.iter().any(|f| f.contains("secret.png")));

    let mut seen_link = false;
    let mut seen_image = false;
    for r in doc.gallery_refs() {
        match r {
            GalleryRef::Link(link) => {
                assert_eq!(link.target.id, seeded.bob_doc);
                assert!(link.name.is_empty());
                assert!(link.archive_path.is_none());
                seen_link = true;
            }
            GalleryRef::Image(meta) => {
                assert_eq!(meta.global_id.id, seeded.bob_image);
                assert!(meta.name.is_empty());
                assert!(meta.file_name.is_empty());
                assert_eq!(meta.size, 0);
                seen_image = true;
            }
            other => panic!("unexpected reference {:?}", other),
        }
    }
    assert!(seen_link && seen_image);
    Ok(())
}

#[tokio::test]
async fn test_shared_targets_keep_their_names() -> anyhow::Result<()> {
    let fx = Fixture::new();
    let seeded = seed(&fx).await;
    fx.permissions
        .grant_read("alice", &GlobalIdentifier::document(seeded.bob_doc))
        .await;

    let archive = export_as_alice(&fx, &seeded).await?;
    let (doc, raw) = exported_document(&archive)?;

    assert!(raw.contains("Bob secret plan"));
    assert!(!raw.contains("secret.png"));
    let link_name = doc.gallery_refs().find_map(|r| match r {
        GalleryRef::Link(link) => Some(link.name.clone()),
        _ => None,
    });
    assert_eq!(link_name.as_deref(), Some("Bob secret plan"));
    Ok(())
}
