//! Embedded references inside rich-text field data.
//!
//! Rich text marks links and gallery items with elements of the form
//!
//! ```text
//! <a class="linked-record" data-globalid="SD12">Protocol</a>
//! <img class="gallery-image" data-globalid="IM7" />
//! <a class="nfs-file" data-globalid="NF2" data-path="/runs/r1.csv">r1.csv</a>
//! ```
//!
//! The class decides the [`RefKind`]; only the `data-globalid` value is ever
//! rewritten, so surrounding markup survives a round trip byte for byte.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ids::GlobalIdentifier;

static REF_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<(?:a|img|span)\s+class="(?P<class>[a-z-]+)"\s+data-globalid="(?P<gid>[A-Z]{2}\d+(?:v\d+)?)"(?:\s+data-path="(?P<path>[^"]*)")?"#,
    )
    .expect("reference pattern is valid")
});

/// What an embedded reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Link,
    Image,
    Audio,
    Video,
    Chem,
    Annotation,
    Attachment,
    Sketch,
    Math,
    NfsFile,
}

impl RefKind {
    pub fn css_class(&self) -> &'static str {
        match self {
            RefKind::Link => "linked-record",
            RefKind::Image => "gallery-image",
            RefKind::Audio => "gallery-audio",
            RefKind::Video => "gallery-video",
            RefKind::Chem => "gallery-chem",
            RefKind::Annotation => "gallery-annotation",
            RefKind::Attachment => "gallery-attachment",
            RefKind::Sketch => "gallery-sketch",
            RefKind::Math => "gallery-math",
            RefKind::NfsFile => "nfs-file",
        }
    }

    pub fn from_css_class(class: &str) -> Option<Self> {
        let kind = match class {
            "linked-record" => RefKind::Link,
            "gallery-image" => RefKind::Image,
            "gallery-audio" => RefKind::Audio,
            "gallery-video" => RefKind::Video,
            "gallery-chem" => RefKind::Chem,
            "gallery-annotation" => RefKind::Annotation,
            "gallery-attachment" => RefKind::Attachment,
            "gallery-sketch" => RefKind::Sketch,
            "gallery-math" => RefKind::Math,
            "nfs-file" => RefKind::NfsFile,
            _ => return None,
        };
        Some(kind)
    }

    /// Gallery references point at media items that travel with the document.
    pub fn is_gallery(&self) -> bool {
        !matches!(self, RefKind::Link | RefKind::NfsFile)
    }
}

/// One reference found in field data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedRef {
    pub kind: RefKind,
    pub target: GlobalIdentifier,
    /// Path on the network filesystem, for [`RefKind::NfsFile`].
    pub path: Option<String>,
    /// Byte range of the identifier text inside the scanned string.
    pub id_span: Range<usize>,
}

/// Find every recognised reference in `text`, in document order.
///
/// Elements with an unknown class or an unparsable identifier are skipped.
pub fn scan_refs(text: &str) -> Vec<EmbeddedRef> {
    REF_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let kind = RefKind::from_css_class(caps.name("class")?.as_str())?;
            let gid = caps.name("gid")?;
            let target = GlobalIdentifier::parse(gid.as_str()).ok()?;
            Some(EmbeddedRef {
                kind,
                target,
                path: caps.name("path").map(|p| p.as_str().to_string()),
                id_span: gid.range(),
            })
        })
        .collect()
}

/// Rewrite the identifier of every reference for which `resolve` yields a
/// replacement. Returns the new text and the references left untouched.
pub fn rewrite_refs<F>(text: &str, mut resolve: F) -> (String, Vec<EmbeddedRef>)
where
    F: FnMut(&EmbeddedRef) -> Option<GlobalIdentifier>,
{
    let mut out = String::with_capacity(text.len());
    let mut unresolved = Vec::new();
    let mut cursor = 0;

    for r in scan_refs(text) {
        match resolve(&r) {
            Some(new_target) => {
                out.push_str(&text[cursor..r.id_span.start]);
                out.push_str(&new_target.to_string());
                cursor = r.id_span.end;
            }
            None => unresolved.push(r),
        }
    }
    out.push_str(&text[cursor..]);
    (out, unresolved)
}

/// Render a reference element the scanner recognises.
pub fn render_ref(kind: RefKind, target: &GlobalIdentifier, label: &str) -> String {
    match kind {
        RefKind::Image | RefKind::Sketch | RefKind::Annotation | RefKind::Math => format!(
            r#"<img class="{}" data-globalid="{}" alt="{}" />"#,
            kind.css_class(),
            target,
            label
        ),
        _ => format!(
            r#"<a class="{}" data-globalid="{}">{}</a>"#,
            kind.css_class(),
            target,
            label
        ),
    }
}

/// Render an NFS file reference element.
pub fn render_nfs_ref(target: &GlobalIdentifier, path: &str, label: &str) -> String {
    format!(
        r#"<a class="{}" data-globalid="{}" data-path="{}">{}</a>"#,
        RefKind::NfsFile.css_class(),
        target,
        path,
        label
    )
}
