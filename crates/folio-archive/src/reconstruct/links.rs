//! Link rewriting.
//!
//! Runs after every record exists in the target, so forward references
//! resolve as well as backward ones. Planning is pure: it reads the archived
//! fields and the remap table and returns the field updates to persist.

use std::collections::BTreeSet;

use folio_core::{rewrite_refs, ArchivalField, ExternalWorkflowRef, Field, GlobalIdentifier, RefKind};

use super::remap::RemapTable;
use crate::parser::ParsedDocument;

/// A revision unit that now exists in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedRevision {
    /// Index into the parsed document list.
    pub index: usize,
    /// New document id.
    pub document_id: u64,
    /// `None` for the current revision.
    pub revision: Option<u32>,
}

/// Fields to write back for one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdate {
    pub document_id: u64,
    pub revision: Option<u32>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Default)]
pub struct RewritePlan {
    pub updates: Vec<FieldUpdate>,
    pub rewritten: usize,
    /// Link targets that were not imported, unversioned and deduplicated.
    pub unresolved: BTreeSet<String>,
}

/// Stored form of an archived field, references untouched.
pub fn to_field(field: &ArchivalField) -> Field {
    Field {
        name: field.name.clone(),
        field_type: field.field_type,
        data: field.data.clone(),
        workflows: field.workflows.clone(),
    }
}

/// Result of rewriting one revision's fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewrittenFields {
    pub fields: Vec<Field>,
    pub rewritten: usize,
    pub unresolved: Vec<GlobalIdentifier>,
}

/// Rewrite embedded references and workflow records through `remap`.
///
/// NFS references name files outside the record store and are never remapped.
pub fn rewrite_fields(fields: &[ArchivalField], remap: &RemapTable) -> RewrittenFields {
    let mut out = RewrittenFields::default();
    for field in fields {
        let mut rewritten = 0;
        let (data, left) = rewrite_refs(&field.data, |r| {
            if r.kind == RefKind::NfsFile {
                return None;
            }
            let new = remap.resolve(&r.target);
            if new.is_some() {
                rewritten += 1;
            }
            new
        });
        out.unresolved.extend(
            left.into_iter()
                .filter(|r| r.kind != RefKind::NfsFile)
                .map(|r| r.target.unversioned()),
        );

        let workflows: Vec<ExternalWorkflowRef> = field
            .workflows
            .iter()
            .map(|w| match remap.resolve(&w.record) {
                Some(record) => {
                    rewritten += 1;
                    ExternalWorkflowRef {
                        record,
                        ..w.clone()
                    }
                }
                None => {
                    out.unresolved.push(w.record.unversioned());
                    w.clone()
                }
            })
            .collect();

        out.rewritten += rewritten;
        out.fields.push(Field {
            name: field.name.clone(),
            field_type: field.field_type,
            data,
            workflows,
        });
    }
    out
}

/// Plan field updates for every created revision.
pub fn plan_rewrites(
    documents: &[ParsedDocument],
    created: &[CreatedRevision],
    remap: &RemapTable,
) -> RewritePlan {
    let mut plan = RewritePlan::default();
    for c in created {
        let Some(parsed) = documents.get(c.index) else {
            continue;
        };
        let result = rewrite_fields(&parsed.document.fields, remap);
        plan.unresolved
            .extend(result.unresolved.iter().map(|g| g.to_string()));
        if result.rewritten > 0 {
            plan.rewritten += result.rewritten;
            plan.updates.push(FieldUpdate {
                document_id: c.document_id,
                revision: c.revision,
                fields: result.fields,
            });
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{render_nfs_ref, render_ref, FieldType, GlobalIdPrefix, CURRENT_SCHEMA_VERSION};

    fn field(data: String, workflows: Vec<ExternalWorkflowRef>) -> ArchivalField {
        ArchivalField {
            schema_version: CURRENT_SCHEMA_VERSION,
            name: "Data".into(),
            field_type: FieldType::Text,
            data,
            gallery_refs: vec![],
            workflows,
        }
    }

    fn table() -> RemapTable {
        let mut t = RemapTable::new();
        t.insert(GlobalIdentifier::document(1), GlobalIdentifier::document(101));
        t.insert(
            GlobalIdentifier::new(GlobalIdPrefix::IM, 2),
            GlobalIdentifier::new(GlobalIdPrefix::IM, 102),
        );
        t
    }

    #[test]
    fn test_rewrites_known_targets_only() {
        let data = format!(
            "see {} and {} and {}",
            render_ref(RefKind::Link, &GlobalIdentifier::document(1).with_version(2), "one"),
            render_ref(RefKind::Image, &GlobalIdentifier::new(GlobalIdPrefix::IM, 2), "gel"),
            render_ref(RefKind::Link, &GlobalIdentifier::document(7), "elsewhere"),
        );
        let result = rewrite_fields(&[field(data, vec![])], &table());
        let text = &result.fields[0].data;
        assert!(text.contains("data-globalid=\"SD101\""));
        assert!(text.contains("data-globalid=\"IM102\""));
        assert!(text.contains("data-globalid=\"SD7\""));
        assert!(!text.contains("SD1v2"));
        assert_eq!(result.rewritten, 2);
        assert_eq!(result.unresolved, vec![GlobalIdentifier::document(7)]);
    }

    #[test]
    fn test_nfs_refs_are_left_alone() {
        let nfs = GlobalIdentifier::new(GlobalIdPrefix::NF, 3);
        let data = render_nfs_ref(&nfs, "/lab/run.csv", "run");
        let result = rewrite_fields(&[field(data.clone(), vec![])], &table());
        assert_eq!(result.fields[0].data, data);
        assert_eq!(result.rewritten, 0);
        assert!(result.unresolved.is_empty());
    }

    #[test]
    fn test_workflow_records_are_rewritten() {
        let workflow = ExternalWorkflowRef {
            service: "galaxy".into(),
            external_id: "run-9".into(),
            base_url: "https://galaxy.example.org".into(),
            record: GlobalIdentifier::document(1),
        };
        let missing = ExternalWorkflowRef {
            record: GlobalIdentifier::document(8),
            ..workflow.clone()
        };
        let result = rewrite_fields(&[field(String::new(), vec![workflow, missing])], &table());
        assert_eq!(result.fields[0].workflows[0].record, GlobalIdentifier::document(101));
        assert_eq!(result.fields[0].workflows[1].record, GlobalIdentifier::document(8));
        assert_eq!(result.rewritten, 1);
        assert_eq!(result.unresolved, vec![GlobalIdentifier::document(8)]);
    }

    #[test]
    fn test_to_field_keeps_data() {
        let data = render_ref(RefKind::Link, &GlobalIdentifier::document(1), "one");
        let f = to_field(&field(data.clone(), vec![]));
        assert_eq!(f.data, data);
        assert_eq!(f.field_type, FieldType::Text);
    }
}
