//! Schema 1 → 2: per-kind metadata lists become one tagged `gallery_refs` list.
//!
//! Schema 1 fields carried a separate list for each kind of referenced item
//! (`images`, `audios`, ...). Schema 2 keeps a single list whose entries are
//! tagged with `kind`. Entries keep their relative order within a kind, and
//! kinds follow the order below, which is the order schema 1 readers
//! concatenated them in.

use serde_json::{Map, Value};

use crate::format::migration::{MigrationError, MigrationResult, SchemaMigration};
use crate::format::warning::MigrationWarning;

/// Legacy list key → `kind` tag.
const LEGACY_LISTS: &[(&str, &str)] = &[
    ("images", "image"),
    ("audios", "audio"),
    ("videos", "video"),
    ("chem_elements", "chem"),
    ("annotations", "annotation"),
    ("attachments", "attachment"),
    ("linked_records", "link"),
    ("sketches", "sketch"),
    ("maths", "math"),
    ("nfs_files", "nfs_file"),
];

pub struct TaggedGalleryRefs;

impl TaggedGalleryRefs {
    fn migrate_field(
        field: &mut Map<String, Value>,
        counts: &mut [usize; LEGACY_LISTS.len()],
    ) -> Result<(), MigrationError> {
        let mut refs = match field.remove("gallery_refs") {
            Some(Value::Array(existing)) => existing,
            Some(_) => {
                return Err(MigrationError::MigrationFailed(
                    "gallery_refs is not a list".to_string(),
                ))
            }
            None => Vec::new(),
        };

        for (i, (key, tag)) in LEGACY_LISTS.iter().enumerate() {
            let Some(list) = field.remove(*key) else {
                continue;
            };
            let Value::Array(entries) = list else {
                return Err(MigrationError::MigrationFailed(format!(
                    "legacy list '{}' is not a list",
                    key
                )));
            };
            for entry in entries {
                let Value::Object(mut obj) = entry else {
                    return Err(MigrationError::MigrationFailed(format!(
                        "entry in '{}' is not an object",
                        key
                    )));
                };
                obj.insert("kind".to_string(), Value::from(*tag));
                refs.push(Value::Object(obj));
                counts[i] += 1;
            }
        }

        field.insert("gallery_refs".to_string(), Value::Array(refs));
        field.insert("schema_version".to_string(), Value::from(2u32));
        Ok(())
    }
}

impl SchemaMigration for TaggedGalleryRefs {
    fn from_version(&self) -> u32 {
        1
    }

    fn to_version(&self) -> u32 {
        2
    }

    fn description(&self) -> &str {
        "Merge per-kind field metadata lists into tagged gallery_refs"
    }

    fn migrate(&self, mut data: Value) -> Result<MigrationResult, MigrationError> {
        let mut counts = [0usize; LEGACY_LISTS.len()];

        if let Some(fields) = data.get_mut("fields") {
            let Value::Array(fields) = fields else {
                return Err(MigrationError::MigrationFailed(
                    "fields is not a list".to_string(),
                ));
            };
            for field in fields.iter_mut() {
                let Value::Object(obj) = field else {
                    return Err(MigrationError::MigrationFailed(
                        "field is not an object".to_string(),
                    ));
                };
                Self::migrate_field(obj, &mut counts)?;
            }
        }

        if let Value::Object(obj) = &mut data {
            obj.insert("schema_version".to_string(), Value::from(2u32));
        }

        let warnings = LEGACY_LISTS
            .iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .map(|((key, _), count)| MigrationWarning::FieldRestructured {
                from: key.to_string(),
                to: "gallery_refs".to_string(),
                count,
            })
            .collect();

        Ok(MigrationResult { data, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merges_lists_in_kind_order() {
        let v1 = json!({
            "schema_version": 1,
            "fields": [{
                "name": "Data",
                "field_type": "text",
                "data": "",
                "linked_records": [{"target": "SD4", "name": "other"}],
                "images": [{"global_id": "IM1"}, {"global_id": "IM2"}]
            }]
        });

        let result = TaggedGalleryRefs.migrate(v1).unwrap();
        let field = &result.data["fields"][0];
        let refs = field["gallery_refs"].as_array().unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0]["kind"], "image");
        assert_eq!(refs[1]["global_id"], "IM2");
        assert_eq!(refs[2]["kind"], "link");
        assert!(field.get("images").is_none());
        assert_eq!(field["schema_version"], 2);
        assert_eq!(result.data["schema_version"], 2);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_field_without_lists_gets_empty_refs() {
        let v1 = json!({"schema_version": 1, "fields": [{"name": "x", "data": "y"}]});
        let result = TaggedGalleryRefs.migrate(v1).unwrap();
        assert_eq!(result.data["fields"][0]["gallery_refs"], json!([]));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_rejects_malformed_list() {
        let v1 = json!({"schema_version": 1, "fields": [{"images": "nope"}]});
        assert!(TaggedGalleryRefs.migrate(v1).is_err());
    }
}
