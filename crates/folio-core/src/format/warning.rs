//! Warnings for non-fatal schema migration issues.

use serde::{Deserialize, Serialize};

/// Warnings that can be emitted while upgrading archived entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationWarning {
    /// Entries of a legacy field were moved into a new structure.
    FieldRestructured {
        from: String,
        to: String,
        count: usize,
    },
    /// A default value was applied to a missing field.
    DefaultApplied { field: String, default: String },
    /// An unknown field was encountered and ignored.
    UnknownFieldIgnored { field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_serialization() {
        let warning = MigrationWarning::FieldRestructured {
            from: "images".to_string(),
            to: "gallery_refs".to_string(),
            count: 5,
        };
        let json = serde_json::to_string(&warning).unwrap();
        assert!(json.contains("field_restructured"));
        assert!(json.contains("images"));

        let deserialized: MigrationWarning = serde_json::from_str(&json).unwrap();
        assert_eq!(warning, deserialized);
    }
}
