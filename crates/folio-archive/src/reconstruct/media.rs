//! Media file conflict resolution.
//!
//! A media unit may carry several candidate files (an original and a
//! converted copy, say). The file whose extension matches the recorded
//! canonical extension wins; `tif`/`tiff` and `jpg`/`jpeg` are treated as
//! the same extension and comparison ignores case. Without a match the
//! first file is used.

use folio_core::StoredFile;

/// Lowercased extension with aliases folded.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "tiff" => "tif".to_string(),
        "jpeg" => "jpg".to_string(),
        _ => ext,
    }
}

pub fn extension_of(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

/// The file picked for a media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChosenFile<'a> {
    pub file: &'a StoredFile,
    /// Extension of the chosen file as written in its name.
    pub extension: String,
    /// Whether the extension matched the canonical one.
    pub matched: bool,
    /// Whether there was more than one candidate.
    pub conflict: bool,
}

/// Pick a file for `canonical_extension`, or `None` when there are no files.
pub fn choose_file<'a>(canonical_extension: &str, files: &'a [StoredFile]) -> Option<ChosenFile<'a>> {
    let wanted = normalize_extension(canonical_extension);
    let matching = files.iter().find(|f| {
        extension_of(&f.file_name)
            .map(|ext| normalize_extension(ext) == wanted)
            .unwrap_or(false)
    });
    let (file, matched) = match matching {
        Some(f) => (f, true),
        None => (files.first()?, false),
    };
    Some(ChosenFile {
        file,
        extension: extension_of(&file.file_name).unwrap_or_default().to_string(),
        matched,
        conflict: files.len() > 1,
    })
}
