//! Filename-extension validation
//!
//! The pipeline does no content inspection; the only gate is the lower-cased
//! text after the final `.` of the object key.

use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "jpg", "png"];

/// Derive the file extension from an object key.
///
/// Returns the text after the final `.`, lower-cased. A key without any `.`
/// yields the whole key lower-cased.
pub fn extract_extension(object_key: &str) -> String {
    match object_key.rsplit_once('.') {
        Some((_, extension)) => extension.to_lowercase(),
        None => object_key.to_lowercase(),
    }
}

/// Fixed set of extensions permitted to pass validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionAllowList {
    extensions: Vec<String>,
}

impl ExtensionAllowList {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extensions: Vec<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        extensions.sort();
        extensions.dedup();
        Self { extensions }
    }

    pub fn is_allowed(&self, extension: &str) -> bool {
        let normalized = extension.to_lowercase();
        self.extensions.iter().any(|e| e == &normalized)
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl Default for ExtensionAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_EXTENSIONS)
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,47}$").expect("static identifier pattern"))
}

/// Whether `name` is safe to splice into SQL as a table identifier.
pub fn is_valid_table_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_extension_lowercases_suffix() {
        assert_eq!(extract_extension("report.pdf"), "pdf");
        assert_eq!(extract_extension("Photos/Holiday.JPG"), "jpg");
        assert_eq!(extract_extension("archive.tar.gz"), "gz");
    }

    #[test]
    fn test_extract_extension_without_separator_uses_whole_key() {
        assert_eq!(extract_extension("README"), "readme");
        assert_eq!(extract_extension("trailing."), "");
    }

    #[test]
    fn test_default_allow_list() {
        let allow = ExtensionAllowList::default();
        assert!(allow.is_allowed("pdf"));
        assert!(allow.is_allowed("JPG"));
        assert!(allow.is_allowed("png"));
        assert!(!allow.is_allowed("exe"));
        assert!(!allow.is_allowed("jpeg"));
        assert!(!allow.is_allowed(""));
    }

    #[test]
    fn test_allow_list_normalizes_entries() {
        let allow = ExtensionAllowList::new([" .PDF", "png", "png", ""]);
        assert_eq!(allow.extensions(), &["pdf".to_string(), "png".to_string()]);
    }

    #[test]
    fn test_table_identifier_validation() {
        assert!(is_valid_table_identifier("file_metadata"));
        assert!(is_valid_table_identifier("_staging2"));
        assert!(!is_valid_table_identifier("FileMetadata"));
        assert!(!is_valid_table_identifier("file-metadata"));
        assert!(!is_valid_table_identifier("metadata; DROP TABLE x"));
        assert!(!is_valid_table_identifier("1table"));
        assert!(!is_valid_table_identifier(""));
    }
}
