use std::path::Path;

/// Check if a file carries the given extension, ignoring ASCII case
///
/// `extension` is given without the leading dot.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
