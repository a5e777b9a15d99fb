//! Name sanitization for Kubernetes resources
//!
//! Test resource names are derived from source paths, so the same file always
//! addresses the same resource. Both functions are idempotent.

/// Maximum length of a DNS-1123 label
const MAX_NAME_LEN: usize = 63;

fn base_name(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(path)
}

/// Derive a resource name from a source path.
///
/// Takes the file name without extension, splits camel case, lower-cases it,
/// and collapses every run of non-alphanumeric characters into a single `-`.
/// Returns an empty string if nothing usable remains.
///
/// # Examples
/// ```
/// use yaks_common::sanitize::sanitize_name;
///
/// assert_eq!(sanitize_name("tests/helloWorld.feature"), "hello-world");
/// assert_eq!(sanitize_name("my_test  file.feature"), "my-test-file");
/// ```
pub fn sanitize_name(raw: &str) -> String {
    let stem = base_name(raw).split('.').next().unwrap_or_default();

    let mut name = String::with_capacity(stem.len());
    let mut separator = false;
    let mut after_lower = false;
    for c in stem.chars() {
        if !c.is_ascii_alphanumeric() {
            separator = true;
            after_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && after_lower {
            separator = true;
        }
        if separator && !name.is_empty() {
            name.push('-');
        }
        separator = false;
        after_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        name.push(c.to_ascii_lowercase());
    }

    name.truncate(MAX_NAME_LEN);
    name.trim_end_matches('-').to_string()
}

/// Derive a file name that is safe to mount into the test runtime.
///
/// Drops any query string and directory part and replaces characters outside
/// `[A-Za-z0-9._-]` with `-`.
pub fn sanitize_file_name(raw: &str) -> String {
    let without_query = raw.split('?').next().unwrap_or_default();
    base_name(without_query)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
