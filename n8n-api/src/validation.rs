//! Validation functions
//!

/// Determine if a string is (probably) a server-assigned workflow id,
/// using syntactic checks.
/// Does not check whether the apparent-id names an actual workflow.
///
/// n8n ids are nanoid-style strings, typically 16 characters from the
/// url-safe alphabet. The bounds here are loose on purpose; a too-strict
/// check would misclassify ids from older server versions.
pub fn looks_like_workflow_id(s: &str) -> bool {
    const MIN_LEN: usize = 10;
    const MAX_LEN: usize = 24;

    (MIN_LEN..=MAX_LEN).contains(&s.len())
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Determine if a reference value is (probably) a display name rather than
/// an id: names contain spaces or tag brackets, or are longer than any id
/// the server would mint.
pub fn looks_like_display_name(s: &str) -> bool {
    s.contains(' ') || s.contains('[') || s.len() > 50
}
