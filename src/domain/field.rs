//! Field names and field metadata.
//!
//! A field name is a dotted path of segments, each matching
//! `[A-Za-z][A-Za-z0-9_-]*`. Metadata records come from backend introspection
//! and are stored in the [`FieldCache`](crate::cache::FieldCache).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static FIELD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*(\.[A-Za-z][A-Za-z0-9_-]*)*$")
        .expect("Invalid field name regex")
});

/// Returns `true` if `name` is a dotted path of valid segments.
///
/// Rejects leading/trailing/double dots, digit-, hyphen- or underscore-leading
/// segments and any character outside `[A-Za-z0-9_-.]`.
///
/// # Example
///
/// ```
/// use esview::domain::field::is_valid_field_name;
///
/// assert!(is_valid_field_name("kubernetes.pod.name"));
/// assert!(!is_valid_field_name("pod..name"));
/// assert!(!is_valid_field_name("1st"));
/// ```
#[must_use]
pub fn is_valid_field_name(name: &str) -> bool {
    FIELD_NAME.is_match(name)
}

/// Type and capability information for one field of the current index.
///
/// Records are immutable; updating a field replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Backend mapping type (`keyword`, `long`, `date`, ...).
    #[serde(rename = "type")]
    pub field_type: String,
    pub searchable: bool,
    pub aggregatable: bool,
    /// Whether the field occurs in the current result set.
    #[serde(default)]
    pub active: bool,
}

impl FieldMetadata {
    /// Creates an inactive record.
    #[must_use]
    pub fn new(field_type: impl Into<String>, searchable: bool, aggregatable: bool) -> Self {
        Self {
            field_type: field_type.into(),
            searchable,
            aggregatable,
            active: false,
        }
    }

    /// Returns a copy with the `active` flag set to `active`.
    #[must_use]
    pub fn with_active(&self, active: bool) -> Self {
        Self {
            active,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("status")]
    #[case("a")]
    #[case("http.response.status_code")]
    #[case("kubernetes.pod-name")]
    #[case("Field_1.sub-2")]
    fn accepts_valid_names(#[case] name: &str) {
        assert!(is_valid_field_name(name), "{name} should be valid");
    }

    #[rstest]
    #[case("")]
    #[case("1field")]
    #[case(".field")]
    #[case("field.")]
    #[case("a..b")]
    #[case("first name")]
    #[case("user@host")]
    #[case("a.1b")]
    #[case("-field")]
    #[case("_field")]
    #[case("a._b")]
    #[case("a.-b")]
    fn rejects_invalid_names(#[case] name: &str) {
        assert!(!is_valid_field_name(name), "{name} should be invalid");
    }

    proptest! {
        #[test]
        fn generated_dotted_paths_are_valid(name in "[A-Za-z][A-Za-z0-9_-]{0,8}(\\.[A-Za-z][A-Za-z0-9_-]{0,8}){0,4}") {
            prop_assert!(is_valid_field_name(&name));
        }

        #[test]
        fn digit_leading_segments_are_invalid(head in "[A-Za-z]{1,5}", tail in "[0-9][A-Za-z0-9]{0,5}") {
            let name = format!("{head}.{tail}");
            prop_assert!(!is_valid_field_name(&name));
        }
    }

    #[test]
    fn with_active_replaces_only_the_flag() {
        let meta = FieldMetadata::new("keyword", true, true);
        let active = meta.with_active(true);
        assert!(active.active);
        assert_eq!(active.field_type, "keyword");
        assert!(!meta.active);
    }
}
