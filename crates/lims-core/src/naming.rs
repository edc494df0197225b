//! Folder-safe names for cases and attachments

/// Characters that may not appear in a case folder or attachment name
pub const RESERVED_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace every reserved character with `_` and trim surrounding whitespace
///
/// Distinct labels can collapse to the same name (`a/b` and `a:b`); such cases
/// share one folder.
#[must_use]
pub fn safe_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Check if a sanitized name can stand as a single path component
///
/// Empty, `.` and `..` would resolve to the parent folder or its parent.
#[inline]
#[must_use]
pub fn is_usable(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".."
}

/// Check if a name needs no sanitizing
#[inline]
#[must_use]
pub fn is_safe(name: &str) -> bool {
    !name.contains(RESERVED_CHARS.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn replaces_reserved_characters() {
        assert_eq!(safe_name(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn keeps_accents_and_spaces() {
        assert_eq!(safe_name("  Juan Pérez "), "Juan Pérez");
    }

    #[test]
    fn dot_names_are_unusable() {
        for raw in ["", "  ", ".", " .. "] {
            assert!(!is_usable(&safe_name(raw)), "{raw:?}");
        }
        assert!(is_usable("..."));
        assert!(is_usable(".hidden"));
    }

    #[test]
    fn collisions_merge() {
        assert_eq!(safe_name("a/b"), safe_name("a:b"));
    }

    proptest! {
        #[test]
        fn sanitized_names_never_contain_reserved(raw in ".*") {
            let name = safe_name(&raw);
            prop_assert!(is_safe(&name));
        }

        #[test]
        fn sanitizing_is_idempotent(raw in ".*") {
            let once = safe_name(&raw);
            prop_assert_eq!(safe_name(&once), once);
        }
    }
}
