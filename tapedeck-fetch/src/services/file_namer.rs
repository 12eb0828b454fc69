//! Filesystem-safe path segment naming
//!
//! `sanitize` maps arbitrary catalog text (album names, resource basenames)
//! to a single path segment. The trailing extension is kept verbatim so the
//! container type survives; everything in the base that is not alphanumeric,
//! space, `-`, `_`, `(` or `)` becomes `_`.
//!
//! A suffix containing a path separator or control character is not treated
//! as an extension, so the result is always a single segment.
//!
//! Distinct inputs can collapse to the same output (`"A!"` and `"A?"` both
//! give `"A_"`); callers that need unique paths resolve that themselves.

/// Placeholder used for empty names and for empty album contexts
pub const MISCELLANEOUS: &str = "Miscellaneous";

/// Convert arbitrary text into a filesystem-safe path segment
///
/// Deterministic and idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(name: &str) -> String {
    let name = if name.is_empty() { MISCELLANEOUS } else { name };

    let (base, ext) = match name.rfind('.') {
        Some(dot) if is_keepable_extension(&name[dot + 1..]) => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };

    let cleaned: String = base
        .chars()
        .map(|c| if is_safe_char(c) { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim();

    // A bare "." or ".mp3" would otherwise become a dot-only segment
    let base = if cleaned.is_empty() { MISCELLANEOUS } else { cleaned };

    format!("{}{}", base, ext)
}

/// Extension of a sanitized-or-raw name, lowercased, without the dot
pub fn extension_of(name: &str) -> Option<String> {
    name.rfind('.')
        .map(|dot| name[dot + 1..].to_lowercase())
        .filter(|ext| !ext.is_empty())
}

// A suffix carrying a separator is part of the name, not an extension
fn is_keepable_extension(ext: &str) -> bool {
    !ext.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

fn is_safe_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '(' | ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_extension() {
        assert_eq!(sanitize("Song: One?.m4a"), "Song_ One_.m4a");
        assert_eq!(sanitize("track01.mp3"), "track01.mp3");
    }

    #[test]
    fn test_album_without_extension() {
        assert_eq!(sanitize("Holiday!!"), "Holiday__");
        assert_eq!(sanitize("Main Street Electrical Parade"), "Main Street Electrical Parade");
    }

    #[test]
    fn test_empty_becomes_sentinel() {
        assert_eq!(sanitize(""), MISCELLANEOUS);
        assert_eq!(sanitize("   "), MISCELLANEOUS);
        assert_eq!(sanitize("."), "Miscellaneous.");
        assert_eq!(sanitize(".mp3"), "Miscellaneous.mp3");
    }

    #[test]
    fn test_only_last_dot_splits() {
        assert_eq!(sanitize("Vol. 2 - Intro.mp3"), "Vol_ 2 - Intro.mp3");
        assert_eq!(sanitize("a.b.c"), "a_b.c");
    }

    #[test]
    fn test_trims_surrounding_whitespace() {
        assert_eq!(sanitize("  Fantasmic  .mp3"), "Fantasmic.mp3");
    }

    #[test]
    fn test_unicode_letters_kept() {
        assert_eq!(sanitize("Café Orléans.mp3"), "Café Orléans.mp3");
    }

    #[test]
    fn test_path_separators_replaced() {
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize("a\\b"), "a_b");
    }

    #[test]
    fn test_separator_after_dot_is_not_an_extension() {
        assert_eq!(sanitize("Disney Vol. 1/2"), "Disney Vol_ 1_2");
        assert!(!sanitize("x.a/b").contains('/'));
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "",
            " ",
            ".",
            "..",
            ".mp3",
            "Song: One?.m4a",
            "Holiday!!",
            "  spaced  out  ",
            "a.b.c",
            "weird\textension.m?4a",
            "Tiki Room (Remastered) [2003]",
            "ü/ß\\x",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Song_ One_.M4A"), Some("m4a".to_string()));
        assert_eq!(extension_of("Holiday__"), None);
        assert_eq!(extension_of("trailing."), None);
    }
}
