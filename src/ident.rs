//! Mapping raw executable names to identifiers.
//!
//! An identifier matches `[A-Za-z_][A-Za-z0-9_]*`. Raw names are converted by
//! replacing every other character with `_` and prefixing `_` when the result
//! would start with a digit.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

static NON_IDENTIFIER_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid character class regex"));

/// Whether `s` is usable both as a registry key and as an attribute-like name.
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER.is_match(s)
}

/// Turn an arbitrary string into an identifier.
///
/// ```
/// use path_commands::ident::to_identifier;
/// assert_eq!(
///     to_identifier("a-string$with@non*identifier(characters)"),
///     "a_string_with_non_identifier_characters_"
/// );
/// assert_eq!(to_identifier("123go"), "_123go");
/// ```
pub fn to_identifier(raw: &str) -> String {
    let replaced = NON_IDENTIFIER_CHAR.replace_all(raw, "_");
    match replaced.chars().next() {
        None => "_".to_string(),
        Some(c) if c.is_ascii_digit() => format!("_{replaced}"),
        Some(_) => replaced.into_owned(),
    }
}

/// Result of mapping a sequence of raw names to identifiers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdentifierMapping {
    /// `(identifier, raw name)` pairs in input order.
    pub pairs: Vec<(String, String)>,
    /// Raw names dropped because an earlier name claimed their identifier.
    pub collisions: Vec<(String, String)>,
}

/// Map raw names to identifiers, keeping the first name that claims each one.
pub fn identifier_mapping<I, S>(raw_names: I) -> IdentifierMapping
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    let mut mapping = IdentifierMapping::default();
    for raw in raw_names {
        let raw = raw.into();
        let id = to_identifier(&raw);
        if seen.insert(id.clone()) {
            mapping.pairs.push((id, raw));
        } else {
            mapping.collisions.push((id, raw));
        }
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_are_unchanged() {
        for name in ["ls", "_private", "python3", "CamelCase"] {
            assert!(is_identifier(name));
            assert_eq!(to_identifier(name), name);
        }
    }

    #[test]
    fn illegal_characters_become_underscores() {
        assert_eq!(to_identifier("x86_64-linux-gnu-gcc"), "x86_64_linux_gnu_gcc");
        assert_eq!(to_identifier("python3.12"), "python3_12");
        assert_eq!(to_identifier("g++"), "g__");
        assert_eq!(to_identifier("ünïcode"), "_n_code");
    }

    #[test]
    fn leading_digit_gets_prefixed() {
        assert_eq!(to_identifier("7z"), "_7z");
        assert_eq!(to_identifier("2to3-3.12"), "_2to3_3_12");
    }

    #[test]
    fn empty_name_maps_to_underscore() {
        assert_eq!(to_identifier(""), "_");
    }

    #[test]
    fn sanitized_output_is_always_an_identifier() {
        for raw in ["", "-", "...", "1", "a b", "[", "x.y-z", "été", "0day"] {
            let id = to_identifier(raw);
            assert!(is_identifier(&id), "{raw:?} -> {id:?}");
        }
    }

    #[test]
    fn rejects_non_identifiers() {
        for s in ["", "1abc", "a-b", "a.b", "a b"] {
            assert!(!is_identifier(s), "{s:?}");
        }
    }

    #[test]
    fn collisions_keep_first_occurrence() {
        let mapping = identifier_mapping(["foo-bar", "ls", "foo.bar", "foo_bar"]);
        assert_eq!(
            mapping.pairs,
            vec![
                ("foo_bar".to_string(), "foo-bar".to_string()),
                ("ls".to_string(), "ls".to_string()),
            ]
        );
        assert_eq!(
            mapping.collisions,
            vec![
                ("foo_bar".to_string(), "foo.bar".to_string()),
                ("foo_bar".to_string(), "foo_bar".to_string()),
            ]
        );
    }
}
