// Dweve GraphStore - Property Graph Import Orchestration
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Identifier sanitizing and literal escaping for Kuzu Cypher.
//!
//! Labels arrive from extraction output and are spliced into DDL and
//! statement text, so every label passes through [`table_name`] before use.
//! Values never are: they travel as parameters, and [`quote_string`] exists
//! only for rendering statements inline in diagnostics.

use super::templates::CHUNK_TABLE;
use std::borrow::Cow;
use std::hash::Hasher;
use unicode_normalization::UnicodeNormalization;
use xxhash_rust::xxh64::Xxh64;

/// Check if a string needs escaping for a Cypher string literal.
#[inline]
fn needs_escaping(s: &str) -> bool {
    s.chars()
        .any(|ch| matches!(ch, '\\' | '\'' | '"' | '\n' | '\r' | '\t' | '\x00'))
}

/// Escape a string value for use in a Cypher string literal.
///
/// Returns `Cow::Borrowed` when nothing needs escaping.
///
/// # Examples
///
/// ```
/// # use graphstore_kuzu::cypher::escape_string;
/// assert!(matches!(escape_string("user_name"), std::borrow::Cow::Borrowed(_)));
/// assert_eq!(escape_string("it's"), "it\\'s");
/// ```
pub fn escape_string(s: &str) -> Cow<'_, str> {
    if !needs_escaping(s) {
        return Cow::Borrowed(s);
    }

    let mut escaped = String::with_capacity(s.len() + 10);
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\x00' => escaped.push_str("\\u0000"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Quote a string value for Cypher with single quotes.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", escape_string(s))
}

/// Check if a string is a valid unquoted identifier.
///
/// Valid identifiers start with an ASCII letter or underscore and contain
/// only ASCII letters, digits and underscores.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Normalize a string to NFC form.
///
/// Composed and decomposed spellings of the same label map to one table.
pub fn normalize_unicode(s: &str) -> String {
    s.nfc().collect()
}

/// Control, zero-width and bidirectional formatting characters.
fn is_dangerous_unicode(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '\u{200B}'
                | '\u{200C}'
                | '\u{200D}'
                | '\u{FEFF}'
                | '\u{202A}'
                | '\u{202B}'
                | '\u{202C}'
                | '\u{202D}'
                | '\u{202E}'
                | '\u{2066}'
                | '\u{2067}'
                | '\u{2068}'
                | '\u{2069}'
                | '\u{00AD}'
                | '\u{061C}'
                | '\u{180E}'
        )
}

/// Table names user labels may not take.
const RESERVED_TABLES: &[&str] = &[CHUNK_TABLE];

/// Length of the hex digest appended to disambiguated names.
const DIGEST_LEN: usize = 8;

fn digest(parts: &[&str]) -> String {
    let mut hasher = Xxh64::new(0);
    for part in parts {
        hasher.write(part.as_bytes());
        hasher.write_u8(0);
    }
    format!("{:0width$x}", hasher.finish() as u32, width = DIGEST_LEN)
}

/// Split `name` into its head and a trailing `_xxxxxxxx` digest, if present.
fn strip_digest(name: &str) -> Option<&str> {
    name.rsplit_once('_')
        .filter(|(head, tail)| {
            !head.is_empty() && tail.len() == DIGEST_LEN && tail.bytes().all(|b| b.is_ascii_hexdigit())
        })
        .map(|(head, _)| head)
}

fn sanitize(cleaned: &str) -> String {
    let mut chars = cleaned.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return "_".to_string(),
    };

    let mut result = String::with_capacity(cleaned.len() + 1);
    if first.is_ascii_alphabetic() || first == '_' {
        result.push(first);
    } else if first.is_ascii_digit() {
        result.push('_');
        result.push(first);
    } else {
        result.push('_');
    }

    for c in chars {
        if c.is_ascii_alphanumeric() || c == '_' {
            result.push(c);
        } else {
            result.push('_');
        }
    }
    result
}

/// Convert a node or relationship label into a table name.
///
/// The label is NFC-normalized and stripped of invisible characters. A label
/// that is then a plain identifier is used as is. Any other label has every
/// character outside `[A-Za-z0-9_]` replaced by `_` (and a leading digit
/// prefixed with `_`), followed by `_` and an 8-digit xxh64 digest of the
/// label, so distinct labels never share a table. Reserved names such as the
/// chunk table, and identifiers that already end in a digest, are digested
/// too.
///
/// # Examples
///
/// ```
/// # use graphstore_kuzu::cypher::table_name;
/// assert_eq!(table_name("Person"), "Person");
/// assert!(table_name("works at").starts_with("works_at_"));
/// assert_ne!(table_name("works at"), table_name("works-at"));
/// assert!(table_name("3D Model").starts_with("_3D_Model_"));
/// ```
pub fn table_name(label: &str) -> String {
    let cleaned: String = normalize_unicode(label)
        .chars()
        .filter(|c| !is_dangerous_unicode(*c))
        .collect();

    let sanitized = sanitize(&cleaned);
    let verbatim = sanitized == cleaned
        && strip_digest(&sanitized).is_none()
        && !RESERVED_TABLES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(&sanitized));
    if verbatim {
        sanitized
    } else {
        format!("{}_{}", sanitized, digest(&[&cleaned]))
    }
}

/// Physical table name for the `(source, rel, target)` triple of raw labels.
///
/// ```
/// # use graphstore_kuzu::cypher::relationship_table_name;
/// assert_eq!(relationship_table_name("KNOWS", "Person", "Person"), "KNOWS_Person_Person");
/// assert_ne!(
///     relationship_table_name("R", "X_Y", "Z"),
///     relationship_table_name("R_X", "Y", "Z"),
/// );
/// ```
pub fn relationship_table_name(rel_type: &str, source_type: &str, target_type: &str) -> String {
    relationship_table(
        &table_name(rel_type),
        &table_name(source_type),
        &table_name(target_type),
    )
}

/// Join already-resolved table names into a relationship table name.
///
/// `{rel}_{source}_{target}` splits back into its parts only when none of
/// them contains `_`; otherwise a digest of the triple is appended.
pub fn relationship_table(rel_table: &str, source_table: &str, target_table: &str) -> String {
    let joined = format!("{}_{}_{}", rel_table, source_table, target_table);
    if [rel_table, source_table, target_table]
        .iter()
        .any(|part| part.contains('_'))
    {
        format!(
            "{}_{}",
            joined,
            digest(&[rel_table, source_table, target_table])
        )
    } else {
        joined
    }
}

/// Recover the relationship part of a catalog table connecting `source_table`
/// to `target_table`, or `None` when the name was not built by
/// [`relationship_table`].
///
/// ```
/// # use graphstore_kuzu::cypher::{relationship_label, relationship_table};
/// let table = relationship_table("WORKS_AT", "Person", "Company");
/// assert_eq!(relationship_label(&table, "Person", "Company").as_deref(), Some("WORKS_AT"));
/// assert_eq!(relationship_label("custom", "Person", "Company"), None);
/// ```
pub fn relationship_label(table: &str, source_table: &str, target_table: &str) -> Option<String> {
    let suffix = format!("_{}_{}", source_table, target_table);
    [Some(table), strip_digest(table)]
        .into_iter()
        .flatten()
        .filter_map(|base| base.strip_suffix(suffix.as_str()))
        .find(|rel| !rel.is_empty() && relationship_table(rel, source_table, target_table) == table)
        .map(str::to_string)
}

/// Escape an identifier, quoting it with backticks if needed.
///
/// ```
/// # use graphstore_kuzu::cypher::escape_identifier;
/// assert_eq!(escape_identifier("name"), "name");
/// assert_eq!(escape_identifier("123name"), "`123name`");
/// assert_eq!(escape_identifier("MATCH"), "`MATCH`");
/// ```
pub fn escape_identifier(s: &str) -> String {
    let sanitized: String = normalize_unicode(s)
        .chars()
        .filter(|c| !is_dangerous_unicode(*c))
        .collect();

    if is_valid_identifier(&sanitized) && !is_cypher_keyword(&sanitized) {
        sanitized
    } else {
        format!("`{}`", sanitized.replace('`', "``"))
    }
}

/// Check if a string is a reserved word in Kuzu's Cypher dialect.
fn is_cypher_keyword(s: &str) -> bool {
    matches!(
        s.to_uppercase().as_str(),
        "ALL"
            | "AND"
            | "ANY"
            | "AS"
            | "ASC"
            | "ASCENDING"
            | "BEGIN"
            | "BY"
            | "CALL"
            | "CASE"
            | "COMMIT"
            | "CONTAINS"
            | "COPY"
            | "COUNT"
            | "CREATE"
            | "DELETE"
            | "DESC"
            | "DESCENDING"
            | "DETACH"
            | "DISTINCT"
            | "DROP"
            | "ELSE"
            | "END"
            | "ENDS"
            | "EXISTS"
            | "FALSE"
            | "FROM"
            | "GROUP"
            | "IN"
            | "IS"
            | "KEY"
            | "LIMIT"
            | "MACRO"
            | "MATCH"
            | "MERGE"
            | "NODE"
            | "NOT"
            | "NULL"
            | "ON"
            | "OPTIONAL"
            | "OR"
            | "ORDER"
            | "PRIMARY"
            | "REL"
            | "RETURN"
            | "ROLLBACK"
            | "SET"
            | "SKIP"
            | "STARTS"
            | "TABLE"
            | "THEN"
            | "TO"
            | "TRANSACTION"
            | "TRUE"
            | "UNION"
            | "UNWIND"
            | "WHEN"
            | "WHERE"
            | "WITH"
            | "XOR"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string_basic() {
        assert_eq!(escape_string("hello").as_ref(), "hello");
        assert!(matches!(escape_string("hello world"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_string_quotes() {
        assert_eq!(escape_string("it's").as_ref(), "it\\'s");
        assert_eq!(escape_string(r#"say "hi""#).as_ref(), r#"say \"hi\""#);
        assert!(matches!(escape_string("it's"), Cow::Owned(_)));
    }

    #[test]
    fn test_escape_string_control() {
        assert_eq!(escape_string("a\nb\tc").as_ref(), "a\\nb\\tc");
        assert_eq!(escape_string("nul\x00").as_ref(), "nul\\u0000");
        assert_eq!(escape_string("back\\slash").as_ref(), "back\\\\slash");
    }

    #[test]
    fn test_quote_string() {
        assert_eq!(quote_string("x"), "'x'");
        assert_eq!(quote_string("o'clock"), "'o\\'clock'");
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("Person"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("KNOWS_Person_Person"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("has space"));
    }

    #[test]
    fn test_table_name_sanitizes() {
        assert_eq!(table_name("Person"), "Person");
        assert_eq!(table_name("WORKS_AT"), "WORKS_AT");
        assert!(table_name("works at").starts_with("works_at_"));
        assert!(table_name("co-author").starts_with("co_author_"));
        assert!(table_name("9lives").starts_with("_9lives_"));
        assert!(table_name("#tag").starts_with("_tag_"));
        assert!(table_name("").starts_with("__"));
        assert_eq!(table_name("works at").len(), "works_at".len() + 1 + DIGEST_LEN);
    }

    #[test]
    fn test_table_name_keeps_labels_apart() {
        let labels = ["works at", "works-at", "works_at", "works.at", "_9lives", "9lives"];
        let names: std::collections::BTreeSet<_> = labels.iter().map(|l| table_name(l)).collect();
        assert_eq!(names.len(), labels.len());
    }

    #[test]
    fn test_table_name_reserved_and_digest_shaped_labels() {
        assert_ne!(table_name("Chunk"), CHUNK_TABLE);
        assert_ne!(table_name("chunk"), CHUNK_TABLE);
        assert!(table_name("Chunk").starts_with("Chunk_"));

        let digested = table_name("works at");
        assert_ne!(table_name(&digested), digested);
    }

    #[test]
    fn test_table_name_strips_invisible_characters() {
        assert_eq!(table_name("Per\u{200B}son"), "Person");
        assert_eq!(table_name("Person\u{202E}"), "Person");
        assert_eq!(table_name("Per\nson"), "Person");
    }

    #[test]
    fn test_table_name_unicode_normalization() {
        let composed = "Caf\u{00E9}";
        let decomposed = "Cafe\u{0301}";
        assert_eq!(table_name(composed), table_name(decomposed));
    }

    #[test]
    fn test_table_name_is_always_valid() {
        for label in ["Person", "a b", "1", "émigré", "x-y-z", "\u{FEFF}"] {
            assert!(is_valid_identifier(&table_name(label)), "{}", label);
        }
    }

    #[test]
    fn test_relationship_table_name() {
        assert_eq!(relationship_table_name("KNOWS", "Person", "Person"), "KNOWS_Person_Person");
        let table = relationship_table_name("works at", "Person", "Org Unit");
        assert!(table.starts_with(&format!(
            "{}_Person_{}_",
            table_name("works at"),
            table_name("Org Unit")
        )));
        assert!(is_valid_identifier(&table));
    }

    #[test]
    fn test_relationship_table_name_is_unambiguous() {
        assert_ne!(
            relationship_table_name("R", "X_Y", "Z"),
            relationship_table_name("R_X", "Y", "Z")
        );
        assert_ne!(
            relationship_table_name("A", "B", "C_D"),
            relationship_table_name("A_B", "C", "D")
        );
    }

    #[test]
    fn test_relationship_label_recovers_parts() {
        for (rel, source, target) in [
            ("KNOWS", "Person", "Person"),
            ("WORKS_AT", "Person", "Company"),
            ("R_X", "Y", "Z"),
            ("R", "X_Y", "Z"),
        ] {
            let table = relationship_table(rel, source, target);
            assert_eq!(relationship_label(&table, source, target).as_deref(), Some(rel));
        }
        assert_eq!(relationship_label("R_X_Y_Z", "X_Y", "Z"), None);
        assert_eq!(relationship_label("Person", "Person", "Person"), None);
    }

    #[test]
    fn test_escape_identifier_keywords() {
        assert_eq!(escape_identifier("Person"), "Person");
        assert_eq!(escape_identifier("match"), "`match`");
        assert_eq!(escape_identifier("Table"), "`Table`");
        assert_eq!(escape_identifier("Rel"), "`Rel`");
    }

    #[test]
    fn test_escape_identifier_backticks() {
        assert_eq!(escape_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_normalize_unicode_composed_vs_decomposed() {
        assert_eq!(
            normalize_unicode("caf\u{00E9}"),
            normalize_unicode("cafe\u{0301}")
        );
        assert_eq!(normalize_unicode(""), "");
    }
}
