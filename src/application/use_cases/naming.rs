// ============================================================
// NAME SANITIZER
// ============================================================
// Turn arbitrary source labels into safe, unique identifiers

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Identifier-length ceiling shared by the SQL engines we target.
const MAX_FIELD_NAME_LEN: usize = 63;

static NON_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());
static REPEATED_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());

/// Rust and SQL keywords plus domain terms (the surrogate key name included)
/// that cannot be used as generated field names.
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Rust keywords
        "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
        "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
        "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true",
        "type", "unsafe", "use", "where", "while",
        // SQL keywords that commonly show up as column labels
        "select", "insert", "update", "delete", "from", "table", "index", "group", "order", "by",
        "limit", "offset", "join", "and", "or", "not", "null", "is", "create", "drop", "alter",
        "primary", "key", "unique", "default", "check", "values", "set", "when", "then", "case",
        "end", "union", "having", "distinct",
        // Domain reserved terms
        "id", "pk", "rowid",
    ]
    .into_iter()
    .collect()
});

/// Convert a raw column label to a valid field name.
///
/// Rules, in order: lowercase; replace runs outside `[a-z0-9_]` with a single
/// underscore; collapse repeated underscores; trim leading/trailing
/// underscores; substitute `column` when empty; prefix `col_` when starting
/// with a digit; prefix `field_` when reserved; truncate to 63 characters.
pub fn sanitize_field_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let replaced = NON_IDENTIFIER.replace_all(&lowered, "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    let mut name = collapsed.trim_matches('_').to_string();

    if name.is_empty() {
        name = "column".to_string();
    }

    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name = format!("col_{}", name);
    }

    if RESERVED_WORDS.contains(name.as_str()) {
        name = format!("field_{}", name);
    }

    if name.len() > MAX_FIELD_NAME_LEN {
        name.truncate(MAX_FIELD_NAME_LEN);
    }

    name
}

/// Resolve duplicate field names within one schema by appending `_1`, `_2`, …
/// in first-seen order. The first occurrence keeps its name.
pub fn resolve_duplicate_fields(field_names: &mut [String]) {
    let mut seen: HashSet<String> = HashSet::new();

    for name in field_names.iter_mut() {
        if seen.insert(name.clone()) {
            continue;
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{}_{}", name, suffix);
            if seen.insert(candidate.clone()) {
                *name = candidate;
                break;
            }
            suffix += 1;
        }
    }
}

/// URL-safe slug for a dataset name: lowercase alphanumeric runs joined by
/// dashes, truncated to 200 characters. Uniqueness is handled by the caller.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;

    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    let mut slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        slug = "dataset".to_string();
    }
    slug.truncate(200);
    slug.trim_end_matches('-').to_string()
}
