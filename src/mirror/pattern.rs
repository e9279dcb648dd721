// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Glob-lite field matching for backends without a native `MATCH`.
//!
//! Only `*` is special: it matches any run of characters, including none.
//! Every other character (`?` and `[` included) matches itself, which is a
//! deliberate subset of Redis `MATCH` syntax.

/// True if `field` matches `pattern`. An empty pattern matches everything.
#[must_use]
pub fn matches(pattern: &str, field: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }

    let mut parts = pattern.split('*');
    // split always yields at least one item
    let head = parts.next().unwrap_or("");
    let Some(mut rest) = field.strip_prefix(head) else {
        return false;
    };

    let middle: Vec<&str> = parts.collect();
    let Some((tail, inner)) = middle.split_last() else {
        // no '*' at all: exact match
        return rest.is_empty();
    };

    for piece in inner {
        if piece.is_empty() {
            continue;
        }
        match rest.find(piece) {
            Some(idx) => rest = &rest[idx + piece.len()..],
            None => return false,
        }
    }

    rest.len() >= tail.len() && rest.ends_with(tail)
}
