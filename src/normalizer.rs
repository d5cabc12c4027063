//! # Query normalization
//!
//! Canonicalizes a raw query string before it ever reaches the embedding
//! model, so that two phrasings of the same question embed to comparable
//! vectors. The function is deterministic, pure, and total — there is no
//! failure mode, and the same input always produces the same output, which
//! is what guarantees that a lookup and a later store of the same query hit
//! the same point in vector space.
//!
//! Steps, in order:
//! 1. Trim and lowercase.
//! 2. Apply the synonym table below by literal substring replacement, in
//!    declaration order.
//! 3. Collapse internal whitespace runs to single spaces.
//!
//! Substitution order is significant: one replacement can create text that a
//! later rule then matches. The `bookshops`/`bookstores` pair is deliberately
//! bidirectional, so after a full pass *both* spellings end up as
//! `bookshops` (rule 3 rewrites shops→stores, rule 4 rewrites every
//! stores→shops). This is an accepted, documented property of the table,
//! pinned by tests below — not a bug to silently fix.

/// Fixed synonym table, applied in declaration order.
const SYNONYMS: &[(&str, &str)] = &[
    ("iconic", "famous"),
    ("best", "top"),
    ("bookshops", "bookstores"),
    ("bookstores", "bookshops"),
];

/// Canonicalize a query for embedding.
///
/// # Examples
/// ```
/// use memoseek::normalizer::normalize;
///
/// assert_eq!(normalize("  Best   Bookstores Paris "), "top bookshops paris");
/// ```
pub fn normalize(text: &str) -> String {
    let mut query = text.trim().to_lowercase();
    for (word, replacement) in SYNONYMS {
        query = query.replace(word, replacement);
    }
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}
