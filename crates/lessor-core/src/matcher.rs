//! Order matcher: resolves free-text order or listing text to an inventory name.
//!
//! Both sides are normalized (punctuation to spaces, whitespace collapsed,
//! lowercased) and a candidate matches when it is a substring of the text.
//! Among matches the longest normalized candidate wins; equal lengths go to
//! the candidate listed first, so callers should pass names in a stable
//! order (the store returns them by lowest row id).

/// Normalize text for matching
pub fn normalize(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Pick the inventory name an order refers to.
///
/// `None` means the text is unrelated to the lease pool and the caller
/// should skip it.
pub fn match_inventory<'a, S: AsRef<str>>(text: &str, candidates: &'a [S]) -> Option<&'a str> {
    let haystack = normalize(text);
    let mut best: Option<(&'a str, usize)> = None;

    for candidate in candidates {
        let needle = normalize(candidate.as_ref());
        if needle.is_empty() || !haystack.contains(&needle) {
            continue;
        }
        let len = needle.chars().count();
        if best.is_none_or(|(_, best_len)| len > best_len) {
            best = Some((candidate.as_ref(), len));
        }
    }

    best.map(|(name, _)| name)
}
