//! Path comparison for container-relative names.
//!
//! Entry names are compared case-insensitively and separator-insensitively.
//! When a plain comparison says two names differ, they are canonicalized
//! (`.` and `..` resolved, separators collapsed) and compared again.

use std::cmp::Ordering;

/// Forward-slash separator used in entry names.
pub const SEPARATOR: char = '/';

/// Convert backslashes to forward slashes and collapse repeated separators.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_sep = false;
    for ch in path.chars() {
        let ch = if ch == '\\' { SEPARATOR } else { ch };
        if ch == SEPARATOR {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }
        out.push(ch);
    }
    out
}

/// Resolve `.` and `..` segments of a normalized path.
///
/// Leading `..` segments that would escape the root are dropped. A trailing
/// separator is preserved.
pub fn canonicalize(path: &str) -> String {
    let normalized = normalize(path);
    let absolute = normalized.starts_with(SEPARATOR);
    let trailing = normalized.ends_with(SEPARATOR) && normalized.len() > 1;

    let mut parts: Vec<&str> = Vec::new();
    for segment in normalized.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let mut out = String::new();
    if absolute {
        out.push(SEPARATOR);
    }
    out.push_str(&parts.join("/"));
    if trailing && !parts.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

/// Case-insensitive equality of two names.
pub fn paths_equal(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize(a), normalize(b));
    if eq_ignore_case(&na, &nb) {
        return true;
    }
    eq_ignore_case(&canonicalize(&na), &canonicalize(&nb))
}

/// Case-insensitive ordering of two names.
pub fn compare(a: &str, b: &str) -> Ordering {
    let (na, nb) = (normalize(a), normalize(b));
    na.chars()
        .flat_map(char::to_lowercase)
        .cmp(nb.chars().flat_map(char::to_lowercase))
        .then_with(|| na.cmp(&nb))
}

/// Case-insensitive prefix test on normalized names.
///
/// Returns the remainder of `path` after `prefix` when it matches.
pub fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.len() > path.len() || !path.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, tail) = path.split_at(prefix.len());
    eq_ignore_case(head, prefix).then_some(tail)
}

/// Whether a location denotes the root of a container.
pub fn is_root_location(location: &str) -> bool {
    matches!(location, "" | "." | "/" | "\\")
}

/// Whether a location ends with a separator of either style.
pub fn ends_with_separator(location: &str) -> bool {
    location.ends_with(['/', '\\'])
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
