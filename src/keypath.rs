//! Keypath normalisation and classification.
//!
//! Templates may write `list[0].name`, `this.name` or `~/config.title`.
//! Everything is collapsed to a dotted canonical form before resolution.

/// Prefix anchoring a reference at the absolute root.
pub const ROOT_PREFIX: &str = "~/";

/// Prefix stepping one context up.
pub const ANCESTOR_PREFIX: &str = "../";

/// How a normalised reference should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind<'a> {
    /// `~/a.b` - joined from the absolute root. Holds the path after the prefix.
    Root(&'a str),
    /// `.`, `./a`, `.a`, `../a` - relative to the innermost context.
    Relative,
    /// Bare name, searched through the context stack.
    Ambiguous,
}

/// Canonicalise a raw template reference.
///
/// - surrounding whitespace is trimmed
/// - index syntax `a[0]` becomes `a.0` (whitespace inside brackets ignored)
/// - `this` becomes `.` and `this.x` becomes `./x`
pub fn normalise(raw: &str) -> String {
    let raw = raw.trim();

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '[' {
            out.push(c);
            continue;
        }

        let mut index = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == ']' {
                closed = true;
                break;
            }
            index.push(inner);
        }
        let index = index.trim();

        if closed && !index.is_empty() && index.chars().all(|d| d.is_ascii_digit()) {
            if !out.is_empty() && !out.ends_with('.') && !out.ends_with('/') {
                out.push('.');
            }
            out.push_str(index);
        } else {
            // Not an index expression; keep it verbatim
            out.push('[');
            out.push_str(index);
            if closed {
                out.push(']');
            }
        }
    }

    if out == "this" {
        return ".".to_string();
    }
    if let Some(rest) = out.strip_prefix("this.") {
        return format!("./{rest}");
    }

    out
}

/// Classify a normalised reference.
pub fn classify(reference: &str) -> RefKind<'_> {
    if let Some(rest) = reference.strip_prefix(ROOT_PREFIX) {
        RefKind::Root(rest)
    } else if reference.starts_with('.') {
        RefKind::Relative
    } else {
        RefKind::Ambiguous
    }
}

/// Iterate the non-empty segments of a dotted keypath.
pub fn segments(keypath: &str) -> impl Iterator<Item = &str> {
    keypath.split('.').filter(|s| !s.is_empty())
}

/// The leading segment of a keypath (`"a"` for `"a.b.c"`).
pub fn first_key(keypath: &str) -> &str {
    segments(keypath).next().unwrap_or("")
}

/// Everything after the leading segment (`"b.c"` for `"a.b.c"`).
pub fn tail(keypath: &str) -> &str {
    let keypath = keypath.trim_start_matches('.');
    match keypath.find('.') {
        Some(pos) => &keypath[pos + 1..],
        None => "",
    }
}

/// Join two keypaths, skipping empty sides.
pub fn join(base: &str, path: &str) -> String {
    match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}.{path}"),
    }
}
