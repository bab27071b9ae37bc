//! Helpers for virtual paths.
//!
//! A virtual path is slash-separated and rooted (`/lib/page.js`) regardless of
//! platform. Request paths, store keys, and change notifications all use this form.

use std::path::{Component, Path};

/// Normalize a virtual path: collapse repeated slashes, drop `.` segments, and
/// resolve `..` without ever climbing above the root.
///
/// Backslashes are treated as separators so Windows-style input cannot smuggle
/// a `..` past the check.
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(path.len() + 1);
    for seg in &segments {
        out.push('/');
        out.push_str(seg);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// The final path element.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// The extension of the final path element, including the leading dot.
///
/// Returns an empty string when the final element has no dot.
#[must_use]
pub fn extension(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(idx) => &name[idx..],
        None => "",
    }
}

/// Replace the extension of the final path element.
///
/// Only the trailing extension is substituted, so `/a.js/b.js` becomes
/// `/a.js/b.jsx` and not `/a.jsx/b.jsx`.
#[must_use]
pub fn replace_extension(path: &str, ext: &str) -> String {
    let current = extension(path);
    let stem = &path[..path.len() - current.len()];
    let mut out = String::with_capacity(stem.len() + ext.len());
    out.push_str(stem);
    out.push_str(ext);
    out
}

/// Whether the final element is hidden (starts with `_` or `.`).
#[must_use]
pub fn is_hidden(path: &str) -> bool {
    let name = file_name(path);
    name.starts_with('_') || name.starts_with('.')
}

/// Strip a mount prefix from a request path.
///
/// An empty prefix (or `/`) mounts at the root. The prefix only matches on a
/// segment boundary: `/app` strips `/app/x.js` but not `/apple.js`.
#[must_use]
pub fn strip_mount<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Convert an OS path below `root` into a virtual path.
///
/// Returns `None` when `path` is not inside `root` or contains components that
/// cannot be expressed as UTF-8.
#[must_use]
pub fn to_virtual(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                out.push('/');
                out.push_str(part.to_str()?);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("app.js"), "/app.js");
        assert_eq!(normalize("//lib//./page.js"), "/lib/page.js");
        assert_eq!(normalize("/lib/../app.js"), "/app.js");
    }

    #[test]
    fn test_normalize_cannot_escape_root() {
        assert_eq!(normalize("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(normalize("..\\..\\secret"), "/secret");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("/app.js"), ".js");
        assert_eq!(extension("/lib/hero.jsx"), ".jsx");
        assert_eq!(extension("/archive.tar.gz"), ".gz");
        assert_eq!(extension("/dir.d/Makefile"), "");
        assert_eq!(extension("/"), "");
    }

    #[test]
    fn test_replace_extension() {
        assert_eq!(replace_extension("/html.js", ".jsx"), "/html.jsx");
        assert_eq!(replace_extension("/a.js/b.js", ".jsx"), "/a.js/b.jsx");
        assert_eq!(replace_extension("/README", ".md"), "/README.md");
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden("/lib/_internal.js"));
        assert!(is_hidden("/.env.js"));
        assert!(!is_hidden("/lib/page.js"));
        assert!(!is_hidden("/_lib/page.js"));
    }

    #[test]
    fn test_strip_mount() {
        assert_eq!(strip_mount("/app.js", ""), Some("/app.js"));
        assert_eq!(strip_mount("/app.js", "/"), Some("/app.js"));
        assert_eq!(strip_mount("/ui/app.js", "/ui"), Some("/app.js"));
        assert_eq!(strip_mount("/ui", "/ui/"), Some("/"));
        assert_eq!(strip_mount("/uix/app.js", "/ui"), None);
        assert_eq!(strip_mount("/other.js", "/ui"), None);
    }

    #[test]
    fn test_to_virtual() {
        let root = PathBuf::from("/srv/site");
        assert_eq!(
            to_virtual(&root, &root.join("lib").join("hero.jsx")),
            Some("/lib/hero.jsx".to_string())
        );
        assert_eq!(to_virtual(&root, &root), Some("/".to_string()));
        assert_eq!(to_virtual(&root, Path::new("/srv/other/x.js")), None);
    }
}
