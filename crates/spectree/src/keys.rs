//! Stable key derivation for suites, containers, and leaves.
//!
//! Every function here is pure: no filesystem access, no environment lookups.
//! Paths are resolved lexically so the same report always yields the same keys.

use std::path::{Component, Path, PathBuf};

/// Delimiter between key segments.
pub const KEY_DELIMITER: &str = "::";

const CONTAINER_MARKER: &str = "C";
const LEAF_MARKER: &str = "L";

/// Lexically normalize a path, dropping `.` and folding `..` into its parent.
///
/// A `..` that would climb above the root is discarded; leading `..` segments
/// of a relative path are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `path` against `base` when relative, then normalize.
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        normalize_path(candidate)
    } else {
        normalize_path(&base.join(candidate))
    }
}

/// Directory that relative spec locations are resolved against.
///
/// Ginkgo reports the suite as a package directory, but hosts may also hand
/// us the bootstrap file. Only a `.go` path counts as a file; package
/// directories such as `api.v2` keep their dots.
pub fn suite_dir(suite_path: &Path) -> &Path {
    if suite_path.extension().is_some_and(|ext| ext == "go") {
        suite_path.parent().unwrap_or(suite_path)
    } else {
        suite_path
    }
}

/// Resolve a location's file relative to its suite. An empty file means the
/// suite itself.
pub fn resolve_location_file(suite_path: &Path, file: &str) -> PathBuf {
    if file.is_empty() {
        return normalize_path(suite_path);
    }
    resolve(suite_dir(suite_path), file)
}

/// The canonical identity of a suite: its absolute, normalized path.
pub fn suite_key(root: &Path, suite_path: &str) -> String {
    resolve(root, suite_path).to_string_lossy().into_owned()
}

/// Escape a single name so it can never produce the key delimiter.
///
/// `\` becomes `\\` and `:` becomes `\:`; escaped output never contains two
/// adjacent colons, which keeps `join` injective.
pub fn escape_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ':' => out.push_str("\\:"),
            c => out.push(c),
        }
    }
    out
}

fn join_escaped<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .map(escape_segment)
        .collect::<Vec<_>>()
        .join(KEY_DELIMITER)
}

/// Key for the container reached by `container_path` inside a suite.
///
/// # Examples
///
/// ```
/// use spectree::v1::keys;
///
/// let nested = keys::container_key("/pkg", &["a".to_string(), "b".to_string()]);
/// let single = keys::container_key("/pkg", &["a::b".to_string()]);
/// assert_eq!(nested, "/pkg::C::a::b");
/// assert_ne!(nested, single);
/// ```
pub fn container_key(suite_key: &str, container_path: &[String]) -> String {
    format!(
        "{}{KEY_DELIMITER}{CONTAINER_MARKER}{KEY_DELIMITER}{}",
        suite_key,
        join_escaped(container_path.iter().map(String::as_str))
    )
}

/// Structural key for a leaf, used when no location is known.
pub fn fallback_leaf_key(suite_key: &str, container_path: &[String], leaf_text: &str) -> String {
    let segments = container_path
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(leaf_text));
    format!(
        "{}{KEY_DELIMITER}{LEAF_MARKER}{KEY_DELIMITER}{}",
        suite_key,
        join_escaped(segments)
    )
}

/// `file:line` key for an already-resolved location.
pub fn location_key(file: &Path, line: u32) -> String {
    format!("{}:{}", file.to_string_lossy(), line)
}

/// Primary key for a leaf: its source location when known, else its
/// structural fallback.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use spectree::v1::keys;
///
/// let containers = vec!["Widget".to_string()];
/// let located = keys::leaf_key(
///     "/pkg",
///     &containers,
///     "creates correctly",
///     Some((Path::new("/pkg/widget_test.go"), 42)),
/// );
/// assert_eq!(located, "/pkg/widget_test.go:42");
///
/// let unlocated = keys::leaf_key("/pkg", &containers, "creates correctly", None);
/// assert_eq!(unlocated, "/pkg::L::Widget::creates correctly");
/// ```
pub fn leaf_key(
    suite_key: &str,
    container_path: &[String],
    leaf_text: &str,
    location: Option<(&Path, u32)>,
) -> String {
    match location {
        Some((file, line)) => location_key(file, line),
        None => fallback_leaf_key(suite_key, container_path, leaf_text),
    }
}
