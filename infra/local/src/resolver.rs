//! Pure mapping between placement options, absolute paths and locators.
//!
//! Nothing here touches the filesystem. Relative paths are split on
//! [`SEGMENT_SEPARATOR`] and re-assembled with the host's path joining, so the
//! locator format does not depend on the platform separator.

use crate::error::StorageError;
use crate::locator::{self, FILE_SCHEME, Locator, SCHEME_DELIMITER, SEGMENT_SEPARATOR};
use crate::options::PlacementOptions;
use std::path::{Component, Path, PathBuf};

/// Default substitution used when flattening directories.
pub const DEFAULT_FLATTEN_SEPARATOR: &str = "-";

/// Computes the absolute target path for a write.
///
/// One leading and one trailing separator are stripped from `options.path`, the
/// result is joined with `options.name`, flattened when the effective flag is set
/// and finally joined onto `base`. A missing name leaves a trailing separator on
/// the result, so the failure only shows up when the file is opened.
///
/// # Errors
///
/// Returns [`StorageError::PathTraversalAttempt`] if `..` segments climb above `base`.
pub fn path_for_options(
    base: &Path,
    default_flatten: bool,
    separator: &str,
    options: &PlacementOptions,
) -> Result<PathBuf, StorageError> {
    let placement = options.resolve(default_flatten);

    let dir = placement.path.strip_prefix(SEGMENT_SEPARATOR).unwrap_or(placement.path);
    let dir = dir.strip_suffix(SEGMENT_SEPARATOR).unwrap_or(dir);

    let mut relative = format!("{dir}{SEGMENT_SEPARATOR}{}", placement.name);
    if placement.flatten {
        relative = flattened_path_for_path(&relative, separator);
    }

    let mut target = base.join(normalize_relative(&relative)?);
    if placement.name.is_empty() {
        target.push("");
    }
    Ok(target)
}

/// Replaces every separator in `path` with `separator`.
///
/// A single leading separator is kept as-is, so absolute and relative inputs
/// stay distinguishable: `/a/b` becomes `/a-b`, `a/b` becomes `a-b`.
#[must_use]
pub fn flattened_path_for_path(path: &str, separator: &str) -> String {
    let flatten = |s: &str| s.replace(SEGMENT_SEPARATOR, separator);
    path.strip_prefix(SEGMENT_SEPARATOR)
        .map_or_else(|| flatten(path), |rest| format!("{SEGMENT_SEPARATOR}{}", flatten(rest)))
}

/// Resolves a `file://` locator to an absolute path below `base`.
///
/// Returns `None` for a foreign scheme, empty content after the prefix, content
/// that does not decode to UTF-8, or content that would escape `base`. A leading
/// separator in the content is treated as relative to `base`.
#[must_use]
pub fn file_path_for_url(
    locator: impl AsRef<str>,
    base: &Path,
    flatten: bool,
    separator: &str,
) -> Option<PathBuf> {
    let raw = locator.as_ref();
    let encoded = raw
        .strip_prefix(FILE_SCHEME)
        .and_then(|rest| rest.strip_prefix(SCHEME_DELIMITER))
        .filter(|rest| !rest.is_empty())?;

    let decoded = locator::decode(encoded)?;
    let relative =
        if flatten { flattened_path_for_path(&decoded, separator) } else { decoded.into_owned() };

    let normalized = normalize_relative(&relative).ok()?;
    if normalized.as_os_str().is_empty() {
        return None;
    }
    Some(base.join(normalized))
}

/// Converts an absolute path below `base` into its locator.
///
/// Returns `None` for an empty path, a path shorter than `base`, a path outside
/// `base`, `base` itself, or a path with non-UTF-8 segments.
#[must_use]
pub fn url_for_file_path(path: &Path, base: &Path) -> Option<Locator> {
    if path.as_os_str().is_empty() || path.as_os_str().len() < base.as_os_str().len() {
        return None;
    }

    let relative = path.strip_prefix(base).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(seg) => segments.push(seg.to_str()?),
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if segments.is_empty() {
        return None;
    }
    Some(Locator::from_relative(&segments.join(&*SEGMENT_SEPARATOR.to_string())))
}

/// Collapses `.` / `..` and empty segments lexically.
///
/// Allows `..` as long as it doesn't go above the empty relative base. Leading
/// separators carry no meaning: the result is always relative.
///
/// # Errors
///
/// Returns [`StorageError::PathTraversalAttempt`] if the path climbs above its base.
pub fn normalize_relative(path: &str) -> Result<PathBuf, StorageError> {
    let mut out = PathBuf::new();

    for seg in path.split(SEGMENT_SEPARATOR) {
        match seg {
            "" | "." => {},
            ".." => {
                if !out.pop() {
                    return Err(StorageError::PathTraversalAttempt {
                        message: path.to_owned().into(),
                        context: Some("Path attempted to escape base directory via '..'".into()),
                    });
                }
            },
            seg => out.push(seg),
        }
    }

    Ok(out)
}
