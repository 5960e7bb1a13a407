//! Path helpers: traversal-safe filesystem joins and logical `/` paths.

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{ManifestGenError, Result};

/// Symlinks followed by one [`secure_join`] before giving up.
const MAX_SYMLINKS: usize = 40;

/// Join `relative` onto `base`, refusing anything that would land outside it.
///
/// Segments are walked in order. `..` climbs the part already resolved,
/// and a segment that is an existing symlink is replaced by its target,
/// which must itself stay under `base`. Absolute paths, paths that resolve
/// to `base` itself, and symlink loops are errors.
pub fn secure_join(base: &Path, relative: &str) -> Result<PathBuf> {
    let escapes = || {
        ManifestGenError::path(format!(
            "'{relative}' escapes the base directory {}",
            base.display()
        ))
    };

    if Path::new(relative).has_root() {
        return Err(ManifestGenError::path(format!(
            "'{relative}' must be relative to the base directory"
        )));
    }

    // Segments still to walk; the next one is on top.
    let mut pending: Vec<OsString> = Vec::new();
    push_segments(&mut pending, Path::new(relative));

    let mut resolved = base.to_path_buf();
    let mut depth = 0usize;
    let mut links = 0usize;

    while let Some(segment) = pending.pop() {
        if segment == ".." {
            if depth == 0 {
                return Err(escapes());
            }
            resolved.pop();
            depth -= 1;
            continue;
        }

        let candidate = resolved.join(&segment);
        let Some(target) = symlink_target(&candidate) else {
            resolved = candidate;
            depth += 1;
            continue;
        };

        links += 1;
        if links > MAX_SYMLINKS {
            return Err(ManifestGenError::path(format!(
                "too many symlinks while resolving '{relative}'"
            )));
        }

        if target.has_root() {
            let inner = strip_base(base, &target).ok_or_else(escapes)?;
            resolved = base.to_path_buf();
            depth = 0;
            push_segments(&mut pending, &inner);
        } else {
            push_segments(&mut pending, &target);
        }
    }

    if depth == 0 {
        return Err(ManifestGenError::path(format!(
            "'{relative}' does not name a file inside {}",
            base.display()
        )));
    }

    Ok(resolved)
}

/// Push the segments of `path` so that its first segment is popped next.
fn push_segments(pending: &mut Vec<OsString>, path: &Path) {
    let segments: Vec<OsString> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => None,
        })
        .collect();
    pending.extend(segments.into_iter().rev());
}

/// Target of `path` when it is an existing symlink.
fn symlink_target(path: &Path) -> Option<PathBuf> {
    let metadata = fs::symlink_metadata(path).ok()?;
    if metadata.file_type().is_symlink() {
        fs::read_link(path).ok()
    } else {
        None
    }
}

/// `target` relative to `base`, comparing against both the given and the
/// canonical form of `base`.
fn strip_base(base: &Path, target: &Path) -> Option<PathBuf> {
    if let Ok(rest) = target.strip_prefix(base) {
        return Some(rest.to_path_buf());
    }
    let canonical = base.canonicalize().ok()?;
    target.strip_prefix(&canonical).ok().map(Path::to_path_buf)
}

/// Join logical path parts with `/`, skipping empty parts and cleaning
/// `.` and `..` segments. Never touches the filesystem.
pub fn logical_path(parts: &[&str]) -> String {
    let rooted = parts
        .iter()
        .find(|p| !p.is_empty())
        .is_some_and(|p| p.starts_with('/'));

    let mut out: Vec<&str> = Vec::new();
    for segment in parts.iter().flat_map(|p| p.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(last) if *last != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }

    let joined = out.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => String::new(),
        (false, false) => joined,
    }
}
