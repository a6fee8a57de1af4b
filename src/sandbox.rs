//! Path resolution confined to the dataset root.
//!
//! Every path that reaches the filesystem on behalf of a request or a manifest
//! row goes through [`DatasetRoot::resolve`]. Both the root and the candidate
//! are canonicalized (symlinks followed, `..` collapsed) before the containment
//! check, so a symlink inside the dataset that points elsewhere is rejected the
//! same way a literal `../../etc/passwd` is.
//!
//! Candidates that don't exist yet (a derivative about to be written, a file
//! the client guessed) are resolved through their deepest existing ancestor.
//! Escape detection therefore never depends on whether the target exists; the
//! caller decides separately whether a missing file is a 404.

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Dataset root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("Dataset root is not a directory: {0}")]
    RootNotDirectory(PathBuf),
    #[error("Path escapes the dataset root: {0}")]
    Forbidden(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A canonicalized dataset root.
///
/// Constructing one is the only fatal check at startup: a root that doesn't
/// exist aborts the process before anything is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRoot {
    path: PathBuf,
}

impl DatasetRoot {
    pub fn open(path: &Path) -> Result<Self, SandboxError> {
        let path = match path.canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SandboxError::RootNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if !path.is_dir() {
            return Err(SandboxError::RootNotDirectory(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve `candidate` against the root and reject anything outside it.
    ///
    /// Relative candidates are joined onto the root; absolute ones are taken
    /// as-is and must still canonicalize inside the root.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let candidate = candidate.as_ref();
        let joined = self.path.join(candidate);
        let resolved = canonicalize_lenient(&joined)?;
        if resolved.starts_with(&self.path) {
            Ok(resolved)
        } else {
            Err(SandboxError::Forbidden(candidate.to_path_buf()))
        }
    }

    /// Root-relative form of an already-resolved path.
    ///
    /// Returns `None` for paths outside the root. The root itself maps to an
    /// empty path.
    pub fn relative<'a>(&self, resolved: &'a Path) -> Option<&'a Path> {
        resolved.strip_prefix(&self.path).ok()
    }
}

/// Canonicalize a path that may not exist.
///
/// Walks up to the deepest existing ancestor, canonicalizes that, then
/// re-applies the remaining components lexically. A `..` in the remainder can
/// only climb through components that didn't exist, so popping them lexically
/// is sound.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    match path.canonicalize() {
        Ok(p) => return Ok(p),
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        Err(_) => {}
    }

    let mut existing = path.to_path_buf();
    let mut remainder: Vec<Component<'_>> = Vec::new();
    let components: Vec<Component<'_>> = path.components().collect();
    let mut split = components.len();
    while split > 0 {
        split -= 1;
        existing.pop();
        remainder.insert(0, components[split]);
        if existing.as_os_str().is_empty() {
            break;
        }
        if let Ok(base) = existing.canonicalize() {
            return Ok(apply_components(base, &remainder));
        }
    }
    // Nothing on the way up exists (not even `/`); normalize lexically.
    Ok(apply_components(PathBuf::new(), &components))
}

fn apply_components(mut base: PathBuf, components: &[Component<'_>]) -> PathBuf {
    for component in components {
        match component {
            Component::ParentDir => {
                base.pop();
            }
            Component::CurDir => {}
            other => base.push(other.as_os_str()),
        }
    }
    base
}

/// Render a relative path with forward slashes, regardless of platform.
pub fn to_posix(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build a URL path under `prefix` for a root-relative path, percent-encoding
/// each segment.
///
/// ```text
/// url_path("files", "sub dir/a#1.png") → "/files/sub%20dir/a%231.png"
/// ```
pub fn url_path(prefix: &str, relative: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return format!("/{prefix}/{relative}");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .push(prefix)
            .extend(relative.split('/').filter(|s| !s.is_empty()));
    }
    url.path().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dataset() -> (TempDir, DatasetRoot) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("data/sub")).unwrap();
        fs::write(tmp.path().join("data/sub/a.png"), b"x").unwrap();
        fs::write(tmp.path().join("secret.txt"), b"s").unwrap();
        let root = DatasetRoot::open(&tmp.path().join("data")).unwrap();
        (tmp, root)
    }

    #[test]
    fn open_missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = DatasetRoot::open(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, SandboxError::RootNotFound(_)));
    }

    #[test]
    fn open_file_as_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f.txt");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            DatasetRoot::open(&file),
            Err(SandboxError::RootNotDirectory(_))
        ));
    }

    #[test]
    fn resolve_accepts_descendant() {
        let (_tmp, root) = dataset();
        let resolved = root.resolve("sub/a.png").unwrap();
        assert_eq!(resolved, root.path().join("sub/a.png"));
        assert_eq!(root.relative(&resolved), Some(Path::new("sub/a.png")));
    }

    #[test]
    fn resolve_accepts_root_itself() {
        let (_tmp, root) = dataset();
        assert_eq!(root.resolve("").unwrap(), root.path());
        assert_eq!(root.resolve("sub/..").unwrap(), root.path());
    }

    #[test]
    fn resolve_rejects_parent_traversal() {
        let (_tmp, root) = dataset();
        assert!(matches!(
            root.resolve("../secret.txt"),
            Err(SandboxError::Forbidden(_))
        ));
        assert!(matches!(
            root.resolve("sub/../../secret.txt"),
            Err(SandboxError::Forbidden(_))
        ));
    }

    #[test]
    fn resolve_rejects_traversal_through_missing_dirs() {
        let (_tmp, root) = dataset();
        // `ghost` doesn't exist; `..` must still be counted.
        assert!(root.resolve("ghost/../../secret.txt").is_err());
        assert!(root.resolve("ghost/../../../../etc/passwd").is_err());
    }

    #[test]
    fn resolve_missing_file_inside_root_is_accepted() {
        let (_tmp, root) = dataset();
        let resolved = root.resolve("sub/missing.png").unwrap();
        assert_eq!(resolved, root.path().join("sub/missing.png"));
        assert!(!resolved.exists());
    }

    #[test]
    fn resolve_absolute_outside_root_is_rejected() {
        let (tmp, root) = dataset();
        let outside = tmp.path().join("secret.txt");
        assert!(root.resolve(&outside).is_err());
    }

    #[test]
    fn resolve_absolute_inside_root_is_accepted() {
        let (_tmp, root) = dataset();
        let inside = root.path().join("sub/a.png");
        assert_eq!(root.resolve(&inside).unwrap(), inside);
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_escape() {
        let (tmp, root) = dataset();
        std::os::unix::fs::symlink(tmp.path().join("secret.txt"), root.path().join("link.png"))
            .unwrap();
        assert!(matches!(
            root.resolve("link.png"),
            Err(SandboxError::Forbidden(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_follows_symlink_inside_root() {
        let (_tmp, root) = dataset();
        std::os::unix::fs::symlink(root.path().join("sub/a.png"), root.path().join("alias.png"))
            .unwrap();
        assert_eq!(
            root.resolve("alias.png").unwrap(),
            root.path().join("sub/a.png")
        );
    }

    #[test]
    fn to_posix_joins_with_slashes() {
        assert_eq!(to_posix(Path::new("a/b/c.png")), "a/b/c.png");
        assert_eq!(to_posix(Path::new("")), "");
    }

    #[test]
    fn url_path_encodes_segments() {
        assert_eq!(url_path("files", "a.png"), "/files/a.png");
        assert_eq!(
            url_path("files", "sub dir/a#1.png"),
            "/files/sub%20dir/a%231.png"
        );
        assert_eq!(url_path("thumbs", "x/y.jpg.thumb.jpg"), "/thumbs/x/y.jpg.thumb.jpg");
    }
}
