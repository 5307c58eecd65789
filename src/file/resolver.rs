//! Sandbox root and path containment.
//!
//! Every path coming from a client is resolved through [`Sandbox::resolve`],
//! which guarantees the result is the root itself or lies below it.
//! Traversal attempts are redirected to the root instead of being rejected.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::Result;

/// One segment of the path from the root to a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    /// Segment name.
    pub name: String,
    /// Path of this segment relative to the root.
    pub path: String,
}

/// The single directory tree exposed by the server.
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Canonical absolute root.
    root: PathBuf,
}

impl Sandbox {
    /// Open the sandbox at `root`, creating the directory if needed.
    ///
    /// The root is canonicalized once so later containment checks compare
    /// against the real location.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let root = fs::canonicalize(&root)?;

        Ok(Self { root })
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an untrusted relative path to a physical path inside the root.
    ///
    /// Never fails: absolute inputs, `..` segments climbing above the root,
    /// and symlinks pointing outside all resolve to the root itself.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let Some(candidate) = self.normalize(relative) else {
            tracing::debug!(path = relative, "Traversal redirected to root");
            return self.root.clone();
        };

        if !self.contains(&candidate) {
            return self.root.clone();
        }

        if !self.real_location_contained(&candidate) {
            tracing::warn!(path = relative, "Symlink escapes root, redirected");
            return self.root.clone();
        }
        candidate
    }

    /// Whether the deepest existing ancestor of `candidate` really lies
    /// inside the root once symlinks are followed.
    ///
    /// Segments that do not exist yet cannot redirect anywhere, so only the
    /// existing prefix is checked. A dangling symlink counts as an escape.
    fn real_location_contained(&self, candidate: &Path) -> bool {
        for ancestor in candidate.ancestors() {
            if fs::symlink_metadata(ancestor).is_err() {
                continue;
            }
            return match fs::canonicalize(ancestor) {
                Ok(real) => self.contains(&real),
                Err(_) => false,
            };
        }
        false
    }

    /// Lexically join `relative` under the root.
    ///
    /// Returns `None` when the input is absolute or climbs above the root.
    fn normalize(&self, relative: &str) -> Option<PathBuf> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(segment) => {
                    resolved.push(segment);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return None;
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => return None,
            }
        }

        Some(resolved)
    }

    /// Whether `path` is the root or below it.
    ///
    /// Compares path components, so `/data/shared2` is not inside `/data/shared`.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Whether `path` is exactly the root.
    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }

    /// Slash-separated path of `path` relative to the root.
    ///
    /// Empty for the root itself and for paths outside it.
    pub fn relative_of(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => String::new(),
        }
    }

    /// Breadcrumb segments from the root down to `dir`.
    pub fn breadcrumbs(&self, dir: &Path) -> Vec<Breadcrumb> {
        let relative = self.relative_of(dir);
        if relative.is_empty() {
            return Vec::new();
        }

        let mut crumbs = Vec::new();
        let mut cumulative = String::new();
        for part in relative.split('/') {
            if !cumulative.is_empty() {
                cumulative.push('/');
            }
            cumulative.push_str(part);
            crumbs.push(Breadcrumb {
                name: part.to_string(),
                path: cumulative.clone(),
            });
        }
        crumbs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_sandbox() -> (TempDir, Sandbox) {
        let temp_dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(temp_dir.path().join("share")).unwrap();
        (temp_dir, sandbox)
    }

    #[test]
    fn test_new_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("a").join("b");

        assert!(!root.exists());
        let sandbox = Sandbox::new(&root).unwrap();

        assert!(root.is_dir());
        assert!(sandbox.root().is_absolute());
    }

    #[test]
    fn test_resolve_empty_is_root() {
        let (_temp_dir, sandbox) = setup_sandbox();
        assert_eq!(sandbox.resolve(""), sandbox.root());
        assert_eq!(sandbox.resolve("."), sandbox.root());
    }

    #[test]
    fn test_resolve_nested() {
        let (_temp_dir, sandbox) = setup_sandbox();
        let resolved = sandbox.resolve("docs/2024/report.pdf");
        assert_eq!(
            resolved,
            sandbox.root().join("docs").join("2024").join("report.pdf")
        );
    }

    #[test]
    fn test_resolve_inner_parent_segments() {
        let (_temp_dir, sandbox) = setup_sandbox();
        assert_eq!(sandbox.resolve("a/../b"), sandbox.root().join("b"));
        assert_eq!(sandbox.resolve("./a/./b/.."), sandbox.root().join("a"));
    }

    #[test]
    fn test_resolve_traversal_never_escapes() {
        let (_temp_dir, sandbox) = setup_sandbox();
        let inputs = [
            "..",
            "../",
            "../../etc/passwd",
            "a/../../x",
            "a/b/../../../share2",
            "./../share",
            "docs/../../..",
            "/etc/passwd",
            "/",
            "..\\..\\windows",
            "a/../../share/secret",
        ];

        for input in inputs {
            let resolved = sandbox.resolve(input);
            assert!(
                resolved.starts_with(sandbox.root()),
                "{input} resolved to {}",
                resolved.display()
            );
        }
    }

    #[test]
    fn test_resolve_escape_redirects_to_root() {
        let (_temp_dir, sandbox) = setup_sandbox();
        assert_eq!(sandbox.resolve("../outside"), sandbox.root());
        assert_eq!(sandbox.resolve("/etc"), sandbox.root());
        assert_eq!(sandbox.resolve("a/../../share/x"), sandbox.root());
    }

    #[test]
    fn test_contains_is_segment_aware() {
        let (temp_dir, sandbox) = setup_sandbox();
        let sibling = fs::canonicalize(temp_dir.path()).unwrap().join("share2");

        assert!(!sandbox.contains(&sibling));
        assert!(!sandbox.contains(&sibling.join("file.txt")));
        assert!(sandbox.contains(sandbox.root()));
        assert!(sandbox.contains(&sandbox.root().join("share2")));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_symlink_escape_redirects() {
        let (temp_dir, sandbox) = setup_sandbox();
        let outside = temp_dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, sandbox.root().join("link")).unwrap();

        assert_eq!(sandbox.resolve("link"), sandbox.root());
        assert_eq!(sandbox.resolve("link/file.txt"), sandbox.root());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_missing_path_under_symlink_redirects() {
        let (temp_dir, sandbox) = setup_sandbox();
        let outside = temp_dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, sandbox.root().join("link")).unwrap();

        assert_eq!(sandbox.resolve("link/new/deeper.txt"), sandbox.root());
        assert_eq!(sandbox.resolve("link/../link/x"), sandbox.root());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_dangling_symlink_redirects() {
        let (temp_dir, sandbox) = setup_sandbox();
        std::os::unix::fs::symlink(
            temp_dir.path().join("not-there"),
            sandbox.root().join("dangling"),
        )
        .unwrap();

        assert_eq!(sandbox.resolve("dangling"), sandbox.root());
        assert_eq!(sandbox.resolve("dangling/file.txt"), sandbox.root());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_symlink_inside_root_allowed() {
        let (_temp_dir, sandbox) = setup_sandbox();
        fs::create_dir(sandbox.root().join("real")).unwrap();
        std::os::unix::fs::symlink(sandbox.root().join("real"), sandbox.root().join("alias"))
            .unwrap();

        assert_eq!(
            sandbox.resolve("alias/new.txt"),
            sandbox.root().join("alias").join("new.txt")
        );
    }

    #[test]
    fn test_resolve_missing_path_stays_lexical() {
        let (_temp_dir, sandbox) = setup_sandbox();
        fs::create_dir(sandbox.root().join("docs")).unwrap();

        assert_eq!(
            sandbox.resolve("docs/not/yet.txt"),
            sandbox.root().join("docs").join("not").join("yet.txt")
        );
    }

    #[test]
    fn test_relative_of() {
        let (_temp_dir, sandbox) = setup_sandbox();
        assert_eq!(sandbox.relative_of(sandbox.root()), "");
        assert_eq!(
            sandbox.relative_of(&sandbox.root().join("a").join("b.txt")),
            "a/b.txt"
        );
        assert_eq!(sandbox.relative_of(Path::new("/somewhere/else")), "");
    }

    #[test]
    fn test_breadcrumbs_root_is_empty() {
        let (_temp_dir, sandbox) = setup_sandbox();
        assert!(sandbox.breadcrumbs(sandbox.root()).is_empty());
    }

    #[test]
    fn test_breadcrumbs_nested() {
        let (_temp_dir, sandbox) = setup_sandbox();
        let dir = sandbox.root().join("music").join("jazz").join("1959");

        let crumbs = sandbox.breadcrumbs(&dir);

        assert_eq!(
            crumbs,
            vec![
                Breadcrumb {
                    name: "music".to_string(),
                    path: "music".to_string()
                },
                Breadcrumb {
                    name: "jazz".to_string(),
                    path: "music/jazz".to_string()
                },
                Breadcrumb {
                    name: "1959".to_string(),
                    path: "music/jazz/1959".to_string()
                },
            ]
        );
    }
}
