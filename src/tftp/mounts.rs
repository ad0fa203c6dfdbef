use std::path::{Path, PathBuf};

/// Maps requested paths onto local directories.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

#[derive(Debug, Clone)]
struct Mount {
    local: PathBuf,
    remote: PathBuf,
}

impl MountTable {
    /// Build from `[local_dir, remote_prefix]` pairs, tried in order.
    pub fn new(pairs: &[(String, String)]) -> Self {
        let mut table = MountTable::default();
        for (local, remote) in pairs {
            table.push(local, remote);
        }
        table
    }

    pub fn push(&mut self, local: impl Into<PathBuf>, remote: &str) {
        self.mounts.push(Mount {
            local: local.into(),
            remote: PathBuf::from(remote.trim_start_matches('/')),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Resolve a requested path to a regular file inside one of the mounts.
    ///
    /// A mount matches when the request equals its remote prefix or lies
    /// below it. A candidate that resolves outside its local directory is
    /// skipped and the next mount is tried; a candidate that does not exist
    /// ends the lookup.
    pub fn resolve(&self, request: &str) -> Option<PathBuf> {
        tracing::debug!("TFTP requested path {}", request);
        let request = Path::new(request.trim_start_matches('/'));

        for mount in &self.mounts {
            let candidate = if request == mount.remote {
                mount.local.clone()
            } else if let Ok(rest) = request.strip_prefix(&mount.remote) {
                mount.local.join(rest)
            } else {
                continue;
            };
            tracing::debug!("TFTP trying {}", candidate.display());

            let Ok(real) = candidate.canonicalize() else {
                tracing::debug!("TFTP path does not exist: {}", candidate.display());
                return None;
            };
            let Ok(root) = mount.local.canonicalize() else {
                continue;
            };
            if !real.starts_with(&root) {
                tracing::debug!("TFTP path outside of {}: {}", root.display(), real.display());
                continue;
            }
            if !real.is_file() {
                tracing::debug!("TFTP path is not a file: {}", real.display());
                return None;
            }
            return Some(real);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, MountTable) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("images");
        fs::create_dir_all(root.join("rpi")).unwrap();
        fs::write(root.join("rpi/Image"), b"kernel").unwrap();
        fs::write(dir.path().join("secret"), b"nope").unwrap();

        let mut table = MountTable::default();
        table.push(&root, "/boot");
        (dir, table)
    }

    #[test]
    fn test_resolves_under_prefix() {
        let (dir, table) = fixture();
        let resolved = table.resolve("/boot/rpi/Image").unwrap();
        assert_eq!(resolved, dir.path().join("images/rpi/Image").canonicalize().unwrap());
        assert!(table.resolve("boot/rpi/Image").is_some());
    }

    #[test]
    fn test_traversal_denied() {
        let (_dir, table) = fixture();
        // Textually under the prefix, but escapes the mount once resolved.
        assert!(table.resolve("/boot/../../secret").is_none());
        assert!(table.resolve("/boot/rpi/../../secret").is_none());
    }

    #[test]
    fn test_traversal_falls_through_to_next_mount() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/f"), b"x").unwrap();

        let mut table = MountTable::default();
        table.push(dir.path().join("a"), "/");
        table.push(dir.path().join("b"), "/");
        // Escapes `a`, but lands inside `b`.
        assert_eq!(
            table.resolve("/../b/f"),
            Some(dir.path().join("b/f").canonicalize().unwrap())
        );
    }

    #[test]
    fn test_missing_and_unmatched() {
        let (_dir, table) = fixture();
        assert!(table.resolve("/boot/rpi/absent").is_none());
        assert!(table.resolve("/other/rpi/Image").is_none());
        assert!(table.resolve("/bootx/rpi/Image").is_none());
        // A directory is not served.
        assert!(table.resolve("/boot/rpi").is_none());
    }

    #[test]
    fn test_new_from_pairs() {
        let table = MountTable::new(&[("/srv".to_string(), "/".to_string())]);
        assert!(!table.is_empty());
    }
}
