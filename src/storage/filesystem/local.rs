//! Local directory client
//!
//! Serves a local directory as if it were a remote filesystem root. Remote
//! path `/a/b` maps to `<root>/a/b`.

use super::{DirEntry, EntryKind, FsClient};
use crate::error::{BridgeError, Result, ResultExt};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Client rooted at a local directory
#[derive(Debug)]
pub struct LocalClient {
    root: PathBuf,
}

impl LocalClient {
    /// Root directory of this client
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn kind_of(file_type: fs::FileType) -> EntryKind {
    if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

impl FsClient for LocalClient {
    type Options = PathBuf;
    type Reader = fs::File;
    type Writer = fs::File;

    fn connect(root: &PathBuf) -> Result<Self> {
        if !root.is_dir() {
            return Err(BridgeError::connection(
                Self::target(root),
                "root is not an existing directory",
            ));
        }
        Ok(Self { root: root.clone() })
    }

    fn target(root: &PathBuf) -> String {
        format!("file://{}", root.display())
    }

    fn stat(&self, path: &str) -> Result<Option<EntryKind>> {
        match fs::metadata(self.resolve(path)) {
            Ok(meta) => Ok(Some(kind_of(meta.file_type()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::io(format!("Cannot stat {}", path), e)),
        }
    }

    fn lstat(&self, path: &str) -> Result<Option<EntryKind>> {
        match fs::symlink_metadata(self.resolve(path)) {
            Ok(meta) => Ok(Some(kind_of(meta.file_type()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::io(format!("Cannot stat {}", path), e)),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let entries =
            fs::read_dir(self.resolve(path)).io_context(|| format!("Cannot list {}", path))?;

        let mut result = Vec::new();
        for entry in entries {
            let entry = entry.io_context(|| format!("Cannot list {}", path))?;
            let file_type = entry
                .file_type()
                .io_context(|| format!("Cannot stat entry of {}", path))?;
            result.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: kind_of(file_type),
            });
        }
        Ok(result)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        fs::create_dir(self.resolve(path)).io_context(|| format!("Cannot create directory {}", path))
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        fs::remove_dir(self.resolve(path)).io_context(|| format!("Cannot remove directory {}", path))
    }

    fn unlink(&self, path: &str) -> Result<()> {
        fs::remove_file(self.resolve(path)).io_context(|| format!("Cannot remove file {}", path))
    }

    fn open_read(&self, path: &str) -> Result<fs::File> {
        fs::File::open(self.resolve(path)).io_context(|| format!("Cannot open {}", path))
    }

    fn open_write(&self, path: &str) -> Result<fs::File> {
        fs::File::create(self.resolve(path)).io_context(|| format!("Cannot create {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_connect_requires_directory() {
        let missing = PathBuf::from("/definitely/not/here");
        assert!(matches!(
            LocalClient::connect(&missing),
            Err(BridgeError::Connection { .. })
        ));
    }

    #[test]
    fn test_paths_resolve_under_root() {
        let root = TempDir::new().unwrap();
        let client = LocalClient::connect(&root.path().to_path_buf()).unwrap();

        client.mkdir("/sub").unwrap();
        assert_eq!(client.stat("/sub").unwrap(), Some(EntryKind::Directory));
        assert_eq!(client.stat("/missing").unwrap(), None);
        assert!(root.path().join("sub").is_dir());

        std::fs::write(root.path().join("sub/f"), b"x").unwrap();
        assert_eq!(client.stat("/sub/f").unwrap(), Some(EntryKind::File));
        assert_eq!(
            client.read_dir("/sub").unwrap(),
            vec![DirEntry {
                name: "f".to_string(),
                kind: EntryKind::File
            }]
        );
        assert!(client.rmdir("/sub").is_err());
    }
}
