//! Hierarchical filesystem adapter
//!
//! Directories are real. The adapter maps each capability onto stat, readdir,
//! mkdir, rmdir and unlink of an [`FsClient`]:
//!
//! | capability | native operation |
//! |---|---|
//! | directory exists | stat reports a directory |
//! | file exists | lstat reports anything but a directory |
//! | mkdir | mkdir, the parent must exist |
//! | delete | rmdir after checking readdir is empty |
//!
//! Only regular files are listed as files. Symlinks, sockets and devices are
//! skipped by listings and copies but still removed by a recursive delete.

mod local;
mod sftp;

pub use local::LocalClient;
pub use sftp::{SftpClient, SftpOptions};

use crate::error::{BridgeError, Result};
use crate::path::RemotePath;
use crate::storage::session::{Session, SessionRef};
use crate::storage::{
    Closeable, Directory, Endpoint, EndpointId, File, SessionState, DEFAULT_BUFFER_SIZE,
};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, BufWriter, Read, Write};
use std::sync::Arc;

/// Endpoint backed by an SFTP server
pub type SftpStore = FileSystem<SftpClient>;

/// Endpoint rooted at a local directory
pub type LocalStore = FileSystem<LocalClient>;

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Anything else (symlink, socket, device)
    Other,
}

/// Entry returned by [`FsClient::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name, without its parent path
    pub name: String,
    /// Entry kind
    pub kind: EntryKind,
}

/// Low-level client of a hierarchical filesystem.
///
/// Paths are absolute, `/`-separated and already normalized.
pub trait FsClient: Sized {
    /// Connection options
    type Options: Clone + fmt::Debug;
    /// Native input stream
    type Reader: Read;
    /// Native output stream
    type Writer: Write;

    /// Create a connected, authenticated client
    fn connect(options: &Self::Options) -> Result<Self>;

    /// Human-readable target (user@host:port, root directory)
    fn target(options: &Self::Options) -> String;

    /// Kind of the entry at `path`, `None` if absent
    fn stat(&self, path: &str) -> Result<Option<EntryKind>>;

    /// Kind of the entry at `path` without following a final symlink
    fn lstat(&self, path: &str) -> Result<Option<EntryKind>>;

    /// Entries of a directory, excluding `.` and `..`
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Create a single directory
    fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove an empty directory
    fn rmdir(&self, path: &str) -> Result<()>;

    /// Remove a file
    fn unlink(&self, path: &str) -> Result<()>;

    /// Open a file for reading
    fn open_read(&self, path: &str) -> Result<Self::Reader>;

    /// Create or truncate a file for writing
    fn open_write(&self, path: &str) -> Result<Self::Writer>;
}

/// Filesystem endpoint
pub struct FileSystem<C: FsClient> {
    options: C::Options,
    session: Arc<Session<C>>,
}

impl<C: FsClient> FileSystem<C> {
    /// Create a disconnected endpoint
    pub fn new(options: C::Options) -> Self {
        let session = Session::new(C::target(&options));
        Self { options, session }
    }

    /// Create and connect an endpoint
    pub fn open(options: C::Options) -> Result<Self> {
        let mut fs = Self::new(options);
        fs.connect()?;
        Ok(fs)
    }

    /// Connection options
    pub fn options(&self) -> &C::Options {
        &self.options
    }
}

impl<C: FsClient> Endpoint for FileSystem<C> {
    type Directory = FsDirectory<C>;
    type File = FsFile<C>;

    fn id(&self) -> EndpointId {
        self.session.id()
    }

    fn target(&self) -> &str {
        self.session.target()
    }

    fn state(&self) -> SessionState {
        self.session.state()
    }

    fn connect(&mut self) -> Result<()> {
        tracing::debug!("Connecting to {}", self.session.target());
        let options = &self.options;
        self.session.open(|| C::connect(options))
    }

    fn close(&mut self) {
        self.session.close();
    }

    fn directory(&self, path: &str) -> FsDirectory<C> {
        FsDirectory {
            session: self.session.downgrade(),
            path: RemotePath::parse(path),
        }
    }

    fn file(&self, parent: &FsDirectory<C>, name: &str) -> Result<FsFile<C>> {
        if parent.endpoint_id() != self.id() {
            return Err(BridgeError::invalid_parent(
                parent,
                format!("not a directory of endpoint {}", self.id()),
            ));
        }
        parent.file(name)
    }
}

impl<C: FsClient> fmt::Debug for FileSystem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("id", &self.session.id())
            .field("target", &self.session.target())
            .field("state", &self.session.state())
            .finish()
    }
}

/// Directory on a filesystem endpoint
pub struct FsDirectory<C: FsClient> {
    session: SessionRef<C>,
    path: RemotePath,
}

impl<C: FsClient> FsDirectory<C> {
    fn entries(&self) -> Result<Vec<DirEntry>> {
        let path = self.full_path();
        let entries = self.session.with_client(|client| client.read_dir(&path))?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.name != "." && entry.name != "..")
            .collect())
    }
}

impl<C: FsClient> Directory for FsDirectory<C> {
    type File = FsFile<C>;

    fn endpoint_id(&self) -> EndpointId {
        self.session.id()
    }

    fn path(&self) -> &RemotePath {
        &self.path
    }

    fn file(&self, name: &str) -> Result<FsFile<C>> {
        Ok(FsFile {
            session: self.session.clone(),
            path: self.path.join(name)?,
        })
    }

    fn sub_directory(&self, name: &str) -> Result<Self> {
        Ok(Self {
            session: self.session.clone(),
            path: self.path.join(name)?,
        })
    }

    fn exists(&self) -> Result<bool> {
        tracing::debug!("Checking {} for existence", self);
        let path = self.full_path();
        let kind = self.session.with_client(|client| client.stat(&path))?;
        Ok(kind == Some(EntryKind::Directory))
    }

    fn list_files(&self) -> Result<Vec<FsFile<C>>> {
        tracing::debug!("Listing files in {}", self);
        self.entries()?
            .iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .map(|entry| self.file(&entry.name))
            .collect()
    }

    fn list_special_files(&self) -> Result<Vec<FsFile<C>>> {
        self.entries()?
            .iter()
            .filter(|entry| entry.kind == EntryKind::Other)
            .map(|entry| self.file(&entry.name))
            .collect()
    }

    fn list_sub_directories(&self) -> Result<Vec<Self>> {
        tracing::debug!("Listing sub-directories in {}", self);
        self.entries()?
            .iter()
            .filter(|entry| entry.kind == EntryKind::Directory)
            .map(|entry| self.sub_directory(&entry.name))
            .collect()
    }

    fn mkdir(&self) -> Result<()> {
        if self.path.is_root() {
            return Ok(());
        }

        tracing::debug!("Creating directory {}", self);
        let path = self.full_path();
        self.session.with_client(|client| client.mkdir(&path))
    }

    fn delete(&self) -> Result<()> {
        if !self.exists()? {
            tracing::debug!("Directory {} does not exist, nothing to delete", self);
            return Ok(());
        }

        if !self.entries()?.is_empty() {
            return Err(BridgeError::NotEmpty(self.full_path()));
        }

        tracing::debug!("Removing directory {}", self);
        let path = self.full_path();
        self.session.with_client(|client| client.rmdir(&path))
    }
}

impl<C: FsClient> Clone for FsDirectory<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            path: self.path.clone(),
        }
    }
}

impl<C: FsClient> PartialEq for FsDirectory<C> {
    fn eq(&self, other: &Self) -> bool {
        self.session.id() == other.session.id() && self.path == other.path
    }
}

impl<C: FsClient> Eq for FsDirectory<C> {}

impl<C: FsClient> Hash for FsDirectory<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.id().hash(state);
        self.path.hash(state);
    }
}

impl<C: FsClient> fmt::Display for FsDirectory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl<C: FsClient> fmt::Debug for FsDirectory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsDirectory")
            .field("endpoint", &self.session.id())
            .field("path", &self.path.to_string())
            .finish()
    }
}

/// File on a filesystem endpoint
pub struct FsFile<C: FsClient> {
    session: SessionRef<C>,
    path: RemotePath,
}

impl<C: FsClient> FsFile<C> {
    /// Directory containing this file
    pub fn parent(&self) -> FsDirectory<C> {
        FsDirectory {
            session: self.session.clone(),
            path: self.path.parent().unwrap_or_default(),
        }
    }
}

impl<C: FsClient> File for FsFile<C> {
    type Reader = FsReader<C>;
    type Writer = FsWriter<C>;

    fn endpoint_id(&self) -> EndpointId {
        self.session.id()
    }

    fn path(&self) -> &RemotePath {
        &self.path
    }

    fn exists(&self) -> Result<bool> {
        tracing::debug!("Checking {} for existence", self);
        let path = self.full_path();
        let kind = self.session.with_client(|client| client.lstat(&path))?;
        Ok(matches!(kind, Some(kind) if kind != EntryKind::Directory))
    }

    fn open_read(&self) -> Result<FsReader<C>> {
        tracing::debug!("Opening input stream for {}", self);
        let path = self.full_path();
        let inner = self.session.with_client(|client| client.open_read(&path))?;
        Ok(FsReader { inner, path })
    }

    fn open_write(&self) -> Result<FsWriter<C>> {
        tracing::debug!("Opening output stream for {}", self);
        let path = self.full_path();
        let inner = self.session.with_client(|client| client.open_write(&path))?;
        Ok(FsWriter {
            inner: BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, inner),
            path,
        })
    }

    fn delete(&self) -> Result<()> {
        if !self.exists()? {
            return Ok(());
        }

        tracing::debug!("Removing file {}", self);
        let path = self.full_path();
        self.session.with_client(|client| client.unlink(&path))
    }
}

impl<C: FsClient> Clone for FsFile<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            path: self.path.clone(),
        }
    }
}

impl<C: FsClient> PartialEq for FsFile<C> {
    fn eq(&self, other: &Self) -> bool {
        self.session.id() == other.session.id() && self.path == other.path
    }
}

impl<C: FsClient> Eq for FsFile<C> {}

impl<C: FsClient> Hash for FsFile<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.id().hash(state);
        self.path.hash(state);
    }
}

impl<C: FsClient> fmt::Display for FsFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl<C: FsClient> fmt::Debug for FsFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsFile")
            .field("endpoint", &self.session.id())
            .field("path", &self.path.to_string())
            .finish()
    }
}

/// Input stream of a filesystem file
pub struct FsReader<C: FsClient> {
    inner: C::Reader,
    path: String,
}

impl<C: FsClient> Read for FsReader<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<C: FsClient> Closeable for FsReader<C> {
    fn close(self) -> Result<()> {
        tracing::debug!("Closing input stream for {}", self.path);
        Ok(())
    }
}

/// Buffered output stream of a filesystem file
pub struct FsWriter<C: FsClient> {
    inner: BufWriter<C::Writer>,
    path: String,
}

impl<C: FsClient> Write for FsWriter<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<C: FsClient> Closeable for FsWriter<C> {
    fn close(self) -> Result<()> {
        tracing::debug!("Closing output stream for {}", self.path);
        let path = self.path;
        let mut inner = self
            .inner
            .into_inner()
            .map_err(|e| BridgeError::io(format!("Cannot flush {}", path), e.into_error()))?;
        inner
            .flush()
            .map_err(|e| BridgeError::io(format!("Cannot flush {}", path), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn local() -> (TempDir, LocalStore) {
        let root = TempDir::new().unwrap();
        let store = LocalStore::open(root.path().to_path_buf()).unwrap();
        (root, store)
    }

    #[test]
    fn test_mkdir_requires_parent() {
        let (root, store) = local();
        let nested = store.directory("/a/b");

        assert!(nested.mkdir().is_err());
        store.directory("/a").mkdir().unwrap();
        nested.mkdir().unwrap();

        assert!(nested.exists().unwrap());
        assert!(root.path().join("a/b").is_dir());
    }

    #[test]
    fn test_write_read_and_list() {
        let (_root, store) = local();
        let dir = store.directory("/data");
        dir.mkdir().unwrap();
        dir.sub_directory("nested").unwrap().mkdir().unwrap();

        let file = store.file(&dir, "notes.txt").unwrap();
        assert!(!file.exists().unwrap());
        let mut writer = file.open_write().unwrap();
        writer.write_all(b"first line\n").unwrap();
        writer.close().unwrap();
        assert!(file.exists().unwrap());

        let mut content = String::new();
        let mut reader = file.open_read().unwrap();
        reader.read_to_string(&mut content).unwrap();
        reader.close().unwrap();
        assert_eq!(content, "first line\n");

        let files = dir.list_files().unwrap();
        assert_eq!(files, vec![file.clone()]);
        let dirs = dir.list_sub_directories().unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].full_path(), "/data/nested");
        assert_eq!(file.parent(), dir);
    }

    #[test]
    fn test_open_write_truncates() {
        let (root, store) = local();
        std::fs::write(root.path().join("f.txt"), b"a much longer old content").unwrap();
        let file = store.directory("/").file("f.txt").unwrap();

        let mut writer = file.open_write().unwrap();
        writer.write_all(b"new").unwrap();
        writer.close().unwrap();

        assert_eq!(std::fs::read(root.path().join("f.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let (_root, store) = local();
        let dir = store.directory("/thing");
        dir.mkdir().unwrap();

        let as_file = store.directory("/").file("thing").unwrap();
        assert!(!as_file.exists().unwrap());
        assert!(dir.exists().unwrap());
    }

    #[test]
    fn test_delete_semantics() {
        let (root, store) = local();
        let dir = store.directory("/full");
        dir.mkdir().unwrap();
        std::fs::write(root.path().join("full/x"), b"x").unwrap();

        assert!(matches!(dir.delete(), Err(BridgeError::NotEmpty(_))));

        let file = dir.file("x").unwrap();
        file.delete().unwrap();
        file.delete().unwrap();
        dir.delete().unwrap();
        assert!(!dir.exists().unwrap());
        dir.delete().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_listed_as_files() {
        let (root, store) = local();
        std::fs::create_dir_all(root.path().join("src/real")).unwrap();
        std::fs::write(root.path().join("src/a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(root.path().join("src/real"), root.path().join("src/link"))
            .unwrap();

        let dir = store.directory("/src");
        let files: Vec<_> = dir.list_files().unwrap().iter().map(|f| f.full_path()).collect();
        assert_eq!(files, vec!["/src/a.txt"]);
        let dirs: Vec<_> = dir
            .list_sub_directories()
            .unwrap()
            .iter()
            .map(|d| d.full_path())
            .collect();
        assert_eq!(dirs, vec!["/src/real"]);
        assert_eq!(dir.list_special_files().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_exists_and_deletes() {
        let (root, store) = local();
        std::fs::create_dir(root.path().join("d")).unwrap();
        let link = root.path().join("d/dangling");
        std::os::unix::fs::symlink("/nonexistent/target", &link).unwrap();

        let file = store.directory("/d").file("dangling").unwrap();
        assert!(file.exists().unwrap());
        file.delete().unwrap();
        assert!(std::fs::symlink_metadata(&link).is_err());
        assert!(!file.exists().unwrap());
    }

    #[test]
    fn test_invalid_parent_rejected() {
        let (_a, first) = local();
        let (_b, second) = local();

        let err = first.file(&second.directory("/"), "x").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParent { .. }));
    }

    #[test]
    fn test_closed_endpoint() {
        let (_root, mut store) = local();
        let dir = store.directory("/");
        assert!(dir.exists().unwrap());

        store.close();
        assert_eq!(store.state(), SessionState::Closed);
        assert!(matches!(dir.exists(), Err(BridgeError::NotConnected { .. })));
        assert!(matches!(store.connect(), Err(BridgeError::Connection { .. })));
    }
}
