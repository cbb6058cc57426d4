//! Storage abstraction
//!
//! Copy and delete logic only ever talks to the three capability traits
//! defined here:
//!
//! - [`Endpoint`]: a backend session and factory for path references
//! - [`Directory`]: a path-addressable handle to a (possibly absent) directory
//! - [`File`]: a path-addressable handle to a (possibly absent) file
//!
//! Two adapter families implement them. [`object`] maps the contracts onto a
//! flat-namespace object store (S3, or an in-memory bucket), [`filesystem`]
//! onto a hierarchical remote filesystem (SFTP, or a local directory).
//!
//! References never own backend resources. They hold a weak handle to their
//! endpoint's session and fail with [`BridgeError::NotConnected`] once the
//! endpoint is closed or dropped.
//!
//! [`BridgeError::NotConnected`]: crate::error::BridgeError::NotConnected

pub mod filesystem;
pub mod object;
mod session;

pub use filesystem::{FileSystem, FsDirectory, FsFile, LocalStore, SftpStore};
pub use object::{MemoryStore, ObjectDirectory, ObjectFile, ObjectStore};
#[cfg(feature = "native_s3")]
pub use object::S3Store;
pub use session::{open_sessions, EndpointId, SessionState};

use crate::error::Result;
use crate::path::RemotePath;
use std::fmt;
use std::io::{Read, Write};

/// Default size of the relay buffer used for streamed copies: 64 KiB
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// A stream that must be closed explicitly to report final errors.
///
/// Closing consumes the stream, so a stream can only be used once. Dropping
/// a stream without closing it still releases the backend handle.
pub trait Closeable {
    /// Flush and release the stream
    fn close(self) -> Result<()>;
}

/// Backend session and factory for path references
pub trait Endpoint {
    /// Directory reference type of this backend
    type Directory: Directory<File = Self::File>;
    /// File reference type of this backend
    type File: File;

    /// Identity of this endpoint
    fn id(&self) -> EndpointId;

    /// Human-readable backend target (bucket, host, root directory)
    fn target(&self) -> &str;

    /// Current session state
    fn state(&self) -> SessionState;

    /// Open the backend session. No-op when already connected.
    fn connect(&mut self) -> Result<()>;

    /// Release the backend client. Idempotent.
    fn close(&mut self);

    /// Reference a directory; performs no I/O
    fn directory(&self, path: &str) -> Self::Directory;

    /// Reference a file inside `parent`, which must belong to this endpoint
    fn file(&self, parent: &Self::Directory, name: &str) -> Result<Self::File>;
}

/// Handle to a directory on a backend
pub trait Directory: Clone + fmt::Debug + fmt::Display {
    /// File reference type of the same backend
    type File: File;

    /// Identity of the owning endpoint
    fn endpoint_id(&self) -> EndpointId;

    /// Normalized path of this directory
    fn path(&self) -> &RemotePath;

    /// Canonical full path, `/` for the root
    fn full_path(&self) -> String {
        self.path().to_string()
    }

    /// Last path segment, `/` for the root
    fn name(&self) -> &str {
        self.path().name()
    }

    /// Reference a file in this directory; performs no I/O
    fn file(&self, name: &str) -> Result<Self::File>;

    /// Reference a child directory; performs no I/O
    fn sub_directory(&self, name: &str) -> Result<Self>;

    /// Whether the directory exists on the backend
    fn exists(&self) -> Result<bool>;

    /// Immediate file children, in no particular order
    fn list_files(&self) -> Result<Vec<Self::File>>;

    /// Immediate directory children, in no particular order
    fn list_sub_directories(&self) -> Result<Vec<Self>>;

    /// Immediate children that are neither regular files nor directories
    /// (symlinks, devices). Copies skip them; recursive deletes remove them.
    fn list_special_files(&self) -> Result<Vec<Self::File>> {
        Ok(Vec::new())
    }

    /// Create the directory
    fn mkdir(&self) -> Result<()>;

    /// Delete the directory if it is empty
    fn delete(&self) -> Result<()>;

    /// Delete the directory and everything below it, best effort per child.
    ///
    /// See [`crate::delete::delete_recursively`].
    fn delete_recursively(&self) -> Result<()>
    where
        Self: Sized,
    {
        crate::delete::delete_recursively(self)
    }
}

/// Handle to a file on a backend
pub trait File: Clone + fmt::Debug + fmt::Display {
    /// Stream returned by [`File::open_read`]
    type Reader: Read + Closeable;
    /// Stream returned by [`File::open_write`]
    type Writer: Write + Closeable;

    /// Identity of the owning endpoint
    fn endpoint_id(&self) -> EndpointId;

    /// Normalized path of this file, including its name
    fn path(&self) -> &RemotePath;

    /// Canonical full path
    fn full_path(&self) -> String {
        self.path().to_string()
    }

    /// File name
    fn name(&self) -> &str {
        self.path().name()
    }

    /// Whether the file exists on the backend
    fn exists(&self) -> Result<bool>;

    /// Open a single-use input stream
    fn open_read(&self) -> Result<Self::Reader>;

    /// Open a single-use output stream; creates or truncates the file
    fn open_write(&self) -> Result<Self::Writer>;

    /// Delete the file; no-op if it does not exist
    fn delete(&self) -> Result<()>;
}
