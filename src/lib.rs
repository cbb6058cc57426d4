//! # StoreBridge
//!
//! Copy files and directory trees between storage backends that do not
//! share a data model:
//!
//! - **Object stores** (S3 and S3-compatible services): a flat key space where
//!   "directories" only exist as key prefixes or zero-byte marker objects
//! - **Remote filesystems** (SFTP): a real hierarchy with real directories
//! - **Local directories**, using the same filesystem adapter
//!
//! Every backend is exposed through the same three capability traits
//! ([`Endpoint`], [`Directory`], [`File`]), so the copy, walk and delete
//! logic is written once and works between any pair of backends.
//!
//! ## Example
//!
//! ```no_run
//! use storebridge::prelude::*;
//! use storebridge::storage::filesystem::SftpOptions;
//! use storebridge::storage::object::S3Options;
//! use std::path::PathBuf;
//!
//! let s3 = S3Store::open(S3Options::from_env("my-bucket")).unwrap();
//! let sftp = SftpStore::open(SftpOptions::new("backup.example.com", "deploy")).unwrap();
//!
//! // Mirror a bucket prefix onto the SFTP server
//! let stats = copy_directory(&s3.directory("/exports/2024"), &sftp.directory("/srv/exports"))
//!     .unwrap();
//! println!("Copied {} files ({} bytes)", stats.files_copied, stats.bytes_copied);
//!
//! // Tidy up a local staging area
//! let local = LocalStore::open(PathBuf::from("/var/tmp")).unwrap();
//! local.directory("/staging").delete_recursively().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod copier;
pub mod delete;
pub mod error;
pub mod path;
pub mod progress;
pub mod storage;
pub mod walk;

// Re-export commonly used types
pub use copier::{Copier, CopyStats};
pub use error::{BridgeError, Result};
pub use progress::ProgressReporter;
pub use storage::{Directory, Endpoint, File};
pub use walk::{TreeVisitor, TreeWalker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use storebridge::prelude::*;
    //! ```

    pub use crate::copier::{copy_directory, copy_file, copy_file_to_directory, Copier, CopyStats};
    pub use crate::delete::delete_recursively;
    pub use crate::error::{BridgeError, Result};
    pub use crate::path::RemotePath;
    pub use crate::progress::ProgressReporter;
    pub use crate::storage::{
        Closeable, Directory, Endpoint, File, LocalStore, MemoryStore, SessionState, SftpStore,
    };
    #[cfg(feature = "native_s3")]
    pub use crate::storage::S3Store;
    pub use crate::walk::{TreeListing, TreeVisitor, TreeWalker};
}
