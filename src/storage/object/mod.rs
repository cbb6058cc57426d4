//! Flat-namespace object store adapter
//!
//! Object stores have no native directories. A directory is emulated by a
//! key prefix (`a/b/` for `/a/b`):
//!
//! - existence: any key under the prefix
//! - listing: prefix + `/` delimiter queries, paginated by continuation token
//! - mkdir: a zero-length marker object stored at the prefix itself
//!
//! The mapping is written once against [`ObjectClient`] and shared by the
//! S3 client and the in-memory bucket.

mod memory;
#[cfg(feature = "native_s3")]
mod s3;

pub use memory::{MemoryBody, MemoryBucket, MemoryClient};
#[cfg(feature = "native_s3")]
pub use s3::{S3Body, S3Client, S3Options};

use crate::error::{BridgeError, Result};
use crate::path::{RemotePath, SEPARATOR};
use crate::storage::session::{Session, SessionRef};
use crate::storage::{Closeable, Directory, Endpoint, EndpointId, File, SessionState};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Content type of directory marker objects
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Endpoint backed by an in-memory bucket
pub type MemoryStore = ObjectStore<MemoryClient>;

/// Endpoint backed by Amazon S3 or an S3-compatible service
#[cfg(feature = "native_s3")]
pub type S3Store = ObjectStore<S3Client>;

/// One page of a delimiter listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Full keys directly under the prefix
    pub keys: Vec<String>,
    /// Common prefixes (ending in the delimiter)
    pub common_prefixes: Vec<String>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Part uploaded as part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    /// 1-based part number
    pub number: i32,
    /// Entity tag returned by the store
    pub etag: String,
}

/// Low-level client of a flat-namespace object store
pub trait ObjectClient: Sized {
    /// Connection options
    type Options: Clone + fmt::Debug;
    /// Object body stream
    type Body: Read;

    /// Create a connected, authenticated client
    fn connect(options: &Self::Options) -> Result<Self>;

    /// Human-readable target (bucket name, endpoint)
    fn target(options: &Self::Options) -> String;

    /// Maximum number of entries requested per listing page
    fn page_size(&self) -> usize;

    /// Buffered bytes above which uploads switch to multipart
    fn part_size(&self) -> usize;

    /// List keys below `prefix`, grouping deeper keys by `delimiter`
    fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<char>,
        token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage>;

    /// Whether an object with exactly this key exists
    fn head(&self, key: &str) -> Result<bool>;

    /// Open an object body
    fn get(&self, key: &str) -> Result<Self::Body>;

    /// Store an object in a single request
    fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()>;

    /// Remove an object
    fn delete(&self, key: &str) -> Result<()>;

    /// Start a multipart upload, returning its id
    fn create_multipart(&self, key: &str) -> Result<String>;

    /// Upload one part of a multipart upload
    fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        number: i32,
        data: Vec<u8>,
    ) -> Result<UploadedPart>;

    /// Assemble the uploaded parts into the final object
    fn complete_multipart(&self, key: &str, upload_id: &str, parts: Vec<UploadedPart>)
        -> Result<()>;

    /// Discard a multipart upload
    fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()>;
}

/// Object store endpoint
pub struct ObjectStore<C: ObjectClient> {
    options: C::Options,
    session: Arc<Session<C>>,
}

impl<C: ObjectClient> ObjectStore<C> {
    /// Create a disconnected endpoint
    pub fn new(options: C::Options) -> Self {
        let session = Session::new(C::target(&options));
        Self { options, session }
    }

    /// Create and connect an endpoint
    pub fn open(options: C::Options) -> Result<Self> {
        let mut store = Self::new(options);
        store.connect()?;
        Ok(store)
    }

    /// Connection options
    pub fn options(&self) -> &C::Options {
        &self.options
    }
}

impl<C: ObjectClient> Endpoint for ObjectStore<C> {
    type Directory = ObjectDirectory<C>;
    type File = ObjectFile<C>;

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
        tracing::debug!("Connecting to object store {}", self.session.target());
        let options = &self.options;
        self.session.open(|| C::connect(options))
    }

    fn close(&mut self) {
        self.session.close();
    }

    fn directory(&self, path: &str) -> ObjectDirectory<C> {
        ObjectDirectory {
            session: self.session.downgrade(),
            path: RemotePath::parse(path),
        }
    }

    fn file(&self, parent: &ObjectDirectory<C>, name: &str) -> Result<ObjectFile<C>> {
        if parent.endpoint_id() != self.id() {
            return Err(BridgeError::invalid_parent(
                parent,
                format!("not an object key of endpoint {}", self.id()),
            ));
        }
        parent.file(name)
    }
}

impl<C: ObjectClient> fmt::Debug for ObjectStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("id", &self.session.id())
            .field("target", &self.session.target())
            .field("state", &self.session.state())
            .finish()
    }
}

/// Directory emulated by a key prefix
pub struct ObjectDirectory<C: ObjectClient> {
    session: SessionRef<C>,
    path: RemotePath,
}

impl<C: ObjectClient> ObjectDirectory<C> {
    /// Key prefix of this directory; empty for the root
    pub fn prefix(&self) -> String {
        self.path.key_prefix()
    }

    /// Walk every listing page, returning (file names, directory names)
    fn list_children(&self) -> Result<(Vec<String>, Vec<String>)> {
        let prefix = self.prefix();
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.session.with_client(|client| {
                client.list_page(&prefix, Some(SEPARATOR), token.as_deref(), client.page_size())
            })?;

            for key in &page.keys {
                let name = key.strip_prefix(&prefix).unwrap_or(key);
                // the marker object of the directory itself
                if !name.is_empty() {
                    files.push(name.to_string());
                }
            }

            for common in &page.common_prefixes {
                let name = common
                    .strip_prefix(&prefix)
                    .unwrap_or(common)
                    .trim_end_matches(SEPARATOR);
                if !name.is_empty() {
                    dirs.push(name.to_string());
                }
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok((files, dirs))
    }
}

impl<C: ObjectClient> Directory for ObjectDirectory<C> {
    type File = ObjectFile<C>;

    fn endpoint_id(&self) -> EndpointId {
        self.session.id()
    }

    fn path(&self) -> &RemotePath {
        &self.path
    }

    fn file(&self, name: &str) -> Result<ObjectFile<C>> {
        Ok(ObjectFile {
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
        if self.path.is_root() {
            return Ok(true);
        }

        tracing::debug!("Checking {} for existence", self);
        let prefix = self.prefix();
        let page = self
            .session
            .with_client(|client| client.list_page(&prefix, None, None, 1))?;
        Ok(!page.keys.is_empty() || !page.common_prefixes.is_empty())
    }

    fn list_files(&self) -> Result<Vec<ObjectFile<C>>> {
        tracing::debug!("Listing files in {}", self);
        let (files, _) = self.list_children()?;
        files.iter().map(|name| self.file(name)).collect()
    }

    fn list_sub_directories(&self) -> Result<Vec<Self>> {
        tracing::debug!("Listing sub-directories in {}", self);
        let (_, dirs) = self.list_children()?;
        dirs.iter().map(|name| self.sub_directory(name)).collect()
    }

    fn mkdir(&self) -> Result<()> {
        if self.path.is_root() {
            return Ok(());
        }

        tracing::debug!("Creating directory marker for {}", self);
        let prefix = self.prefix();
        self.session.with_client(|client| {
            client.put(&prefix, Vec::new(), Some(DIRECTORY_CONTENT_TYPE))
        })
    }

    fn delete(&self) -> Result<()> {
        if !self.exists()? {
            tracing::debug!("Directory {} does not exist, nothing to delete", self);
            return Ok(());
        }

        let prefix = self.prefix();
        let page = self.session.with_client(|client| {
            client.list_page(&prefix, Some(SEPARATOR), None, 2)
        })?;
        let has_children = !page.common_prefixes.is_empty()
            || page.keys.iter().any(|key| key.as_str() != prefix);
        if has_children {
            return Err(BridgeError::NotEmpty(self.full_path()));
        }

        if self.path.is_root() {
            return Ok(());
        }

        tracing::debug!("Deleting directory marker {}", self);
        self.session.with_client(|client| client.delete(&prefix))
    }
}

impl<C: ObjectClient> Clone for ObjectDirectory<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            path: self.path.clone(),
        }
    }
}

impl<C: ObjectClient> PartialEq for ObjectDirectory<C> {
    fn eq(&self, other: &Self) -> bool {
        self.session.id() == other.session.id() && self.path == other.path
    }
}

impl<C: ObjectClient> Eq for ObjectDirectory<C> {}

impl<C: ObjectClient> Hash for ObjectDirectory<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.id().hash(state);
        self.path.hash(state);
    }
}

impl<C: ObjectClient> fmt::Display for ObjectDirectory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl<C: ObjectClient> fmt::Debug for ObjectDirectory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDirectory")
            .field("endpoint", &self.session.id())
            .field("path", &self.path.to_string())
            .finish()
    }
}

/// Object addressed by its directory prefix and name
pub struct ObjectFile<C: ObjectClient> {
    session: SessionRef<C>,
    path: RemotePath,
}

impl<C: ObjectClient> ObjectFile<C> {
    /// Object key of this file
    pub fn key(&self) -> String {
        self.path.key()
    }

    /// Directory containing this file
    pub fn parent(&self) -> ObjectDirectory<C> {
        ObjectDirectory {
            session: self.session.clone(),
            path: self.path.parent().unwrap_or_default(),
        }
    }
}

impl<C: ObjectClient> File for ObjectFile<C> {
    type Reader = ObjectReader<C>;
    type Writer = ObjectWriter<C>;

    fn endpoint_id(&self) -> EndpointId {
        self.session.id()
    }

    fn path(&self) -> &RemotePath {
        &self.path
    }

    fn exists(&self) -> Result<bool> {
        tracing::debug!("Checking {} for existence", self);
        let key = self.key();
        self.session.with_client(|client| client.head(&key))
    }

    fn open_read(&self) -> Result<ObjectReader<C>> {
        tracing::debug!("Opening object input stream for {}", self);
        let key = self.key();
        let body = self.session.with_client(|client| client.get(&key))?;
        Ok(ObjectReader {
            body,
            path: self.full_path(),
        })
    }

    fn open_write(&self) -> Result<ObjectWriter<C>> {
        tracing::debug!("Opening object output stream for {}", self);
        let part_size = self.session.with_client(|client| Ok(client.part_size()))?;
        Ok(ObjectWriter {
            session: self.session.clone(),
            key: self.key(),
            path: self.full_path(),
            buffer: Vec::new(),
            part_size: part_size.max(1),
            upload: None,
            finished: false,
        })
    }

    fn delete(&self) -> Result<()> {
        if !self.exists()? {
            return Ok(());
        }

        tracing::debug!("Deleting object {}", self);
        let key = self.key();
        self.session.with_client(|client| client.delete(&key))
    }
}

impl<C: ObjectClient> Clone for ObjectFile<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            path: self.path.clone(),
        }
    }
}

impl<C: ObjectClient> PartialEq for ObjectFile<C> {
    fn eq(&self, other: &Self) -> bool {
        self.session.id() == other.session.id() && self.path == other.path
    }
}

impl<C: ObjectClient> Eq for ObjectFile<C> {}

impl<C: ObjectClient> Hash for ObjectFile<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.id().hash(state);
        self.path.hash(state);
    }
}

impl<C: ObjectClient> fmt::Display for ObjectFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl<C: ObjectClient> fmt::Debug for ObjectFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectFile")
            .field("endpoint", &self.session.id())
            .field("path", &self.path.to_string())
            .finish()
    }
}

/// Input stream over an object body
pub struct ObjectReader<C: ObjectClient> {
    body: C::Body,
    path: String,
}

impl<C: ObjectClient> Read for ObjectReader<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl<C: ObjectClient> Closeable for ObjectReader<C> {
    fn close(self) -> Result<()> {
        tracing::debug!("Closing object input stream for {}", self.path);
        Ok(())
    }
}

struct MultipartUpload {
    id: String,
    parts: Vec<UploadedPart>,
}

/// Output stream that uploads on close.
///
/// Small objects are sent with one PUT. Once more than one part worth of
/// data has been written the stream switches to a multipart upload.
pub struct ObjectWriter<C: ObjectClient> {
    session: SessionRef<C>,
    key: String,
    path: String,
    buffer: Vec<u8>,
    part_size: usize,
    upload: Option<MultipartUpload>,
    finished: bool,
}

impl<C: ObjectClient> ObjectWriter<C> {
    fn upload_buffered_part(&mut self) -> Result<()> {
        let data = std::mem::take(&mut self.buffer);
        let key = &self.key;

        if self.upload.is_none() {
            let id = self
                .session
                .with_client(|client| client.create_multipart(key))?;
            tracing::debug!("Started multipart upload {} for {}", id, self.path);
            self.upload = Some(MultipartUpload {
                id,
                parts: Vec::new(),
            });
        }

        if let Some(upload) = self.upload.as_mut() {
            let number = upload.parts.len() as i32 + 1;
            let part = self
                .session
                .with_client(|client| client.upload_part(key, &upload.id, number, data))?;
            upload.parts.push(part);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;

        if self.upload.is_none() {
            let data = std::mem::take(&mut self.buffer);
            let key = &self.key;
            return self
                .session
                .with_client(|client| client.put(key, data, None));
        }

        if !self.buffer.is_empty() {
            self.upload_buffered_part()?;
        }

        if let Some(upload) = self.upload.take() {
            let key = &self.key;
            let id = upload.id;
            let parts = upload.parts;
            tracing::debug!("Completing multipart upload {} with {} parts", id, parts.len());
            self.session
                .with_client(|client| client.complete_multipart(key, &id, parts))
                .map_err(|e| {
                    self.abort(&id);
                    e
                })?;
        }
        Ok(())
    }

    fn abort(&self, upload_id: &str) {
        let key = &self.key;
        if let Err(e) = self
            .session
            .with_client(|client| client.abort_multipart(key, upload_id))
        {
            tracing::warn!("Cannot abort multipart upload {} for {}: {}", upload_id, self.path, e);
        }
    }
}

impl<C: ObjectClient> Write for ObjectWriter<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= self.part_size {
            self.upload_buffered_part().map_err(io::Error::other)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // data leaves the buffer only in whole parts or on close
        Ok(())
    }
}

impl<C: ObjectClient> Closeable for ObjectWriter<C> {
    fn close(mut self) -> Result<()> {
        tracing::debug!("Closing object output stream for {}", self.path);
        let result = self.finish();
        if result.is_err() {
            if let Some(upload) = self.upload.take() {
                self.abort(&upload.id);
            }
        }
        result
    }
}

impl<C: ObjectClient> Drop for ObjectWriter<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        tracing::warn!(
            "Output stream for {} dropped without close, discarding {} buffered bytes",
            self.path,
            self.buffer.len()
        );
        if let Some(upload) = self.upload.take() {
            self.abort(&upload.id);
        }
    }
}
