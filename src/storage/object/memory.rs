//! In-process object store
//!
//! [`MemoryBucket`] behaves like a single S3 bucket: sorted keys, delimiter
//! listings with continuation tokens, multipart uploads. It also exposes
//! hooks to inject failures and count listing calls, which the tests of the
//! generic algorithms rely on.

use super::{ListPage, ObjectClient, UploadedPart};
use crate::error::{BridgeError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

#[derive(Debug, Default)]
struct PendingUpload {
    key: String,
    parts: BTreeMap<i32, Vec<u8>>,
}

#[derive(Debug, Default)]
struct BucketState {
    objects: BTreeMap<String, StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    next_upload: u64,
    completed_uploads: usize,
    failing_deletes: HashSet<String>,
    failing_reads: HashSet<String>,
    offline: bool,
    list_calls: usize,
}

/// Shared in-memory bucket; clones see the same objects
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    name: String,
    page_size: usize,
    part_size: usize,
    state: Arc<Mutex<BucketState>>,
}

impl MemoryBucket {
    /// Create an empty bucket
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page_size: DEFAULT_PAGE_SIZE,
            part_size: DEFAULT_PART_SIZE,
            state: Arc::default(),
        }
    }

    /// Limit the number of entries returned per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Size above which writes switch to multipart uploads
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Bucket name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object directly, bypassing any endpoint
    pub fn insert(&self, key: &str, data: &[u8]) {
        self.lock().objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: None,
            },
        );
    }

    /// Content of an object
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    /// Content type an object was stored with
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock()
            .objects
            .get(key)
            .and_then(|o| o.content_type.clone())
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Make every delete of `key` fail
    pub fn fail_delete(&self, key: &str) {
        self.lock().failing_deletes.insert(key.to_string());
    }

    /// Make every read of `key` fail after the body was opened
    pub fn fail_read(&self, key: &str) {
        self.lock().failing_reads.insert(key.to_string());
    }

    /// Refuse new connections while offline
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of listing requests served so far
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Multipart uploads started but neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Multipart uploads completed so far
    pub fn completed_multipart_uploads(&self) -> usize {
        self.lock().completed_uploads
    }
}

fn not_found(key: &str) -> BridgeError {
    BridgeError::io(
        format!("Cannot read object {}", key),
        io::Error::new(io::ErrorKind::NotFound, "no such key"),
    )
}

/// Body of an object read from a [`MemoryBucket`]
#[derive(Debug)]
pub struct MemoryBody {
    data: Cursor<Vec<u8>>,
    failing: bool,
}

impl Read for MemoryBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.failing {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected read failure",
            ));
        }
        self.data.read(buf)
    }
}

/// Client over a [`MemoryBucket`]
#[derive(Debug)]
pub struct MemoryClient {
    bucket: MemoryBucket,
}

impl ObjectClient for MemoryClient {
    type Options = MemoryBucket;
    type Body = MemoryBody;

    fn connect(options: &MemoryBucket) -> Result<Self> {
        if options.lock().offline {
            return Err(BridgeError::connection(
                Self::target(options),
                "bucket is offline",
            ));
        }
        Ok(Self {
            bucket: options.clone(),
        })
    }

    fn target(options: &MemoryBucket) -> String {
        format!("memory://{}", options.name)
    }

    fn page_size(&self) -> usize {
        self.bucket.page_size
    }

    fn part_size(&self) -> usize {
        self.bucket.part_size
    }

    fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<char>,
        token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let mut state = self.bucket.lock();
        state.list_calls += 1;

        let mut page = ListPage::default();
        let mut returned = 0;
        let mut last: Option<String> = None;

        for key in state.objects.keys() {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(token) = token {
                let after_prefix_token =
                    delimiter.is_some_and(|d| token.ends_with(d)) && key.starts_with(token);
                if key.as_str() <= token || after_prefix_token {
                    continue;
                }
            }

            let rest = &key[prefix.len()..];
            let common = delimiter
                .and_then(|d| rest.find(d).map(|idx| format!("{}{}", prefix, &rest[..=idx])));

            if let Some(common) = &common {
                if page.common_prefixes.last() == Some(common) {
                    continue;
                }
            }

            if returned == max_keys {
                page.next_token = last;
                return Ok(page);
            }

            match common {
                Some(common) => {
                    last = Some(common.clone());
                    page.common_prefixes.push(common);
                }
                None => {
                    last = Some(key.clone());
                    page.keys.push(key.clone());
                }
            }
            returned += 1;
        }

        Ok(page)
    }

    fn head(&self, key: &str) -> Result<bool> {
        Ok(self.bucket.lock().objects.contains_key(key))
    }

    fn get(&self, key: &str) -> Result<MemoryBody> {
        let state = self.bucket.lock();
        let object = state.objects.get(key).ok_or_else(|| not_found(key))?;
        Ok(MemoryBody {
            data: Cursor::new(object.data.clone()),
            failing: state.failing_reads.contains(key),
        })
    }

    fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        self.bucket.lock().objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.bucket.lock();
        if state.failing_deletes.contains(key) {
            return Err(BridgeError::io(
                format!("Cannot delete object {}", key),
                io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
            ));
        }
        state.objects.remove(key);
        Ok(())
    }

    fn create_multipart(&self, key: &str) -> Result<String> {
        let mut state = self.bucket.lock();
        state.next_upload += 1;
        let id = format!("upload-{}", state.next_upload);
        state.uploads.insert(
            id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        number: i32,
        data: Vec<u8>,
    ) -> Result<UploadedPart> {
        let mut state = self.bucket.lock();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| unknown_upload(upload_id))?;
        upload.parts.insert(number, data);
        Ok(UploadedPart {
            number,
            etag: format!("\"{}-{}\"", upload_id, number),
        })
    }

    fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<()> {
        let mut state = self.bucket.lock();
        let upload = state
            .uploads
            .remove(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| unknown_upload(upload_id))?;

        let mut data = Vec::new();
        for part in &parts {
            let chunk = upload.parts.get(&part.number).ok_or_else(|| {
                BridgeError::io(
                    format!("Cannot complete upload {}", upload_id),
                    io::Error::new(io::ErrorKind::InvalidInput, "missing part"),
                )
            })?;
            data.extend_from_slice(chunk);
        }

        state.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: None,
            },
        );
        state.completed_uploads += 1;
        Ok(())
    }

    fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<()> {
        self.bucket.lock().uploads.remove(upload_id);
        Ok(())
    }
}

fn unknown_upload(upload_id: &str) -> BridgeError {
    BridgeError::io(
        format!("Unknown multipart upload {}", upload_id),
        io::Error::new(io::ErrorKind::NotFound, "no such upload"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(bucket: &MemoryBucket) -> MemoryClient {
        MemoryClient::connect(bucket).unwrap()
    }

    #[test]
    fn test_delimiter_listing() {
        let bucket = MemoryBucket::new("t");
        for key in ["a/1", "a/2", "a/b/3", "a/b/4", "a/c/5", "z"] {
            bucket.insert(key, b"x");
        }
        let page = client(&bucket).list_page("a/", Some('/'), None, 100).unwrap();

        assert_eq!(page.keys, vec!["a/1", "a/2"]);
        assert_eq!(page.common_prefixes, vec!["a/b/", "a/c/"]);
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_listing_without_delimiter_is_recursive() {
        let bucket = MemoryBucket::new("t");
        for key in ["a/1", "a/b/3", "b/1"] {
            bucket.insert(key, b"x");
        }
        let page = client(&bucket).list_page("a/", None, None, 100).unwrap();
        assert_eq!(page.keys, vec!["a/1", "a/b/3"]);
        assert!(page.common_prefixes.is_empty());
    }

    #[test]
    fn test_continuation_tokens() {
        let bucket = MemoryBucket::new("t");
        for key in ["p/a", "p/b/1", "p/b/2", "p/c", "p/d/1"] {
            bucket.insert(key, b"x");
        }
        let client = client(&bucket);

        let first = client.list_page("p/", Some('/'), None, 2).unwrap();
        assert_eq!(first.keys, vec!["p/a"]);
        assert_eq!(first.common_prefixes, vec!["p/b/"]);
        let token = first.next_token.unwrap();
        assert_eq!(token, "p/b/");

        let second = client.list_page("p/", Some('/'), Some(&token), 2).unwrap();
        assert_eq!(second.keys, vec!["p/c"]);
        assert_eq!(second.common_prefixes, vec!["p/d/"]);
        assert!(second.next_token.is_none());
        assert_eq!(bucket.list_calls(), 2);
    }

    #[test]
    fn test_injected_delete_failure() {
        let bucket = MemoryBucket::new("t");
        bucket.insert("k", b"x");
        bucket.fail_delete("k");

        assert!(client(&bucket).delete("k").is_err());
        assert!(bucket.object("k").is_some());
    }

    #[test]
    fn test_multipart_assembles_parts_in_order() {
        let bucket = MemoryBucket::new("t");
        let client = client(&bucket);

        let id = client.create_multipart("big").unwrap();
        let one = client.upload_part("big", &id, 1, b"hello ".to_vec()).unwrap();
        let two = client.upload_part("big", &id, 2, b"world".to_vec()).unwrap();
        client.complete_multipart("big", &id, vec![one, two]).unwrap();

        assert_eq!(bucket.object("big").unwrap(), b"hello world");
        assert_eq!(bucket.pending_uploads(), 0);
    }

    #[test]
    fn test_injected_read_failure() {
        let bucket = MemoryBucket::new("t");
        bucket.insert("k", b"data");
        bucket.fail_read("k");

        let mut body = client(&bucket).get("k").unwrap();
        let mut buf = Vec::new();
        assert!(body.read_to_end(&mut buf).is_err());
    }

    #[test]
    fn test_get_missing_key() {
        let bucket = MemoryBucket::new("t");
        assert!(matches!(
            client(&bucket).get("missing"),
            Err(BridgeError::Io { .. })
        ));
    }
}
