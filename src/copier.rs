//! Copy engine
//!
//! Copies between any two endpoints, whatever their backends:
//!
//! - file to file: [`Copier::copy_file`]
//! - file into a directory, keeping its name: [`Copier::copy_file_to_directory`]
//! - directory tree to directory tree: [`Copier::copy_directory`]
//!
//! Every file is relayed through a fixed-size buffer. Destination files are
//! overwritten without warning. A copy that fails mid-transfer leaves the
//! destination truncated; nothing is rolled back.

use crate::error::{BridgeError, Result};
use crate::progress::ProgressReporter;
use crate::storage::{Closeable, Directory, File, DEFAULT_BUFFER_SIZE};
use crate::walk::{TreeVisitor, TreeWalker};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Copy operation result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CopyStats {
    /// Files copied
    pub files_copied: u64,
    /// Bytes copied
    pub bytes_copied: u64,
    /// Destination directories created
    pub dirs_created: u64,
    /// Destination directories that already existed and were merged into
    pub dirs_merged: u64,
    /// Total duration
    pub duration: Duration,
}

impl CopyStats {
    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_copied as f64 / secs
        } else {
            0.0
        }
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Copy Summary ===");
        println!("Files copied:    {}", self.files_copied);
        println!("Bytes copied:    {}", humansize::format_size(self.bytes_copied, humansize::BINARY));
        println!("Directories:     {} created, {} merged", self.dirs_created, self.dirs_merged);
        println!("Duration:        {:.2?}", self.duration);
        println!("Throughput:      {}/s", humansize::format_size(self.throughput() as u64, humansize::BINARY));
    }
}

/// Main copy engine
pub struct Copier {
    /// Relay buffer size
    buffer_size: usize,
    /// Progress reporter
    progress: Option<ProgressReporter>,
}

impl Copier {
    /// Create a copier with the default 64 KiB buffer
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            progress: None,
        }
    }

    /// Set the relay buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Relay buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Progress reporter, if any
    pub fn progress(&self) -> Option<&ProgressReporter> {
        self.progress.as_ref()
    }

    /// Copy `src` over `dst`.
    ///
    /// Fails with [`BridgeError::FileNotFound`] if `src` does not exist.
    pub fn copy_file<S: File, D: File>(&self, src: &S, dst: &D) -> Result<CopyStats> {
        if !src.exists()? {
            return Err(BridgeError::FileNotFound(src.full_path()));
        }

        let start = Instant::now();
        let bytes = self.transmit(src, dst)?;
        Ok(CopyStats {
            files_copied: 1,
            bytes_copied: bytes,
            duration: start.elapsed(),
            ..Default::default()
        })
    }

    /// Copy `src` into `dst_dir` under its own name.
    ///
    /// `dst_dir` is not checked for existence. Whether writing into a missing
    /// directory fails depends on the backend: object stores accept it.
    pub fn copy_file_to_directory<S: File, D: Directory>(
        &self,
        src: &S,
        dst_dir: &D,
    ) -> Result<CopyStats> {
        let dst = dst_dir.file(src.name())?;
        self.copy_file(src, &dst)
    }

    /// Mirror the tree below `src` into `dst`.
    ///
    /// `dst` and its sub-directories are created when missing and merged
    /// into when present. Files are always overwritten. Fails with
    /// [`BridgeError::DirectoryNotFound`] if `src` does not exist and with
    /// [`BridgeError::InvalidPath`] if `dst` lies inside `src` on the same
    /// endpoint.
    pub fn copy_directory<S: Directory, D: Directory>(&self, src: &S, dst: &D) -> Result<CopyStats> {
        if dst.endpoint_id() == src.endpoint_id() && dst.path().starts_with(src.path()) {
            return Err(BridgeError::InvalidPath(format!(
                "cannot copy {} into itself ({})",
                src, dst
            )));
        }
        if !src.exists()? {
            return Err(BridgeError::DirectoryNotFound(src.full_path()));
        }

        tracing::info!("Copying directory {} to {}", src, dst);
        let start = Instant::now();
        let mut visitor = TreeCopy {
            copier: self,
            root: dst.clone(),
            stack: Vec::new(),
            stats: CopyStats::default(),
        };
        TreeWalker::new().walk(src, &mut visitor)?;

        let mut stats = visitor.stats;
        stats.duration = start.elapsed();
        Ok(stats)
    }

    /// Stream `src` into `dst` without any precondition check
    fn transmit<S: File, D: File>(&self, src: &S, dst: &D) -> Result<u64> {
        tracing::debug!("Copying {} to {}", src, dst);
        if tracing::enabled!(tracing::Level::TRACE) && matches!(dst.exists(), Ok(true)) {
            tracing::trace!("About to overwrite {}", dst);
        }
        if let Some(progress) = &self.progress {
            progress.set_current_file(&src.full_path());
        }

        let mut reader = src.open_read()?;
        let mut writer = match dst.open_write() {
            Ok(writer) => writer,
            Err(e) => {
                if let Err(close_err) = reader.close() {
                    tracing::warn!("Cannot close {}: {}", src, close_err);
                }
                return Err(e);
            }
        };

        let relayed = self.relay(&mut reader, &mut writer);
        let read_closed = reader.close();
        let write_closed = writer.close();

        let bytes = relayed
            .map_err(|e| BridgeError::io(format!("Cannot copy {} to {}", src, dst), e))?;
        read_closed?;
        write_closed?;

        if let Some(progress) = &self.progress {
            progress.increment_files(1);
        }
        Ok(bytes)
    }

    fn relay<R: Read, W: Write>(&self, reader: &mut R, writer: &mut W) -> io::Result<u64> {
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            writer.write_all(&buffer[..n])?;
            total += n as u64;

            if let Some(progress) = &self.progress {
                progress.increment_bytes(n as u64);
            }
        }

        writer.flush()?;
        Ok(total)
    }
}

impl Default for Copier {
    fn default() -> Self {
        Self::new()
    }
}

/// Visitor mirroring a source tree into a destination stack
struct TreeCopy<'a, D: Directory> {
    copier: &'a Copier,
    root: D,
    stack: Vec<D>,
    stats: CopyStats,
}

impl<D: Directory> TreeCopy<'_, D> {
    fn current(&self) -> &D {
        self.stack.last().unwrap_or(&self.root)
    }

    fn ensure_directory(&mut self, dir: &D) -> Result<()> {
        if dir.exists()? {
            tracing::debug!("Directory {} already exists, copying into it", dir);
            self.stats.dirs_merged += 1;
        } else {
            dir.mkdir()?;
            self.stats.dirs_created += 1;
        }
        Ok(())
    }
}

impl<S: Directory, D: Directory> TreeVisitor<S> for TreeCopy<'_, D> {
    fn on_directory_start(&mut self, dir: &S, depth: usize) -> Result<()> {
        if depth == 0 {
            let root = self.root.clone();
            return self.ensure_directory(&root);
        }

        let target = self.current().sub_directory(dir.name())?;
        self.ensure_directory(&target)?;
        self.stack.push(target);
        Ok(())
    }

    fn on_file(&mut self, file: &S::File, _depth: usize) -> Result<()> {
        let target = self.current().file(file.name())?;
        let bytes = self.copier.transmit(file, &target)?;
        self.stats.files_copied += 1;
        self.stats.bytes_copied += bytes;
        Ok(())
    }

    fn on_directory_end(&mut self, _dir: &S, depth: usize) -> Result<()> {
        if depth > 0 {
            self.stack.pop();
        }
        Ok(())
    }
}

/// Copy one file over another with default settings
pub fn copy_file<S: File, D: File>(src: &S, dst: &D) -> Result<CopyStats> {
    Copier::new().copy_file(src, dst)
}

/// Copy a file into a directory with default settings
pub fn copy_file_to_directory<S: File, D: Directory>(src: &S, dst_dir: &D) -> Result<CopyStats> {
    Copier::new().copy_file_to_directory(src, dst_dir)
}

/// Copy a directory tree with default settings
pub fn copy_directory<S: Directory, D: Directory>(src: &S, dst: &D) -> Result<CopyStats> {
    Copier::new().copy_directory(src, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::{MemoryBucket, MemoryStore};
    use crate::storage::{Endpoint, LocalStore};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn memory(name: &str) -> (MemoryBucket, MemoryStore) {
        let bucket = MemoryBucket::new(name);
        let store = MemoryStore::open(bucket.clone()).unwrap();
        (bucket, store)
    }

    fn local() -> (TempDir, LocalStore) {
        let root = TempDir::new().unwrap();
        let store = LocalStore::open(root.path().to_path_buf()).unwrap();
        (root, store)
    }

    fn read_all<F: File>(file: &F) -> Vec<u8> {
        let mut reader = file.open_read().unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        reader.close().unwrap();
        data
    }

    #[test]
    fn test_file_to_file_across_backends() {
        let (bucket, s3) = memory("src");
        bucket.insert("in/data.bin", &[7u8; 1000]);
        let (_root, disk) = local();
        disk.directory("/out").mkdir().unwrap();

        let src = s3.file(&s3.directory("/in"), "data.bin").unwrap();
        let dst = disk.file(&disk.directory("/out"), "copy.bin").unwrap();
        let stats = Copier::new().with_buffer_size(64).copy_file(&src, &dst).unwrap();

        assert!(dst.exists().unwrap());
        assert_eq!(read_all(&dst), vec![7u8; 1000]);
        assert_eq!(stats.files_copied, 1);
        assert_eq!(stats.bytes_copied, 1000);
    }

    #[test]
    fn test_copy_overwrites_destination() {
        let (bucket, store) = memory("overwrite");
        bucket.insert("a.txt", b"new");
        bucket.insert("b.txt", b"much older content");

        let root = store.directory("/");
        copy_file(&root.file("a.txt").unwrap(), &root.file("b.txt").unwrap()).unwrap();
        assert_eq!(bucket.object("b.txt").unwrap(), b"new");
    }

    #[test]
    fn test_missing_source_file() {
        let (_bucket, store) = memory("missing");
        let root = store.directory("/");
        let err = copy_file(&root.file("nope").unwrap(), &root.file("dst").unwrap()).unwrap_err();
        assert!(matches!(err, BridgeError::FileNotFound(path) if path == "/nope"));
    }

    #[test]
    fn test_file_into_directory_keeps_name() {
        let (bucket, store) = memory("into");
        bucket.insert("a/source.txt", b"payload");

        let src = store.directory("/a").file("source.txt").unwrap();
        copy_file_to_directory(&src, &store.directory("/b")).unwrap();

        let dst = store.directory("/b").file("source.txt").unwrap();
        assert!(dst.exists().unwrap());
        assert_eq!(bucket.object("b/source.txt").unwrap(), b"payload");
    }

    #[test]
    fn test_directory_copy_merges_and_mirrors() {
        let (bucket, s3) = memory("tree");
        bucket.insert("src/top.txt", b"top");
        bucket.insert("src/sub/inner.txt", b"inner");
        bucket.insert("src/sub/deeper/leaf.txt", b"leaf");
        bucket.insert("src/empty/", b"");

        let (root, disk) = local();
        std::fs::create_dir_all(root.path().join("dst/sub")).unwrap();
        std::fs::write(root.path().join("dst/sub/inner.txt"), b"stale and longer").unwrap();
        std::fs::write(root.path().join("dst/unrelated.txt"), b"keep").unwrap();

        let stats = copy_directory(&s3.directory("/src"), &disk.directory("/dst")).unwrap();

        let read = |p: &str| std::fs::read(root.path().join(p)).unwrap();
        assert_eq!(read("dst/top.txt"), b"top");
        assert_eq!(read("dst/sub/inner.txt"), b"inner");
        assert_eq!(read("dst/sub/deeper/leaf.txt"), b"leaf");
        assert_eq!(read("dst/unrelated.txt"), b"keep");
        assert!(root.path().join("dst/empty").is_dir());

        assert_eq!(stats.files_copied, 3);
        assert_eq!(stats.bytes_copied, 12);
        assert_eq!(stats.dirs_created, 2);
        assert_eq!(stats.dirs_merged, 2);
    }

    #[test]
    fn test_missing_source_directory() {
        let (_bucket, store) = memory("nodir");
        let err = copy_directory(&store.directory("/nope"), &store.directory("/dst")).unwrap_err();
        assert!(matches!(err, BridgeError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_directory_into_itself_is_rejected() {
        let (bucket, store) = memory("self");
        bucket.insert("a/x.txt", b"x");

        for dst in ["/a/b", "/a"] {
            let err = copy_directory(&store.directory("/a"), &store.directory(dst)).unwrap_err();
            assert!(matches!(err, BridgeError::InvalidPath(_)));
        }
        assert_eq!(bucket.keys(), vec!["a/x.txt"]);

        // a sibling sharing the name prefix is a different tree
        copy_directory(&store.directory("/a"), &store.directory("/ab")).unwrap();
        assert_eq!(bucket.object("ab/x.txt").unwrap(), b"x");

        // the same path on another endpoint is fine
        let (other_bucket, other) = memory("other");
        copy_directory(&store.directory("/a"), &other.directory("/a/b")).unwrap();
        assert_eq!(other_bucket.object("a/b/x.txt").unwrap(), b"x");
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_copy_skips_symlinks() {
        let (root, disk) = local();
        std::fs::create_dir_all(root.path().join("src/real")).unwrap();
        std::fs::write(root.path().join("src/a.txt"), b"a").unwrap();
        std::fs::write(root.path().join("src/real/b.txt"), b"b").unwrap();
        std::os::unix::fs::symlink(root.path().join("src/real"), root.path().join("src/link"))
            .unwrap();

        let stats = copy_directory(&disk.directory("/src"), &disk.directory("/dst")).unwrap();

        assert_eq!(stats.files_copied, 2);
        assert_eq!(std::fs::read(root.path().join("dst/real/b.txt")).unwrap(), b"b");
        assert!(std::fs::symlink_metadata(root.path().join("dst/link")).is_err());
    }

    #[test]
    fn test_read_failure_wraps_cause_and_closes_streams() {
        let (bucket, s3) = memory("broken");
        bucket.insert("f.bin", b"data");
        bucket.fail_read("f.bin");
        let (root, disk) = local();

        let src = s3.directory("/").file("f.bin").unwrap();
        let dst = disk.directory("/").file("f.bin").unwrap();
        let err = copy_file(&src, &dst).unwrap_err();

        assert!(matches!(err, BridgeError::Io { .. }));
        assert!(err.to_string().contains("injected read failure"));
        // the destination is left behind, truncated
        assert_eq!(std::fs::read(root.path().join("f.bin")).unwrap(), b"");
    }

    #[test]
    fn test_closed_destination_fails_before_relay() {
        let (bucket, s3) = memory("closed-dst");
        bucket.insert("f", b"x");
        let (_root, mut disk) = local();
        let dst = disk.directory("/").file("f").unwrap();
        disk.close();

        let src = s3.directory("/").file("f").unwrap();
        assert!(matches!(
            copy_file(&src, &dst),
            Err(BridgeError::NotConnected { .. })
        ));
    }

    #[test]
    fn test_progress_counts() {
        let (bucket, store) = memory("progress");
        bucket.insert("p/one", b"12345");
        bucket.insert("p/two", b"678");

        let copier = Copier::new().with_progress(ProgressReporter::disabled());
        copier
            .copy_directory(&store.directory("/p"), &store.directory("/q"))
            .unwrap();

        let summary = copier.progress().unwrap().summary();
        assert_eq!(summary.files_copied, 2);
        assert_eq!(summary.bytes_copied, 8);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_directory_copy_preserves_bytes(data in proptest::collection::vec(any::<u8>(), 100)) {
            let (bucket, store) = memory("random");
            bucket.insert("my/test/folder/source.txt", &data);

            let dst = store.directory("/some/other/folder");
            prop_assert!(!dst.exists().unwrap());

            copy_directory(&store.directory("/my/test/folder"), &dst).unwrap();

            prop_assert!(dst.exists().unwrap());
            let copied = dst.file("source.txt").unwrap();
            prop_assert_eq!(copied.full_path(), "/some/other/folder/source.txt");
            prop_assert_eq!(read_all(&copied), data);
        }
    }
}
