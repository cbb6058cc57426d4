//! Depth-limited tree traversal
//!
//! [`TreeWalker`] walks a directory tree depth-first and reports what it
//! sees to a [`TreeVisitor`]. For a directory at depth `d` it:
//!
//! 1. calls `on_directory_start(dir, d)`
//! 2. if the depth limit allows `d + 1`: recurses into every
//!    sub-directory, then calls `on_file(file, d + 1)` for every file
//! 3. calls `on_directory_end(dir, d)`
//!
//! When the limit stops the descent no listing call is issued for that
//! level, so the limit bounds backend round-trips and not just callbacks.

use crate::error::Result;
use crate::storage::{Directory, File};
use serde::Serialize;

/// Callbacks invoked by [`TreeWalker`]; every hook defaults to a no-op
pub trait TreeVisitor<D: Directory> {
    /// Entering `dir`, before any of its children
    fn on_directory_start(&mut self, _dir: &D, _depth: usize) -> Result<()> {
        Ok(())
    }

    /// A file found at `depth`
    fn on_file(&mut self, _file: &D::File, _depth: usize) -> Result<()> {
        Ok(())
    }

    /// Leaving `dir`, after all of its children
    fn on_directory_end(&mut self, _dir: &D, _depth: usize) -> Result<()> {
        Ok(())
    }
}

/// Depth-first traversal engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeWalker {
    depth_limit: Option<usize>,
}

impl TreeWalker {
    /// Walker without a depth limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Walker that lists children only down to `limit`; the root is depth 0
    pub fn with_depth_limit(limit: usize) -> Self {
        Self {
            depth_limit: Some(limit),
        }
    }

    /// Configured depth limit
    pub fn depth_limit(&self) -> Option<usize> {
        self.depth_limit
    }

    /// Walk the tree below `root`, stopping at the first error
    pub fn walk<D, V>(&self, root: &D, visitor: &mut V) -> Result<()>
    where
        D: Directory,
        V: TreeVisitor<D> + ?Sized,
    {
        self.walk_at(root, 0, visitor)
    }

    fn descends_below(&self, depth: usize) -> bool {
        self.depth_limit.map_or(true, |limit| depth < limit)
    }

    fn walk_at<D, V>(&self, dir: &D, depth: usize, visitor: &mut V) -> Result<()>
    where
        D: Directory,
        V: TreeVisitor<D> + ?Sized,
    {
        visitor.on_directory_start(dir, depth)?;

        if self.descends_below(depth) {
            for sub in dir.list_sub_directories()? {
                self.walk_at(&sub, depth + 1, visitor)?;
            }
            for file in dir.list_files()? {
                visitor.on_file(&file, depth + 1)?;
            }
        } else {
            tracing::trace!("Depth limit reached at {}", dir);
        }

        visitor.on_directory_end(dir, depth)
    }
}

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Directory
    Directory,
    /// File
    File,
}

/// One line of a tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    /// Full path on the backend
    pub path: String,
    /// Entry kind
    #[serde(rename = "type")]
    pub kind: EntryType,
    /// Depth below the walked root
    pub depth: usize,
}

/// Visitor collecting every entry in walk order
#[derive(Debug, Clone, Default)]
pub struct TreeListing {
    entries: Vec<TreeEntry>,
}

impl TreeListing {
    /// Empty listing
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries collected so far
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Consume the listing
    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }
}

impl<D: Directory> TreeVisitor<D> for TreeListing {
    fn on_directory_start(&mut self, dir: &D, depth: usize) -> Result<()> {
        self.entries.push(TreeEntry {
            path: dir.full_path(),
            kind: EntryType::Directory,
            depth,
        });
        Ok(())
    }

    fn on_file(&mut self, file: &D::File, depth: usize) -> Result<()> {
        self.entries.push(TreeEntry {
            path: file.full_path(),
            kind: EntryType::File,
            depth,
        });
        Ok(())
    }
}
