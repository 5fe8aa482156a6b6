//! Synthetic file tree.
//!
//! Nothing here is stored: every read recomputes its content from live
//! session state, and every directory listing reflects the registry at the
//! moment it is taken. A transport (9P, HTTP, FUSE) drives the tree through
//! the [`File`] and [`Dir`] contracts and owns wire encoding.

mod file;
mod namespace;
mod tree;

pub use file::VirtualFile;
pub use namespace::Namespace;
pub use tree::{CloneFile, RootDir, SessionDir, SESSION_FILES};

use async_trait::async_trait;
use llmfs_common::Result;
use serde::Serialize;
use std::sync::Arc;

/// Permission bits reported by [`Stat::mode`].
pub mod mode {
    pub const READ_ONLY: u32 = 0o444;
    pub const WRITE_ONLY: u32 = 0o222;
    pub const READ_WRITE: u32 = 0o666;
    pub const DIRECTORY: u32 = 0o555;

    pub const fn readable(mode: u32) -> bool {
        mode & 0o444 != 0
    }

    pub const fn writable(mode: u32) -> bool {
        mode & 0o222 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

/// Size-query response. `size` is the byte length of content synthesized
/// at query time and may be stale by the time a read runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub kind: NodeKind,
}

/// Leaf node.
#[async_trait]
pub trait File: Send + Sync {
    fn name(&self) -> &str;

    fn stat(&self) -> Result<Stat>;

    /// Copy content starting at `offset` into `buf`. `Ok(0)` is end-of-data.
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Apply `buf` as a whole new value. Returns the number of bytes consumed.
    async fn write(&self, buf: &[u8], offset: u64) -> Result<usize>;
}

/// Directory node.
pub trait Dir: Send + Sync {
    fn name(&self) -> &str;

    fn stat(&self) -> Result<Stat>;

    fn lookup(&self, name: &str) -> Result<Node>;

    /// Current children, recomputed on every call.
    fn children(&self) -> Result<Vec<Node>>;
}

#[derive(Clone)]
pub enum Node {
    File(Arc<dyn File>),
    Dir(Arc<dyn Dir>),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => f.name(),
            Self::Dir(d) => d.name(),
        }
    }

    pub fn stat(&self) -> Result<Stat> {
        match self {
            Self::File(f) => f.stat(),
            Self::Dir(d) => d.stat(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir(_))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(file) => f.debug_tuple("File").field(&file.name()).finish(),
            Self::Dir(dir) => f.debug_tuple("Dir").field(&dir.name()).finish(),
        }
    }
}

/// Copy `content[offset..]` into `buf`, returning the count copied.
pub fn read_at(content: &[u8], buf: &mut [u8], offset: u64) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= content.len() {
        return 0;
    }
    let n = buf.len().min(content.len() - start);
    buf[..n].copy_from_slice(&content[start..start + n]);
    n
}

pub(crate) fn dir_stat(name: &str) -> Stat {
    Stat {
        name: name.to_string(),
        size: 0,
        mode: mode::DIRECTORY,
        kind: NodeKind::Dir,
    }
}
