use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Opaque identifier of the remote file being cached.
///
/// Cheap to clone; used as the key for all per-file cache state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath(Arc<str>);

impl RemotePath {
    pub fn new(path: impl Into<Arc<str>>) -> RemotePath {
        RemotePath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        RemotePath::new(path)
    }
}

impl From<String> for RemotePath {
    fn from(path: String) -> Self {
        RemotePath::new(path)
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ReadRequest identifies one contiguous byte range of a remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    path: RemotePath,
    offset: u64,
    length: u32,
}

impl ReadRequest {
    /// Panics if `offset + length` overflows the addressable range.
    pub fn new(path: RemotePath, offset: u64, length: u32) -> ReadRequest {
        assert!(
            offset.checked_add(length as u64).is_some(),
            "range end overflows u64"
        );
        ReadRequest {
            path,
            offset,
            length,
        }
    }

    pub fn path(&self) -> &RemotePath {
        &self.path
    }

    /// Starting offset within the remote file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Exclusive end offset of the requested range.
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

impl Display for ReadRequest {
    /// Format string consists of the remote path followed by the byte range
    /// being requested (in Rust Range format, with the start being inclusive
    /// and the end being exclusive).
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ {}:{}..{} }}", self.path, self.offset, self.end())
    }
}
