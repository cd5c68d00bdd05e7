//! Media source identity.
//!
//! Every cache and pool in the pipeline keys on [`MediaSource`]. It is an
//! immutable, cheaply clonable string (resolved file path or URL).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identity key of one media file.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaSource(Arc<str>);

impl MediaSource {
    /// Create a source from an already-resolved identifier.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Create a source from a filesystem path.
    ///
    /// The path is canonicalized when it exists so that `./a.mp4` and
    /// `/abs/a.mp4` share cache entries. Non-existent paths are kept verbatim.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Self::new(resolved.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Source as a filesystem path (for file-backed decoders).
    pub fn path(&self) -> &Path {
        Path::new(&*self.0)
    }

    /// Short name for log lines.
    pub fn file_name(&self) -> &str {
        self.path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.0)
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaSource({:?})", &*self.0)
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaSource {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MediaSource {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&PathBuf> for MediaSource {
    fn from(p: &PathBuf) -> Self {
        Self::from_path(p)
    }
}
