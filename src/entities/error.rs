//! Decode errors reported by media backends.
//!
//! These never cross the pipeline boundary: every subsystem turns them into
//! "no result available" and logs them.

/// Media decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Source could not be opened (missing, unreadable, bad container)
    Open(String),
    /// Container has no stream of the requested kind
    NoStream(&'static str),
    /// Stream opened but decoding failed
    Decode(String),
    /// Codec or pixel/sample format not supported by the backend
    Unsupported(String),
    /// Handle or context was already released
    Closed,
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::Open(e) => write!(f, "Open error: {}", e),
            MediaError::NoStream(kind) => write!(f, "No {} stream found", kind),
            MediaError::Decode(e) => write!(f, "Decode error: {}", e),
            MediaError::Unsupported(e) => write!(f, "Unsupported: {}", e),
            MediaError::Closed => write!(f, "Decoder already released"),
        }
    }
}

impl std::error::Error for MediaError {}
