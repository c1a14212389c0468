use std::fmt;
use std::time::Duration;

/// Recoverable failures surfaced by the editor core.
///
/// Contract violations (undo with nothing to undo, mapping a pointer into a
/// surface that has no displayed size) are not represented here; they panic.
#[derive(Debug)]
pub enum EditorError {
    /// An image or mask blob could not be decoded.
    Decode(String),
    /// A pending decode did not finish within the configured deadline.
    DecodeTimeout { waited: Duration },
    /// The decode worker went away without reporting a result.
    LoaderDisconnected,
    /// A raster could not be encoded (commit output or history snapshot).
    Encode(String),
    /// Commit was requested while the named surface is not loaded.
    SourceUnavailable(&'static str),
    /// A zero-sized raster was requested.
    InvalidDimensions { width: u32, height: u32 },
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorError::Decode(e) => write!(f, "Could not decode image: {}", e),
            EditorError::DecodeTimeout { waited } => {
                write!(f, "Image decode timed out after {:.1}s", waited.as_secs_f32())
            }
            EditorError::LoaderDisconnected => write!(f, "Image loader stopped unexpectedly"),
            EditorError::Encode(e) => write!(f, "Could not encode image: {}", e),
            EditorError::SourceUnavailable(which) => {
                write!(f, "The {} has not finished loading", which)
            }
            EditorError::InvalidDimensions { width, height } => {
                write!(f, "Invalid dimensions {}×{}", width, height)
            }
        }
    }
}

impl std::error::Error for EditorError {}
