//! Error types for the engine's synchronous API boundary and for decoder
//! failures surfaced asynchronously through the notification queue.

use crate::format::AudioFormat;

/// Error returned synchronously from public [`crate::Engine`] methods.
///
/// This is deliberately small: asynchronous failure (decoder open/read/seek
/// errors) is reserved for the `Notification::Error` event, and allocation
/// failure is the only other error class an API call can hit.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A decoder was enqueued whose format does not match the engine's
    /// rendering format. Numeric code `0` in the stable error domain.
    #[error("decoder format {actual:?} does not match engine format {expected:?}")]
    FormatNotSupported {
        /// The engine's rendering format.
        expected: AudioFormat,
        /// The format reported by the rejected decoder.
        actual: AudioFormat,
    },

    /// A configuration value passed to [`crate::Engine::create`] or
    /// [`crate::EngineConfig::validate`] was invalid.
    #[error("invalid engine configuration: {0}")]
    InvalidConfiguration(String),

    /// Resource allocation failed during engine construction (ring buffer
    /// or worker thread spawn). Never returned from the realtime path.
    #[error("failed to allocate engine resources: {0}")]
    AllocationFailed(String),
}

impl EngineError {
    /// Numeric error code for [`EngineError::FormatNotSupported`]. Other
    /// variants have no assigned code: they are engine construction
    /// failures, not part of the stable wire-level error domain.
    pub fn code(&self) -> Option<u32> {
        match self {
            EngineError::FormatNotSupported { .. } => Some(0),
            _ => None,
        }
    }
}

/// Opaque error payload carried by [`crate::Notification::Error`].
///
/// Decoder implementations return their own error types from `open`,
/// `read_audio`, and `seek_to_frame`; the engine does not interpret them; it
/// only needs to log and forward them to the delegate.
#[derive(thiserror::Error, Debug, Clone)]
pub enum DecoderError {
    /// `Decoder::open` failed.
    #[error("failed to open decoder: {0}")]
    Open(String),

    /// `Decoder::read_audio` failed.
    #[error("failed to read audio from decoder: {0}")]
    Read(String),

    /// `Decoder::seek_to_frame` failed.
    #[error("failed to seek decoder: {0}")]
    Seek(String),
}

impl From<String> for DecoderError {
    /// Convenience conversion for decoders that only have a message handy.
    /// Prefer the specific variant constructors when the failing operation
    /// is known, since `Open`/`Read`/`Seek` drive different recovery paths
    /// in the decoding thread.
    fn from(msg: String) -> Self {
        DecoderError::Read(msg)
    }
}

impl From<&str> for DecoderError {
    fn from(msg: &str) -> Self {
        DecoderError::Read(msg.to_string())
    }
}
