//! Error types for the annotation service

/// Result type alias using the service Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in signaling, streaming, and detection operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed or missing handshake input
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    Sdp(String),

    /// Transient failure inside the annotation step
    #[error("Inference error: {0}")]
    Inference(String),

    /// Inference capability failed to initialize or is not loaded
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Send/parse failure on the metadata or config side channel
    #[error("Side channel error: {0}")]
    SideChannel(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrack(String),

    /// Media encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Transport-level failure or close
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is recovered locally without stopping the pipeline.
    ///
    /// Inference and side-channel failures degrade a single frame; the video
    /// path keeps flowing.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Inference(_) | Error::SideChannel(_))
    }

    /// Check if this error rejects a handshake before a session exists
    pub fn is_signaling_error(&self) -> bool {
        matches!(self, Error::Signaling(_) | Error::Sdp(_))
    }
}
