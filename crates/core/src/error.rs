/// Result alias that carries the custom [`ChromaError`] type.
pub type Result<T> = std::result::Result<T, ChromaError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ChromaError {
    /// Free-form failure, mostly used for poisoned shared state.
    #[error("{0}")]
    Message(String),
    /// A caller handed in data the pipeline cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The user or the platform refused access to the audio input.
    #[error("audio capture permission denied: {0}")]
    PermissionDenied(String),
    /// Any other failure while opening or running the audio input.
    #[error("audio capture failed: {0}")]
    Capture(String),
    /// The accumulation surfaces could not be created.
    #[error("render surface unavailable: {0}")]
    Surface(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("malformed configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("spectrum transform failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl ChromaError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Returns `true` when the failure stems from a refused capture request.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

impl From<&str> for ChromaError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ChromaError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
