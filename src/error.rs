//! Error type shared by the library.

use {miette::Diagnostic, std::fmt, thiserror::Error};

/// The external collaborator a request was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Story idea generation.
    Ideas,
    /// Illustration generation.
    Image,
    /// Text-to-speech.
    Speech,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ideas => "story idea service",
            Self::Image => "image service",
            Self::Speech => "speech service",
        })
    }
}

/// Everything that can go wrong in storyreel.
#[derive(Debug, Error, Diagnostic)]
pub enum StoryError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    #[diagnostic(code(storyreel::http), help("is the story server running at the configured base_url?"))]
    Http(#[from] reqwest::Error),

    /// Unexpected response body.
    #[error("Malformed response payload: {0}")]
    #[diagnostic(code(storyreel::payload))]
    Json(#[from] serde_json::Error),

    /// Undecodable media payload.
    #[error("Invalid base64 in response payload: {0}")]
    #[diagnostic(code(storyreel::payload))]
    Base64(#[from] base64::DecodeError),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable config file.
    #[error("Invalid config file: {0}")]
    #[diagnostic(code(storyreel::config), help("run `storyreel config --init` to write a fresh one"))]
    Config(#[from] toml::de::Error),

    /// Config could not be serialized.
    #[error("Failed to serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// An endpoint answered with an error.
    #[error("{service} failed: {message}")]
    #[diagnostic(code(storyreel::upstream))]
    Upstream {
        /// Endpoint that failed.
        service: Service,
        /// Error text from the server or the transport.
        message: String,
    },

    /// A superseded request was dropped.
    #[error("Request was cancelled")]
    Cancelled,

    /// A batch load ran out of rounds with nothing to show.
    #[error("No playable stories after {rounds} round(s)")]
    #[diagnostic(code(storyreel::exhausted), help("the idea or image service kept failing; try again later"))]
    Exhausted {
        /// Idea rounds spent.
        rounds: u32,
    },

    /// The audio device failed.
    #[error("Audio output error: {0}")]
    Audio(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl StoryError {
    /// An [`StoryError::Upstream`] for `service`.
    pub fn upstream(service: Service, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    /// Cancellation is the expected outcome of a superseded request and is never reported.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<String> for StoryError {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}

/// `Result` with [`StoryError`].
pub type Result<T> = std::result::Result<T, StoryError>;
