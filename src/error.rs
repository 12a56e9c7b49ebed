//! Error handling

use std::time::Duration;

/// Failures talking to the remote generation API.
#[derive(Debug)]
pub enum RemoteError {
    /// The request never produced a response.
    Transport(reqwest::Error),
    /// The endpoint answered with a non-2xx status.
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },
    /// The call did not finish within its timeout.
    Timeout(Duration),
    /// The response body was not the JSON we expected.
    InvalidResponse(String),
    /// The response parsed but carried no usable content.
    Empty,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "Request failed: {err}"),
            Self::Status { status, body } => write!(f, "Remote API error {status}: {body}"),
            Self::Timeout(after) => write!(f, "Remote call timed out after {after:?}"),
            Self::InvalidResponse(message) => write!(f, "Invalid response: {message}"),
            Self::Empty => write!(f, "Response contained no content"),
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err)
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::InvalidResponse(err.to_string())
    }
}

/// Why a single image slot could not be rendered remotely.
///
/// Never surfaced as a run failure; the synthesizer turns it into a
/// placeholder render.
#[derive(Debug)]
pub enum SynthesisError {
    /// Transport, status, or timeout failure from the endpoint.
    Remote(RemoteError),
    /// None of the known response shapes contained an image.
    NoDecoderMatched,
    /// Inline image data was not valid base64.
    Base64(base64::DecodeError),
    /// The returned bytes were not a decodable raster image.
    Image(image::ImageError),
}

impl std::fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(err) => write!(f, "{err}"),
            Self::NoDecoderMatched => write!(f, "No known image shape in response"),
            Self::Base64(err) => write!(f, "Failed to base64-decode image: {err}"),
            Self::Image(err) => write!(f, "Failed to decode image: {err}"),
        }
    }
}

impl std::error::Error for SynthesisError {}

impl From<RemoteError> for SynthesisError {
    fn from(err: RemoteError) -> Self {
        SynthesisError::Remote(err)
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        SynthesisError::Remote(RemoteError::Transport(err))
    }
}

impl From<base64::DecodeError> for SynthesisError {
    fn from(err: base64::DecodeError) -> Self {
        SynthesisError::Base64(err)
    }
}

impl From<image::ImageError> for SynthesisError {
    fn from(err: image::ImageError) -> Self {
        SynthesisError::Image(err)
    }
}

/// The initial sticker list request failed; nothing can be generated.
#[derive(Debug)]
pub enum PlanningError {
    /// The remote text model could not be reached or refused the request.
    Remote(RemoteError),
}

impl std::fmt::Display for PlanningError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(err) => write!(f, "Sticker planning failed: {err}"),
        }
    }
}

impl std::error::Error for PlanningError {}

impl From<RemoteError> for PlanningError {
    fn from(err: RemoteError) -> Self {
        PlanningError::Remote(err)
    }
}

/// Failures writing finished assets out.
#[derive(Debug)]
pub enum OutputError {
    /// Filesystem error
    Io(std::io::Error),
    /// PNG encoding failed
    Encode(image::ImageError),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Failed to write output: {err}"),
            Self::Encode(err) => write!(f, "Failed to encode PNG: {err}"),
        }
    }
}

impl std::error::Error for OutputError {}

impl From<std::io::Error> for OutputError {
    fn from(err: std::io::Error) -> Self {
        OutputError::Io(err)
    }
}

impl From<image::ImageError> for OutputError {
    fn from(err: image::ImageError) -> Self {
        OutputError::Encode(err)
    }
}
