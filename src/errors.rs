use thiserror::Error;

/// Classifies a backend failure so the orchestrator can decide between
/// retrying, falling through the chain, or surfacing the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    Timeout,
    Unauthorized,
    Unavailable,
    MalformedResponse,
}

impl ProviderErrorKind {
    /// Only transient failures earn a retry on the same backend. Retrying a
    /// bad credential or a broken response contract cannot succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable)
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Unauthorized => "unauthorized",
            Self::Unavailable => "unavailable",
            Self::MalformedResponse => "malformed_response",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("backend '{backend}' failed ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub backend: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        backend: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// User-facing resolution outcomes that are reported, never propagated as
/// failures. Silence is the worst outcome for a blind user, so each of these
/// maps to a spoken recovery prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionError {
    NoMatch,
    Ambiguous,
    InvalidIntent,
}

#[derive(Debug, Error)]
pub enum EchoSightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Speech output error: {0}")]
    Speech(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl serde::Serialize for EchoSightError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type EchoSightResult<T> = Result<T, EchoSightError>;
