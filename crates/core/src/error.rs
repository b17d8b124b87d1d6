use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error in {document}: {details}")]
    PdfParse { document: String, details: String },

    #[error("{document} is not valid utf-8 text: {source}")]
    InvalidUtf8 {
        document: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("no documents found in {0}")]
    NoDocuments(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window size must be greater than zero")]
    ZeroWindowSize,

    #[error("overlap {overlap} must be smaller than window size {window_size}")]
    OverlapTooLarge { window_size: usize, overlap: usize },

    #[error("max windows must be greater than zero")]
    ZeroMaxWindows,

    #[error("page cap must be greater than zero when set")]
    ZeroPageCap,

    #[error("character cap must be greater than zero when set")]
    ZeroCharCap,

    #[error("at least one backend identifier is required")]
    NoBackends,

    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("invalid backend endpoint: {0}")]
    Endpoint(String),

    #[error("invalid config file {path}: {details}")]
    File { path: String, details: String },
}

/// Coarse classification of a backend failure, used to decide whether a
/// retry on the same identifier is worth it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    RateLimited,
    Transient,
    Timeout,
    Auth,
    ContentBlocked,
    UnknownModel,
    InvalidRequest,
    Other,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureClass::RateLimited | FailureClass::Transient | FailureClass::Timeout
        )
    }

    /// Maps an HTTP status from a generation endpoint onto a failure class.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => FailureClass::RateLimited,
            401 | 403 => FailureClass::Auth,
            404 => FailureClass::UnknownModel,
            408 => FailureClass::Timeout,
            400 | 422 => FailureClass::InvalidRequest,
            500..=599 => FailureClass::Transient,
            _ => FailureClass::Other,
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureClass::RateLimited => "rate limited",
            FailureClass::Transient => "transient",
            FailureClass::Timeout => "timeout",
            FailureClass::Auth => "authentication",
            FailureClass::ContentBlocked => "content blocked",
            FailureClass::UnknownModel => "unknown model",
            FailureClass::InvalidRequest => "invalid request",
            FailureClass::Other => "other",
        };
        f.write_str(label)
    }
}

/// A single failed call against one backend identifier.
#[derive(Debug, Error, Clone)]
#[error("{class} failure from {backend}: {details}")]
pub struct BackendError {
    pub backend: String,
    pub class: FailureClass,
    pub details: String,
}

impl BackendError {
    pub fn new(backend: impl Into<String>, class: FailureClass, details: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            class,
            details: details.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation unavailable after {attempts} attempt(s); last error ({class}): {last_error}")]
    Unavailable {
        last_error: String,
        class: FailureClass,
        attempts: usize,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GenerationError {
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            GenerationError::Unavailable { class, .. } => Some(*class),
            GenerationError::Config(_) => None,
        }
    }
}
