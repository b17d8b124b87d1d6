use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// `.pdf` files are parsed as PDF, everything else is read as UTF-8 text.
    pub fn from_name(name: &str) -> Self {
        let is_pdf = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            DocumentKind::Pdf
        } else {
            DocumentKind::Text
        }
    }
}

/// Raw input: a file name plus its byte content, as handed over by an
/// upload widget or read from a preloaded path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl DocumentSource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        Self {
            kind: DocumentKind::from_name(&name),
            name,
            bytes: bytes.into(),
        }
    }

    pub fn with_kind(name: impl Into<String>, kind: DocumentKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            kind,
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub kind: DocumentKind,
    #[serde(skip)]
    pub raw_bytes: Vec<u8>,
    pub extracted_text: String,
    /// Pages for PDF input, lines for text input.
    pub unit_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Window {
    pub index: usize,
    /// Character offset of the first character in the corpus.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredWindow {
    pub window: Window,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn {
            role,
            text: text.into(),
            at: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.turns)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    PageCap { limit: usize, total_pages: usize },
    CharCap { limit: usize },
}

/// Non-fatal conditions reported next to an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    Truncated {
        document: String,
        reason: TruncationReason,
    },
    NoExtractableText {
        document: String,
    },
    ExtractionFailed {
        document: String,
        reason: String,
    },
    NoRelevantContent {
        query: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::Truncated {
                document,
                reason: TruncationReason::PageCap { limit, total_pages },
            } => write!(f, "{document}: only the first {limit} of {total_pages} pages were read"),
            Warning::Truncated {
                document,
                reason: TruncationReason::CharCap { limit },
            } => write!(f, "{document}: text truncated to {limit} characters"),
            Warning::NoExtractableText { document } => {
                write!(f, "{document}: no extractable text (image-only scan?)")
            }
            Warning::ExtractionFailed { document, reason } => {
                write!(f, "{document}: extraction failed: {reason}")
            }
            Warning::NoRelevantContent { query } => {
                write!(f, "no relevant content found for query {query:?}")
            }
        }
    }
}

/// How the context of a prompt was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Excerpts { windows: usize },
    FullCorpus,
    NoRelevantContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub backend: String,
    pub context: ContextKind,
    pub warnings: Vec<Warning>,
}
