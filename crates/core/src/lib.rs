pub mod chunking;
pub mod config;
pub mod corpus;
pub mod error;
pub mod extractor;
pub mod gemini;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod scoring;
pub mod selector;
pub mod session;

pub use chunking::{build_windows, ChunkingConfig};
pub use config::{AnalysisDepth, NoContextPolicy, QaConfig};
pub use corpus::{
    aggregate, discover_documents, read_folder, read_source, Corpus, CorpusCache, DocumentSpan,
};
pub use error::{BackendError, ConfigError, ExtractionError, FailureClass, GenerationError};
pub use extractor::{
    Extraction, ExtractionLimits, LopdfExtractor, PageText, PdfExtractor, TextExtractor,
};
pub use gemini::{GeminiBackend, GenerationSettings, ModelInfo};
pub use generation::{FallbackClient, GenerationBackend, Generated, RetryPolicy};
pub use models::{
    Answer, ContextKind, Document, DocumentKind, DocumentSource, Role, ScoredWindow, Transcript,
    TruncationReason, Turn, Warning, Window,
};
pub use prompt::{compose, PromptContext, PromptTemplate};
pub use scoring::{KeywordFrequencyScorer, Query, RelevanceScorer};
pub use selector::{ContextSelector, Selection, SelectorConfig};
pub use session::{PreparedPrompt, Session};
