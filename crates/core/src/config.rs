use crate::chunking::{ChunkingConfig, DEFAULT_OVERLAP, DEFAULT_WINDOW_SIZE};
use crate::error::ConfigError;
use crate::extractor::ExtractionLimits;
use crate::gemini::GenerationSettings;
use crate::generation::RetryPolicy;
use crate::prompt::PromptTemplate;
use crate::scoring::DEFAULT_MIN_KEYWORD_CHARS;
use crate::selector::{SelectorConfig, DEFAULT_MAX_WINDOWS, EXCERPT_SEPARATOR};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FULL_CONTEXT_THRESHOLD: usize = 30_000;

/// How many excerpts a question gets: a shallow pass is cheaper, a detailed
/// one sends more of the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Quick,
    #[default]
    Standard,
    Detailed,
}

impl AnalysisDepth {
    pub fn max_windows(self) -> usize {
        match self {
            AnalysisDepth::Quick => 8,
            AnalysisDepth::Standard => DEFAULT_MAX_WINDOWS,
            AnalysisDepth::Detailed => 25,
        }
    }
}

impl FromStr for AnalysisDepth {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quick" => Ok(AnalysisDepth::Quick),
            "standard" => Ok(AnalysisDepth::Standard),
            "detailed" => Ok(AnalysisDepth::Detailed),
            other => Err(format!("unknown analysis depth {other:?}")),
        }
    }
}

/// What to send when no window matches the question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoContextPolicy {
    /// Send an explicit "nothing relevant was found" notice as the context.
    #[default]
    Notice,
    /// Fall back to the whole corpus.
    FullCorpus,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    pub window_size: usize,
    pub overlap: usize,
    pub max_windows: usize,
    pub min_keyword_chars: usize,
    pub length_weighting: bool,
    pub page_cap: Option<usize>,
    pub char_cap: Option<usize>,
    /// Corpora up to this many characters are sent whole instead of excerpted.
    pub full_context_threshold: usize,
    pub no_context_policy: NoContextPolicy,
    pub template: PromptTemplate,
    pub backends: Vec<String>,
    /// Retries per backend after the first attempt.
    pub max_retries: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "retry_delay_ms")]
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_total_wait_ms")]
    pub max_total_wait: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    pub generation: GenerationSettings,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
            max_windows: DEFAULT_MAX_WINDOWS,
            min_keyword_chars: DEFAULT_MIN_KEYWORD_CHARS,
            length_weighting: true,
            page_cap: None,
            char_cap: None,
            full_context_threshold: DEFAULT_FULL_CONTEXT_THRESHOLD,
            no_context_policy: NoContextPolicy::default(),
            template: PromptTemplate::default(),
            backends: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-flash-latest".to_string(),
            ],
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_total_wait: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            generation: GenerationSettings::default(),
        }
    }
}

impl QaConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::File {
            path: path.display().to_string(),
            details: error.to_string(),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|error| ConfigError::File {
            path: path.display().to_string(),
            details: error.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_depth(mut self, depth: AnalysisDepth) -> Self {
        self.max_windows = depth.max_windows();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.selector_config().validate()?;
        self.extraction_limits().validate()?;
        if self.backends.iter().all(|id| id.trim().is_empty()) {
            return Err(ConfigError::NoBackends);
        }
        self.retry_policy().validate()
    }

    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            window_size: self.window_size,
            overlap: self.overlap,
        }
    }

    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            chunking: self.chunking(),
            max_windows: self.max_windows,
            min_keyword_chars: self.min_keyword_chars,
            separator: EXCERPT_SEPARATOR.to_string(),
        }
    }

    pub fn extraction_limits(&self) -> ExtractionLimits {
        ExtractionLimits {
            page_cap: self.page_cap,
            char_cap: self.char_cap,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.saturating_add(1),
            initial_delay: self.retry_delay,
            multiplier: self.backoff_multiplier,
            max_total_wait: self.max_total_wait,
        }
    }
}
