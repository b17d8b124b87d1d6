use crate::chunking::{build_windows, ChunkingConfig};
use crate::error::ConfigError;
use crate::models::{ScoredWindow, Window};
use crate::scoring::{KeywordFrequencyScorer, Query, RelevanceScorer, DEFAULT_MIN_KEYWORD_CHARS};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_MAX_WINDOWS: usize = 15;
pub const EXCERPT_SEPARATOR: &str = "\n\n━━━━━━━━━━━━━━━━━━\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub chunking: ChunkingConfig,
    pub max_windows: usize,
    pub min_keyword_chars: usize,
    pub separator: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            max_windows: DEFAULT_MAX_WINDOWS,
            min_keyword_chars: DEFAULT_MIN_KEYWORD_CHARS,
            separator: EXCERPT_SEPARATOR.to_string(),
        }
    }
}

impl SelectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        if self.max_windows == 0 {
            return Err(ConfigError::ZeroMaxWindows);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Best windows in descending score order, joined with the separator.
    Excerpts {
        text: String,
        windows: Vec<ScoredWindow>,
    },
    /// No window scored above zero.
    NoRelevantContent,
}

impl Selection {
    pub fn is_relevant(&self) -> bool {
        matches!(self, Selection::Excerpts { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Selection::Excerpts { text, .. } => Some(text),
            Selection::NoRelevantContent => None,
        }
    }
}

pub struct ContextSelector<S = KeywordFrequencyScorer>
where
    S: RelevanceScorer,
{
    scorer: S,
    config: SelectorConfig,
}

impl ContextSelector<KeywordFrequencyScorer> {
    pub fn keyword(config: SelectorConfig) -> Result<Self, ConfigError> {
        Self::new(KeywordFrequencyScorer::default(), config)
    }
}

impl<S> ContextSelector<S>
where
    S: RelevanceScorer,
{
    pub fn new(scorer: S, config: SelectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { scorer, config })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn windows(&self, corpus: &str) -> Result<Vec<Window>, ConfigError> {
        build_windows(corpus, self.config.chunking)
    }

    pub fn select(&self, corpus: &str, query: &str) -> Result<Selection, ConfigError> {
        let windows = self.windows(corpus)?;
        Ok(self.select_from_windows(&windows, query))
    }

    /// Ranks pre-built windows; use this when the windows of a corpus are cached.
    pub fn select_from_windows(&self, windows: &[Window], query: &str) -> Selection {
        let query = Query::parse(query, self.config.min_keyword_chars);
        if query.is_empty() {
            debug!(query = %query.text, "query has no usable keywords");
            return Selection::NoRelevantContent;
        }

        let mut scored = windows
            .iter()
            .filter_map(|window| {
                let score = self.scorer.score(&window.text, &query);
                (score > 0.0).then(|| ScoredWindow {
                    window: window.clone(),
                    score,
                })
            })
            .collect::<Vec<_>>();

        debug!(
            windows = windows.len(),
            matching = scored.len(),
            keywords = query.keywords.len(),
            "scored windows"
        );

        if scored.is_empty() {
            return Selection::NoRelevantContent;
        }

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(self.config.max_windows);

        let text = scored
            .iter()
            .map(|hit| hit.window.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.config.separator);

        Selection::Excerpts {
            text,
            windows: scored,
        }
    }
}
