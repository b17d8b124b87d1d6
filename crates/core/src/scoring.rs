use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_KEYWORD_CHARS: usize = 2;

/// A user question broken into lowercase keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub keywords: Vec<String>,
}

impl Query {
    /// Splits on whitespace, lowercases, and drops keywords shorter than
    /// `min_chars` characters. Repeated keywords are kept once, in first-seen order.
    pub fn parse(text: &str, min_chars: usize) -> Self {
        let mut keywords: Vec<String> = Vec::new();
        for token in text.split_whitespace() {
            let keyword = token.to_lowercase();
            if keyword.chars().count() < min_chars || keywords.contains(&keyword) {
                continue;
            }
            keywords.push(keyword);
        }

        Self {
            text: text.to_string(),
            keywords,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

pub trait RelevanceScorer {
    /// Non-negative relevance of `window` for `query`; zero means irrelevant.
    fn score(&self, window: &str, query: &Query) -> f64;
}

impl<S: RelevanceScorer + ?Sized> RelevanceScorer for &S {
    fn score(&self, window: &str, query: &Query) -> f64 {
        (**self).score(window, query)
    }
}

impl<S: RelevanceScorer + ?Sized> RelevanceScorer for Box<S> {
    fn score(&self, window: &str, query: &Query) -> f64 {
        (**self).score(window, query)
    }
}

/// Sums case-insensitive substring occurrences of every keyword. With length
/// weighting on, each occurrence counts `1 + len / 10`, so a hit on a long,
/// specific keyword outweighs a hit on a short one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFrequencyScorer {
    pub length_weighting: bool,
}

impl Default for KeywordFrequencyScorer {
    fn default() -> Self {
        Self {
            length_weighting: true,
        }
    }
}

impl KeywordFrequencyScorer {
    pub fn unweighted() -> Self {
        Self {
            length_weighting: false,
        }
    }

    fn weight(&self, keyword: &str) -> f64 {
        if self.length_weighting {
            1.0 + keyword.chars().count() as f64 / 10.0
        } else {
            1.0
        }
    }
}

impl RelevanceScorer for KeywordFrequencyScorer {
    fn score(&self, window: &str, query: &Query) -> f64 {
        if query.is_empty() {
            return 0.0;
        }

        let lowered = window.to_lowercase();
        query
            .keywords
            .iter()
            .map(|keyword| lowered.matches(keyword.as_str()).count() as f64 * self.weight(keyword))
            .sum()
    }
}
