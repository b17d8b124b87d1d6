use crate::error::ConfigError;
use crate::models::Window;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_SIZE: usize = 2_500;
pub const DEFAULT_OVERLAP: usize = 500;

/// Fixed-size character windows. Sizes are counted in `char`s, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub window_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(window_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        let config = Self {
            window_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindowSize);
        }
        if self.overlap >= self.window_size {
            return Err(ConfigError::OverlapTooLarge {
                window_size: self.window_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.window_size - self.overlap
    }
}

/// Slides over `corpus` with stride `window_size - overlap`. A window starts at
/// every stride point, so the last one or two may be shorter than the window
/// size. Whitespace-only windows are dropped but keep their index slot.
pub fn build_windows(corpus: &str, config: ChunkingConfig) -> Result<Vec<Window>, ConfigError> {
    config.validate()?;

    let boundaries = corpus
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(corpus.len()))
        .collect::<Vec<_>>();
    let char_count = boundaries.len() - 1;

    let mut windows = Vec::new();
    for (index, start) in (0..char_count).step_by(config.stride()).enumerate() {
        let end = (start + config.window_size).min(char_count);
        let text = &corpus[boundaries[start]..boundaries[end]];
        if text.trim().is_empty() {
            continue;
        }

        windows.push(Window {
            index,
            start,
            end,
            text: text.to_string(),
        });
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_must_be_smaller_than_window() {
        assert_eq!(
            ChunkingConfig::new(100, 100),
            Err(ConfigError::OverlapTooLarge {
                window_size: 100,
                overlap: 100
            })
        );
        assert_eq!(ChunkingConfig::new(0, 0), Err(ConfigError::ZeroWindowSize));
    }

    #[test]
    fn invalid_config_is_rejected_by_build() {
        let config = ChunkingConfig {
            window_size: 10,
            overlap: 20,
        };
        assert!(build_windows("some text", config).is_err());
    }

    #[test]
    fn window_count_matches_stride_ceiling() -> Result<(), ConfigError> {
        let corpus = "abcdefghij".repeat(103);
        for (window_size, overlap) in [(100, 0), (100, 30), (250, 249), (1000, 500), (2000, 0)] {
            let config = ChunkingConfig::new(window_size, overlap)?;
            let windows = build_windows(&corpus, config)?;
            let expected = corpus.len().div_ceil(config.stride());
            assert_eq!(windows.len(), expected, "W={window_size} O={overlap}");
        }
        Ok(())
    }

    #[test]
    fn consecutive_windows_share_exactly_the_overlap() -> Result<(), ConfigError> {
        let corpus = (0..500).map(|n| char::from(b'a' + (n % 26) as u8)).collect::<String>();
        let config = ChunkingConfig::new(120, 20)?;
        let windows = build_windows(&corpus, config)?;

        for pair in windows.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if right.end - right.start < config.window_size || left.end == corpus.len() {
                continue;
            }
            assert_eq!(left.end - right.start, 20);
            let tail = &left.text[left.text.len() - 20..];
            let head = &right.text[..20];
            assert_eq!(tail, head);
        }
        Ok(())
    }

    #[test]
    fn final_window_may_be_short() -> Result<(), ConfigError> {
        let windows = build_windows("0123456789abc", ChunkingConfig::new(5, 0)?)?;
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].text, "abc");
        assert_eq!((windows[2].start, windows[2].end), (10, 13));
        Ok(())
    }

    #[test]
    fn whitespace_windows_are_dropped() -> Result<(), ConfigError> {
        let corpus = format!("alpha{}omega", " ".repeat(20));
        let windows = build_windows(&corpus, ChunkingConfig::new(5, 0)?)?;
        let texts = windows.iter().map(|w| w.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["alpha", "omega"]);
        assert_eq!(windows[1].index, 5);
        Ok(())
    }

    #[test]
    fn windows_respect_multibyte_characters() -> Result<(), ConfigError> {
        let windows = build_windows("암진단금수술비특약", ChunkingConfig::new(4, 1)?)?;
        assert_eq!(windows[0].text, "암진단금");
        assert_eq!(windows[1].text, "금수술비");
        Ok(())
    }

    #[test]
    fn empty_corpus_has_no_windows() -> Result<(), ConfigError> {
        assert!(build_windows("", ChunkingConfig::default())?.is_empty());
        Ok(())
    }
}
