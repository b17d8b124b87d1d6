use crate::config::{NoContextPolicy, QaConfig};
use crate::corpus::Corpus;
use crate::error::{ConfigError, GenerationError};
use crate::generation::{FallbackClient, GenerationBackend};
use crate::models::{Answer, ContextKind, Role, Transcript, Warning, Window};
use crate::prompt::{compose, PromptContext, PromptTemplate};
use crate::scoring::{KeywordFrequencyScorer, RelevanceScorer};
use crate::selector::{ContextSelector, Selection};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// A composed prompt and how its context was chosen.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub prompt: String,
    pub context: ContextKind,
    pub warnings: Vec<Warning>,
}

/// One interactive conversation over a fixed corpus. Holds everything that
/// used to be ambient state: the corpus, its windows, and the transcript.
pub struct Session<S = KeywordFrequencyScorer>
where
    S: RelevanceScorer,
{
    id: Uuid,
    corpus: Arc<Corpus>,
    selector: ContextSelector<S>,
    windows: Vec<Window>,
    transcript: Transcript,
    template: PromptTemplate,
    full_context_threshold: usize,
    no_context_policy: NoContextPolicy,
}

impl Session<KeywordFrequencyScorer> {
    pub fn new(corpus: Arc<Corpus>, config: &QaConfig) -> Result<Self, ConfigError> {
        let scorer = KeywordFrequencyScorer {
            length_weighting: config.length_weighting,
        };
        Self::with_scorer(corpus, config, scorer)
    }
}

impl<S> Session<S>
where
    S: RelevanceScorer,
{
    pub fn with_scorer(corpus: Arc<Corpus>, config: &QaConfig, scorer: S) -> Result<Self, ConfigError> {
        let selector = ContextSelector::new(scorer, config.selector_config())?;
        let windows = selector.windows(&corpus.text)?;

        Ok(Self {
            id: Uuid::new_v4(),
            corpus,
            selector,
            windows,
            transcript: Transcript::default(),
            template: config.template,
            full_context_threshold: config.full_context_threshold,
            no_context_policy: config.no_context_policy,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn clear(&mut self) {
        info!(session = %self.id, "transcript cleared");
        self.transcript.clear();
    }

    /// Runs the selector over the cached windows without composing a prompt.
    pub fn select(&self, question: &str) -> Selection {
        self.selector.select_from_windows(&self.windows, question)
    }

    /// Chooses context for `question` and composes the prompt. Pure apart
    /// from logging.
    pub fn prepare(&self, question: &str) -> PreparedPrompt {
        let mut warnings = self.corpus.warnings.clone();
        let names = self.corpus.document_names();
        let full_corpus = !self.corpus.is_empty()
            && self.corpus.char_count() <= self.full_context_threshold;

        let (context, kind) = if full_corpus {
            (PromptContext::Text(&self.corpus.text), ContextKind::FullCorpus)
        } else {
            match self.select(question) {
                Selection::Excerpts { text, windows } => {
                    let prompt = compose(self.template, PromptContext::Text(&text), question, &names);
                    return PreparedPrompt {
                        prompt,
                        context: ContextKind::Excerpts {
                            windows: windows.len(),
                        },
                        warnings,
                    };
                }
                Selection::NoRelevantContent => {
                    warn!(session = %self.id, question, "no relevant content");
                    warnings.push(Warning::NoRelevantContent {
                        query: question.to_string(),
                    });
                    match self.no_context_policy {
                        NoContextPolicy::FullCorpus if !self.corpus.is_empty() => {
                            (PromptContext::Text(&self.corpus.text), ContextKind::FullCorpus)
                        }
                        _ => (PromptContext::NoRelevantContent, ContextKind::NoRelevantContent),
                    }
                }
            }
        };

        PreparedPrompt {
            prompt: compose(self.template, context, question, &names),
            context: kind,
            warnings,
        }
    }

    /// One turn: select context, compose, generate, append to the transcript.
    /// On failure the question stays in the transcript without an answer.
    pub async fn ask<B>(
        &mut self,
        question: &str,
        client: &FallbackClient<B>,
        deadline: Option<Instant>,
    ) -> Result<Answer, GenerationError>
    where
        B: GenerationBackend + Send + Sync,
    {
        self.transcript.push(Role::User, question);
        let prepared = self.prepare(question);

        let generated = client.generate(&prepared.prompt, deadline).await?;
        self.transcript.push(Role::Assistant, generated.text.clone());
        info!(
            session = %self.id,
            backend = %generated.backend,
            attempts = generated.attempts,
            "turn answered"
        );

        Ok(Answer {
            text: generated.text,
            backend: generated.backend,
            context: prepared.context,
            warnings: prepared.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::aggregate;
    use crate::error::{BackendError, FailureClass};
    use crate::extractor::{ExtractionLimits, TextExtractor};
    use crate::generation::RetryPolicy;
    use crate::models::{DocumentSource, TruncationReason};
    use crate::prompt::NO_RELEVANT_CONTENT_NOTICE;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoBackend {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        async fn generate(&self, identifier: &str, prompt: &str) -> Result<String, BackendError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(prompt.to_string());
            if self.fail {
                return Err(BackendError::new(identifier, FailureClass::Auth, "bad key"));
            }
            Ok(format!("answer from {identifier}"))
        }
    }

    fn medical_corpus() -> Arc<Corpus> {
        let filler = "lorem ipsum dolor sit amet ".repeat(120);
        let sources = vec![
            DocumentSource::new("symptoms.txt", format!("Fever and cough are symptoms of flu. {filler}")),
            DocumentSource::new("broken.pdf", b"%PDF-1.4\n%broken".to_vec()),
            DocumentSource::new("neuro.txt", format!("{filler} Headache may indicate migraine.")),
        ];
        Arc::new(aggregate(&sources, &TextExtractor::new(ExtractionLimits::default())))
    }

    fn excerpt_config() -> QaConfig {
        QaConfig {
            window_size: 1_000,
            overlap: 0,
            max_windows: 2,
            full_context_threshold: 0,
            ..QaConfig::default()
        }
    }

    fn client(backend: &EchoBackend) -> FallbackClient<&EchoBackend> {
        FallbackClient::new(backend, vec!["primary".to_string()], RetryPolicy::fallback_only())
            .expect("valid client")
    }

    #[tokio::test]
    async fn answers_from_selected_excerpts() -> Result<(), Box<dyn std::error::Error>> {
        let backend = EchoBackend::default();
        let mut session = Session::new(medical_corpus(), &excerpt_config())?;

        let answer = session.ask("fever headache", &client(&backend), None).await?;

        assert_eq!(answer.backend, "primary");
        assert_eq!(answer.context, ContextKind::Excerpts { windows: 2 });
        assert!(answer
            .warnings
            .iter()
            .any(|warning| matches!(warning, Warning::ExtractionFailed { document, .. } if document == "broken.pdf")));

        let prompts = backend.prompts.lock().expect("prompts lock").clone();
        assert!(prompts[0].contains("Fever and cough"));
        assert!(prompts[0].contains("Headache may indicate"));
        assert_eq!(session.transcript().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn unmatched_question_sends_explicit_notice() -> Result<(), Box<dyn std::error::Error>> {
        let backend = EchoBackend::default();
        let mut session = Session::new(medical_corpus(), &excerpt_config())?;

        let answer = session.ask("vaccination", &client(&backend), None).await?;

        assert_eq!(answer.context, ContextKind::NoRelevantContent);
        assert!(answer
            .warnings
            .contains(&Warning::NoRelevantContent { query: "vaccination".to_string() }));
        let prompts = backend.prompts.lock().expect("prompts lock").clone();
        assert!(prompts[0].contains(NO_RELEVANT_CONTENT_NOTICE));
        Ok(())
    }

    #[test]
    fn full_corpus_policy_falls_back_to_everything() -> Result<(), ConfigError> {
        let config = QaConfig {
            no_context_policy: NoContextPolicy::FullCorpus,
            ..excerpt_config()
        };
        let session = Session::new(medical_corpus(), &config)?;

        let prepared = session.prepare("vaccination");
        assert_eq!(prepared.context, ContextKind::FullCorpus);
        assert!(prepared.prompt.contains("[File: neuro.txt]"));
        assert!(prepared
            .warnings
            .iter()
            .any(|warning| matches!(warning, Warning::NoRelevantContent { .. })));
        Ok(())
    }

    #[test]
    fn small_corpus_is_sent_whole() -> Result<(), ConfigError> {
        let sources = vec![DocumentSource::new("short.txt", b"Premiums are due monthly.".to_vec())];
        let corpus = Arc::new(aggregate(&sources, &TextExtractor::new(ExtractionLimits::default())));
        let session = Session::new(corpus, &QaConfig::default())?;

        let prepared = session.prepare("unrelated question");
        assert_eq!(prepared.context, ContextKind::FullCorpus);
        assert!(prepared.prompt.contains("Premiums are due monthly."));
        assert!(prepared.warnings.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failed_turn_keeps_prior_transcript() -> Result<(), Box<dyn std::error::Error>> {
        let working = EchoBackend::default();
        let broken = EchoBackend {
            fail: true,
            ..EchoBackend::default()
        };
        let mut session = Session::new(medical_corpus(), &excerpt_config())?;

        session.ask("fever", &client(&working), None).await?;
        let error = session
            .ask("headache", &client(&broken), None)
            .await
            .expect_err("backend rejects the key");

        assert_eq!(error.class(), Some(FailureClass::Auth));
        let roles = session
            .transcript()
            .turns()
            .iter()
            .map(|turn| turn.role)
            .collect::<Vec<_>>();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);

        session.clear();
        assert!(session.transcript().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn truncation_warnings_reach_the_answer() -> Result<(), Box<dyn std::error::Error>> {
        let sources = vec![DocumentSource::new(
            "terms.txt",
            b"Premiums are due monthly. Late fees apply after thirty days.".to_vec(),
        )];
        let limits = ExtractionLimits {
            page_cap: None,
            char_cap: Some(25),
        };
        let corpus = Arc::new(aggregate(&sources, &TextExtractor::new(limits)));
        let backend = EchoBackend::default();
        let mut session = Session::new(corpus, &QaConfig::default())?;

        let answer = session.ask("when are premiums due", &client(&backend), None).await?;

        assert!(answer.warnings.contains(&Warning::Truncated {
            document: "terms.txt".to_string(),
            reason: TruncationReason::CharCap { limit: 25 },
        }));
        let prompts = backend.prompts.lock().expect("prompts lock").clone();
        assert!(!prompts[0].contains("Late fees"));
        Ok(())
    }

    #[test]
    fn invalid_windowing_is_rejected_up_front() {
        let config = QaConfig {
            window_size: 10,
            overlap: 10,
            ..QaConfig::default()
        };
        assert!(Session::new(medical_corpus(), &config).is_err());
    }

    #[test]
    fn sessions_are_independent() -> Result<(), ConfigError> {
        let corpus = medical_corpus();
        let first = Session::new(Arc::clone(&corpus), &excerpt_config())?;
        let second = Session::new(corpus, &excerpt_config())?;
        assert_ne!(first.id(), second.id());
        assert_eq!(first.windows(), second.windows());
        Ok(())
    }
}
