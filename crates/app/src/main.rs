use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use doc_qa_core::{
    read_folder, read_source, AnalysisDepth, Answer, Corpus, CorpusCache, DocumentSource,
    FailureClass, FallbackClient, GeminiBackend, GenerationError, PromptTemplate, QaConfig, Selection, Session,
    TextExtractor, Warning,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML config file; flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Generation API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Backend identifier to try, in order. Repeat for a fallback chain.
    #[arg(long = "backend", global = true)]
    backends: Vec<String>,

    /// Seconds to wait for an answer before giving up on a turn.
    #[arg(long, default_value = "180", global = true)]
    timeout_secs: u64,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Args)]
struct Tuning {
    /// quick, standard or detailed; sets the number of excerpts.
    #[arg(long, global = true)]
    depth: Option<AnalysisDepth>,

    #[arg(long, global = true)]
    window_size: Option<usize>,

    #[arg(long, global = true)]
    overlap: Option<usize>,

    #[arg(long, global = true)]
    max_windows: Option<usize>,

    /// Read at most this many pages per PDF.
    #[arg(long, global = true)]
    page_cap: Option<usize>,

    /// Keep at most this many characters per document.
    #[arg(long, global = true)]
    char_cap: Option<usize>,

    /// Answer as a side-by-side comparison table of the documents.
    #[arg(long, default_value_t = false, global = true)]
    compare: bool,
}

#[derive(Args)]
struct Documents {
    /// PDF or text file to load. Repeatable.
    #[arg(long = "file")]
    files: Vec<PathBuf>,

    /// Folder of preloaded documents, searched recursively.
    #[arg(long)]
    folder: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask one question about the documents.
    Ask {
        #[command(flatten)]
        documents: Documents,
        /// Question to answer
        #[arg(long)]
        query: String,
    },
    /// Interactive question loop over stdin. `/clear` resets the transcript, `/quit` exits.
    Chat {
        #[command(flatten)]
        documents: Documents,
        /// Write the transcript as JSON here on exit.
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Show which excerpts a question would select, without calling a backend.
    Search {
        #[command(flatten)]
        documents: Documents,
        #[arg(long)]
        query: String,
    },
    /// List backend identifiers available to the API key.
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-qa boot"
    );

    let cache = CorpusCache::new();
    let timeout = Duration::from_secs(cli.timeout_secs);

    match &cli.command {
        Command::Ask { documents, query } => {
            let corpus = load_corpus(&cache, documents, &config)?;
            let client = build_client(&cli, &config)?;
            let mut session = Session::new(corpus, &config)?;

            let answer = session
                .ask(query, &client, deadline_after(timeout))
                .await
                .map_err(describe_generation_error)?;
            print_answer(&answer, &mut HashSet::new());
        }
        Command::Chat {
            documents,
            transcript,
        } => {
            let corpus = load_corpus(&cache, documents, &config)?;
            let client = build_client(&cli, &config)?;
            let mut session = Session::new(corpus, &config)?;
            let mut shown = HashSet::new();

            println!(
                "{} document(s) loaded: {}",
                session.corpus().documents.len(),
                session.corpus().document_names().join(", ")
            );
            println!("Ask anything. /clear resets the conversation, /quit exits.");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let question = line.trim();
                match question {
                    "" => continue,
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        session.clear();
                        println!("(conversation cleared)");
                        continue;
                    }
                    _ => {}
                }

                match session
                    .ask(question, &client, deadline_after(timeout))
                    .await
                {
                    Ok(answer) => print_answer(&answer, &mut shown),
                    Err(error) => eprintln!("{:#}", describe_generation_error(error)),
                }
            }

            if let Some(path) = transcript {
                let json = session.transcript().to_json()?;
                tokio::fs::write(path, json)
                    .await
                    .with_context(|| format!("writing transcript to {}", path.display()))?;
            }
        }
        Command::Search { documents, query } => {
            let corpus = load_corpus(&cache, documents, &config)?;
            let session = Session::new(Arc::clone(&corpus), &config)?;

            println!("query: {query}");
            match session.select(query) {
                Selection::Excerpts { windows, .. } => {
                    for hit in windows {
                        println!(
                            "[window {}] score={:.2} chars={}..{} documents={}",
                            hit.window.index,
                            hit.score,
                            hit.window.start,
                            hit.window.end,
                            corpus.documents_in(&hit.window).join(",")
                        );
                        println!("{}", hit.window.text.trim());
                    }
                }
                Selection::NoRelevantContent => {
                    println!("no relevant content found; try rephrasing with terms from the documents");
                }
            }
        }
        Command::Models => {
            let backend = gemini_backend(&cli, &config)?;
            let models = backend
                .list_models()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            if models.is_empty() {
                warn!("no model supporting generateContent is visible to this key");
            }
            for model in models {
                println!("{}", model.name);
            }
        }
    }

    Ok(())
}

fn resolve_config(cli: &Cli) -> anyhow::Result<QaConfig> {
    let mut config = match &cli.config {
        Some(path) => QaConfig::load(path)?,
        None => QaConfig::default(),
    };

    let tuning = &cli.tuning;
    if let Some(depth) = tuning.depth {
        config = config.with_depth(depth);
    }
    if let Some(value) = tuning.window_size {
        config.window_size = value;
    }
    if let Some(value) = tuning.overlap {
        config.overlap = value;
    }
    if let Some(value) = tuning.max_windows {
        config.max_windows = value;
    }
    if tuning.page_cap.is_some() {
        config.page_cap = tuning.page_cap;
    }
    if tuning.char_cap.is_some() {
        config.char_cap = tuning.char_cap;
    }
    if tuning.compare {
        config.template = PromptTemplate::Comparison;
    }
    if !cli.backends.is_empty() {
        config.backends = cli.backends.clone();
    }

    config.validate()?;
    Ok(config)
}

fn load_corpus(
    cache: &CorpusCache,
    documents: &Documents,
    config: &QaConfig,
) -> anyhow::Result<Arc<Corpus>> {
    let mut sources: Vec<DocumentSource> = Vec::new();

    if let Some(folder) = &documents.folder {
        let (found, warnings) = read_folder(folder)?;
        for warning in warnings {
            warn!(%warning, "skipped file");
        }
        sources.extend(found);
    }

    for path in &documents.files {
        match read_source(path) {
            Ok(source) => sources.push(source),
            Err(error) => warn!(path = %path.display(), %error, "skipped file"),
        }
    }

    if sources.is_empty() {
        bail!("no documents to load; pass --file or --folder");
    }

    let extractor = TextExtractor::new(config.extraction_limits());
    let corpus = cache.get_or_build(&sources, &extractor);
    if corpus.is_empty() {
        for warning in &corpus.warnings {
            eprintln!("warning: {warning}");
        }
        bail!("none of the {} document(s) yielded any text", sources.len());
    }

    info!(
        documents = corpus.documents.len(),
        chars = corpus.char_count(),
        fingerprint = %corpus.fingerprint,
        "corpus ready"
    );
    Ok(corpus)
}

fn gemini_backend(cli: &Cli, config: &QaConfig) -> anyhow::Result<GeminiBackend> {
    let Some(api_key) = cli.api_key.as_deref().filter(|key| !key.trim().is_empty()) else {
        bail!("no API key; set GEMINI_API_KEY or pass --api-key");
    };
    Ok(GeminiBackend::new(
        api_key,
        config.generation,
        config.request_timeout,
    )?)
}

fn build_client(cli: &Cli, config: &QaConfig) -> anyhow::Result<FallbackClient<GeminiBackend>> {
    let backend = gemini_backend(cli, config)?;
    Ok(FallbackClient::new(
        backend,
        config.backends.clone(),
        config.retry_policy(),
    )?)
}

/// `None` when the timeout is too large to express as an instant.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn print_answer(answer: &Answer, shown: &mut HashSet<String>) {
    for warning in &answer.warnings {
        let line = warning.to_string();
        let repeats = !matches!(warning, Warning::NoRelevantContent { .. });
        if repeats && !shown.insert(line.clone()) {
            continue;
        }
        eprintln!("warning: {line}");
    }

    println!("{}", answer.text.trim_end());
    println!("-- answered by {}", answer.backend);
}

fn describe_generation_error(error: GenerationError) -> anyhow::Error {
    let hint = match error.class() {
        Some(FailureClass::RateLimited) => {
            "every backend is rate limited; wait a moment and ask again"
        }
        Some(FailureClass::Auth) => "check that the API key is valid and the API is enabled",
        Some(FailureClass::ContentBlocked) => {
            "the request was blocked by content filters; rephrase the question"
        }
        Some(FailureClass::UnknownModel) => {
            "none of the configured backends exist; run `doc-qa models`"
        }
        Some(FailureClass::Timeout) => "the backend did not answer in time",
        _ => "the question was not answered; you can ask again",
    };
    anyhow::Error::new(error).context(hint)
}
