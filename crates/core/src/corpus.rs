use crate::extractor::{PdfExtractor, TextExtractor};
use crate::models::{Document, DocumentSource, Warning, Window};
use crate::ExtractionError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SEPARATOR_RULE_WIDTH: usize = 50;
const DOCUMENT_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

/// Character span of one document's content inside the corpus text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSpan {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Concatenated text of every readable document, with a separator block
/// naming each document before its content.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub fingerprint: String,
    pub documents: Vec<Document>,
    pub text: String,
    pub spans: Vec<DocumentSpan>,
    pub warnings: Vec<Warning>,
}

impl Corpus {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn document_names(&self) -> Vec<&str> {
        self.documents.iter().map(|doc| doc.name.as_str()).collect()
    }

    /// Names of the documents whose content overlaps `window`.
    pub fn documents_in(&self, window: &Window) -> Vec<&str> {
        self.spans
            .iter()
            .filter(|span| span.start < window.end && window.start < span.end)
            .map(|span| span.name.as_str())
            .collect()
    }
}

pub fn separator_block(name: &str) -> String {
    let rule = "=".repeat(SEPARATOR_RULE_WIDTH);
    format!("\n\n{rule}\n[File: {name}]\n{rule}\n\n")
}

/// Extracts every source and concatenates the readable ones in input order.
/// A document that fails to parse or has no text becomes a warning; the rest
/// of the batch is still aggregated.
pub fn aggregate<P: PdfExtractor>(sources: &[DocumentSource], extractor: &TextExtractor<P>) -> Corpus {
    let mut documents = Vec::new();
    let mut warnings = Vec::new();
    let mut spans = Vec::new();
    let mut text = String::new();
    let mut cursor = 0usize;

    for source in sources {
        let extraction = match extractor.extract(source) {
            Ok(extraction) => extraction,
            Err(error) => {
                warn!(document = %source.name, %error, "skipping unreadable document");
                warnings.push(Warning::ExtractionFailed {
                    document: source.name.clone(),
                    reason: error.to_string(),
                });
                continue;
            }
        };

        for reason in &extraction.truncations {
            warnings.push(Warning::Truncated {
                document: source.name.clone(),
                reason: *reason,
            });
        }

        if extraction.is_blank() {
            warn!(document = %source.name, "document has no extractable text");
            warnings.push(Warning::NoExtractableText {
                document: source.name.clone(),
            });
            continue;
        }

        let header = separator_block(&source.name);
        cursor += header.chars().count();
        text.push_str(&header);

        let content_chars = extraction.text.chars().count();
        spans.push(DocumentSpan {
            name: source.name.clone(),
            start: cursor,
            end: cursor + content_chars,
        });
        cursor += content_chars;
        text.push_str(&extraction.text);

        documents.push(Document {
            name: source.name.clone(),
            kind: source.kind,
            raw_bytes: source.bytes.clone(),
            extracted_text: extraction.text,
            unit_count: extraction.unit_count,
        });
    }

    info!(
        documents = documents.len(),
        skipped = sources.len() - documents.len(),
        chars = cursor,
        "aggregated corpus"
    );

    Corpus {
        fingerprint: fingerprint(sources, extractor),
        documents,
        text,
        spans,
        warnings,
    }
}

/// Content identity of a document set under a given set of extraction limits.
pub fn fingerprint<P>(sources: &[DocumentSource], extractor: &TextExtractor<P>) -> String
where
    P: PdfExtractor,
{
    let limits = extractor.limits();
    let mut hasher = Sha256::new();
    for source in sources {
        hasher.update((source.name.len() as u64).to_le_bytes());
        hasher.update(source.name.as_bytes());
        hasher.update([source.kind as u8]);
        hasher.update((source.bytes.len() as u64).to_le_bytes());
        hasher.update(&source.bytes);
    }
    for cap in [limits.page_cap, limits.char_cap] {
        hasher.update(cap.map_or(u64::MAX, |value| value as u64).to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Process-wide corpus cache. Each distinct document set is aggregated at
/// most once; concurrent callers for the same set wait on the same cell.
#[derive(Default)]
pub struct CorpusCache {
    cells: Mutex<HashMap<String, Arc<OnceLock<Arc<Corpus>>>>>,
}

impl CorpusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build<P: PdfExtractor>(
        &self,
        sources: &[DocumentSource],
        extractor: &TextExtractor<P>,
    ) -> Arc<Corpus> {
        let key = fingerprint(sources, extractor);
        let cell = {
            let mut cells = self
                .cells
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(cells.entry(key.clone()).or_default())
        };

        if let Some(corpus) = cell.get() {
            debug!(fingerprint = %key, "corpus cache hit");
            return Arc::clone(corpus);
        }

        Arc::clone(cell.get_or_init(|| Arc::new(aggregate(sources, extractor))))
    }

    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                DOCUMENT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn read_source(path: &Path) -> Result<DocumentSource, ExtractionError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ExtractionError::MissingFileName(path.display().to_string()))?;
    let bytes = fs::read(path)?;
    Ok(DocumentSource::new(name, bytes))
}

/// Reads every supported file under `folder`. Files that cannot be read are
/// reported as warnings instead of failing the whole folder.
pub fn read_folder(folder: &Path) -> Result<(Vec<DocumentSource>, Vec<Warning>), ExtractionError> {
    let files = discover_documents(folder);
    if files.is_empty() {
        return Err(ExtractionError::NoDocuments(folder.display().to_string()));
    }

    let mut sources = Vec::new();
    let mut warnings = Vec::new();
    for path in files {
        match read_source(&path) {
            Ok(source) => sources.push(source),
            Err(error) => warnings.push(Warning::ExtractionFailed {
                document: path.display().to_string(),
                reason: error.to_string(),
            }),
        }
    }

    Ok((sources, warnings))
}
