use crate::error::{ConfigError, ExtractionError};
use crate::models::{DocumentKind, DocumentSource, TruncationReason};
use lopdf::Document;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Pages read from a PDF together with the page count of the whole file.
#[derive(Debug, Clone, Default)]
pub struct PdfPages {
    pub pages: Vec<PageText>,
    pub pages_read: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub page_cap: Option<usize>,
    pub char_cap: Option<usize>,
}

impl ExtractionLimits {
    /// Caps must be positive when set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_cap == Some(0) {
            return Err(ConfigError::ZeroPageCap);
        }
        if self.char_cap == Some(0) {
            return Err(ConfigError::ZeroCharCap);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: String,
    /// Pages read for PDF input, lines for text input.
    pub unit_count: usize,
    pub truncations: Vec<TruncationReason>,
}

impl Extraction {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        !self.truncations.is_empty()
    }
}

pub trait PdfExtractor {
    /// Returns the text of every page that yields any, in page order. Reading
    /// stops once `page_cap` pages have been visited.
    fn extract_pages(
        &self,
        name: &str,
        bytes: &[u8],
        page_cap: Option<usize>,
    ) -> Result<PdfPages, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(
        &self,
        name: &str,
        bytes: &[u8],
        page_cap: Option<usize>,
    ) -> Result<PdfPages, ExtractionError> {
        let document = Document::load_mem(bytes).map_err(|error| ExtractionError::PdfParse {
            document: name.to_string(),
            details: error.to_string(),
        })?;

        let page_numbers = document.get_pages().into_keys().collect::<Vec<_>>();
        let total_pages = page_numbers.len();
        let limit = page_cap.unwrap_or(total_pages).min(total_pages);

        let mut pages = Vec::new();
        for page_no in page_numbers.into_iter().take(limit) {
            match document.extract_text(&[page_no]) {
                Ok(text) if !text.trim().is_empty() => pages.push(PageText {
                    number: page_no,
                    text,
                }),
                Ok(_) => debug!(document = name, page = page_no, "page has no text"),
                Err(error) => {
                    debug!(document = name, page = page_no, %error, "page text extraction failed")
                }
            }
        }

        Ok(PdfPages {
            pages,
            pages_read: limit,
            total_pages,
        })
    }
}

pub struct TextExtractor<P = LopdfExtractor> {
    pdf: P,
    limits: ExtractionLimits,
}

impl TextExtractor<LopdfExtractor> {
    pub fn new(limits: ExtractionLimits) -> Self {
        Self {
            pdf: LopdfExtractor,
            limits,
        }
    }
}

impl<P: PdfExtractor> TextExtractor<P> {
    pub fn with_pdf_extractor(pdf: P, limits: ExtractionLimits) -> Self {
        Self { pdf, limits }
    }

    pub fn limits(&self) -> ExtractionLimits {
        self.limits
    }

    pub fn extract(&self, source: &DocumentSource) -> Result<Extraction, ExtractionError> {
        let mut extraction = match source.kind {
            DocumentKind::Pdf => self.extract_pdf(source)?,
            DocumentKind::Text => extract_plain_text(source)?,
        };

        if let Some(limit) = self.limits.char_cap {
            if truncate_chars(&mut extraction.text, limit) {
                extraction
                    .truncations
                    .push(TruncationReason::CharCap { limit });
            }
        }

        Ok(extraction)
    }

    fn extract_pdf(&self, source: &DocumentSource) -> Result<Extraction, ExtractionError> {
        let read = self
            .pdf
            .extract_pages(&source.name, &source.bytes, self.limits.page_cap)?;

        let mut text = String::new();
        for page in &read.pages {
            text.push_str(&page.text);
            text.push('\n');
        }

        let mut truncations = Vec::new();
        if let Some(limit) = self.limits.page_cap {
            if read.total_pages > limit {
                truncations.push(TruncationReason::PageCap {
                    limit,
                    total_pages: read.total_pages,
                });
            }
        }

        Ok(Extraction {
            text,
            unit_count: read.pages_read,
            truncations,
        })
    }
}

fn extract_plain_text(source: &DocumentSource) -> Result<Extraction, ExtractionError> {
    let text = String::from_utf8(source.bytes.clone()).map_err(|error| {
        ExtractionError::InvalidUtf8 {
            document: source.name.clone(),
            source: error,
        }
    })?;

    Ok(Extraction {
        unit_count: text.lines().count(),
        text,
        truncations: Vec::new(),
    })
}

/// Cuts `text` down to at most `limit` characters. Returns whether anything was cut.
pub fn truncate_chars(text: &mut String, limit: usize) -> bool {
    match text.char_indices().nth(limit) {
        Some((byte_offset, _)) => {
            text.truncate(byte_offset);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePdf {
        pages: Vec<&'static str>,
    }

    impl PdfExtractor for FakePdf {
        fn extract_pages(
            &self,
            _name: &str,
            _bytes: &[u8],
            page_cap: Option<usize>,
        ) -> Result<PdfPages, ExtractionError> {
            let limit = page_cap.unwrap_or(self.pages.len()).min(self.pages.len());
            let pages = self
                .pages
                .iter()
                .take(limit)
                .enumerate()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.to_string(),
                })
                .collect();

            Ok(PdfPages {
                pages,
                pages_read: limit,
                total_pages: self.pages.len(),
            })
        }
    }

    fn pdf_source() -> DocumentSource {
        DocumentSource::new("scan.pdf", b"%PDF-1.4".to_vec())
    }

    fn build_pdf(pages: &[&str]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }

    #[test]
    fn image_only_pages_are_skipped_without_error() -> Result<(), ExtractionError> {
        let extractor = TextExtractor::with_pdf_extractor(
            FakePdf {
                pages: vec!["first page", "   ", "third page"],
            },
            ExtractionLimits::default(),
        );

        let extraction = extractor.extract(&pdf_source())?;
        assert_eq!(extraction.text, "first page\nthird page\n");
        assert_eq!(extraction.unit_count, 3);
        assert!(!extraction.is_truncated());
        Ok(())
    }

    #[test]
    fn page_cap_is_flagged() -> Result<(), ExtractionError> {
        let extractor = TextExtractor::with_pdf_extractor(
            FakePdf {
                pages: vec!["one", "two", "three", "four"],
            },
            ExtractionLimits {
                page_cap: Some(2),
                char_cap: None,
            },
        );

        let extraction = extractor.extract(&pdf_source())?;
        assert_eq!(extraction.text, "one\ntwo\n");
        assert_eq!(extraction.unit_count, 2);
        assert_eq!(
            extraction.truncations,
            vec![TruncationReason::PageCap {
                limit: 2,
                total_pages: 4
            }]
        );
        Ok(())
    }

    #[test]
    fn char_cap_truncates_on_char_boundary() -> Result<(), ExtractionError> {
        let extractor = TextExtractor::new(ExtractionLimits {
            page_cap: None,
            char_cap: Some(4),
        });
        let source = DocumentSource::new("notes.txt", "보험약관 내용".as_bytes().to_vec());

        let extraction = extractor.extract(&source)?;
        assert_eq!(extraction.text, "보험약관");
        assert_eq!(
            extraction.truncations,
            vec![TruncationReason::CharCap { limit: 4 }]
        );
        Ok(())
    }

    #[test]
    fn text_documents_count_lines() -> Result<(), ExtractionError> {
        let extractor = TextExtractor::new(ExtractionLimits::default());
        let source = DocumentSource::new("notes.txt", b"a\nb\nc".to_vec());

        let extraction = extractor.extract(&source)?;
        assert_eq!(extraction.unit_count, 3);
        assert!(!extraction.is_blank());
        Ok(())
    }

    #[test]
    fn whitespace_only_text_is_blank() -> Result<(), ExtractionError> {
        let extractor = TextExtractor::new(ExtractionLimits::default());
        let source = DocumentSource::new("empty.txt", b"  \n\t ".to_vec());

        assert!(extractor.extract(&source)?.is_blank());
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_an_extraction_error() {
        let extractor = TextExtractor::new(ExtractionLimits::default());
        let source = DocumentSource::new("bad.txt", vec![0xff, 0xfe, 0xfd]);

        let result = extractor.extract(&source);
        assert!(matches!(result, Err(ExtractionError::InvalidUtf8 { .. })));
    }

    #[test]
    fn corrupt_pdf_is_an_extraction_error() {
        let extractor = TextExtractor::new(ExtractionLimits::default());
        let source = DocumentSource::new("broken.pdf", b"%PDF-1.4\n%broken".to_vec());

        let result = extractor.extract(&source);
        assert!(matches!(result, Err(ExtractionError::PdfParse { .. })));
    }

    #[test]
    fn lopdf_reads_generated_pages_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = build_pdf(&["Fever and cough", "Headache"])?;
        let read = LopdfExtractor.extract_pages("generated.pdf", &bytes, Some(1))?;

        assert_eq!(read.total_pages, 2);
        assert_eq!(read.pages_read, 1);
        assert_eq!(read.pages.len(), 1);
        assert!(read.pages[0].text.contains("Fever"));
        Ok(())
    }

    #[test]
    fn truncate_chars_leaves_short_text_alone() {
        let mut text = "short".to_string();
        assert!(!truncate_chars(&mut text, 10));
        assert_eq!(text, "short");
    }
}
