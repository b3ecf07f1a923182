//! Turns an uploaded file into something the model can read.
//!
//! DOCX and text files always become plain text. Images always go to the model
//! as raw bytes. PDFs go through a sparse-text check: when the text layer
//! averages fewer than `scanned_pdf_threshold` characters per page the file is
//! probably a scan, so the original bytes are sent for vision instead.
//!
//! The check is a heuristic. Image-heavy PDFs with short captions, or scans
//! carrying an OCR layer, can land on the wrong side of it.

use std::path::Path;

use docx_rs::{DocumentChild, Paragraph, ParagraphChild, Run, RunChild};
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::error::LoaderError;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const PNG_MEDIA_TYPE: &str = "image/png";
pub const JPEG_MEDIA_TYPE: &str = "image/jpeg";

/// Content handed to the model, either extracted text or an opaque binary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPayload {
    Text(String),
    Binary {
        bytes: Vec<u8>,
        media_type: &'static str,
    },
}

impl DocumentPayload {
    pub fn is_text(&self) -> bool {
        matches!(self, DocumentPayload::Text(_))
    }

    pub fn media_type(&self) -> Option<&'static str> {
        match self {
            DocumentPayload::Text(_) => None,
            DocumentPayload::Binary { media_type, .. } => Some(media_type),
        }
    }

    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match self {
            DocumentPayload::Text(text) => format!("text ({} chars)", text.chars().count()),
            DocumentPayload::Binary { bytes, media_type } => {
                format!("{} ({} bytes)", media_type, bytes.len())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Docx,
    Pdf,
    Png,
    Jpeg,
    Text,
}

impl DocumentKind {
    /// Classifies a path by its extension, case-insensitively. Touches no files.
    pub fn from_path(path: &Path) -> Result<Self, LoaderError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "docx" => Ok(DocumentKind::Docx),
            "pdf" => Ok(DocumentKind::Pdf),
            "png" => Ok(DocumentKind::Png),
            "jpg" | "jpeg" => Ok(DocumentKind::Jpeg),
            "txt" => Ok(DocumentKind::Text),
            _ => Err(LoaderError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    String::new()
                } else {
                    format!(".{}", extension)
                },
            }),
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, DocumentKind::Png | DocumentKind::Jpeg)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmartLoader {
    config: LoaderConfig,
}

impl SmartLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Routes a file to the matching loader.
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<DocumentPayload, LoaderError> {
        let path = path.as_ref();
        let kind = DocumentKind::from_path(path)?;

        if !path.exists() {
            return Err(LoaderError::NotFound {
                path: path.to_path_buf(),
            });
        }

        debug!(path = %path.display(), ?kind, "Loading document");

        match kind {
            DocumentKind::Docx => load_docx(path).map(DocumentPayload::Text),
            DocumentKind::Pdf => self.load_pdf(path),
            DocumentKind::Png | DocumentKind::Jpeg => load_image(path, kind),
            DocumentKind::Text => load_text(path).map(DocumentPayload::Text),
        }
    }

    /// Text layer first; raw bytes when the text is too sparse to be the real content.
    pub fn load_pdf(&self, path: &Path) -> Result<DocumentPayload, LoaderError> {
        let document = lopdf::Document::load(path).map_err(|e| LoaderError::decode(path, e))?;
        let pages = document.get_pages();
        let page_count = pages.len();

        let mut text = String::new();
        for &page_number in pages.keys() {
            match document.extract_text(&[page_number]) {
                Ok(extracted) if !extracted.is_empty() => {
                    text.push_str(&extracted);
                    text.push('\n');
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(page = page_number, error = %e, "No text layer on page");
                }
            }
        }

        let file_name = file_name(path);
        let char_count = text.chars().count();
        // Saturate so an oversized threshold still means "always scanned".
        let required = self.config.scanned_pdf_threshold.saturating_mul(page_count);
        if char_count < required {
            info!(
                file = %file_name,
                pages = page_count,
                chars = char_count,
                "PDF appears scanned, sending raw bytes for vision"
            );
            let bytes = read_bytes(path)?;
            return Ok(DocumentPayload::Binary {
                bytes,
                media_type: PDF_MEDIA_TYPE,
            });
        }

        info!(file = %file_name, pages = page_count, chars = char_count, "PDF processed as text");
        Ok(DocumentPayload::Text(text))
    }
}

/// Paragraph texts of the document body, newline-joined in document order.
///
/// Only top-level paragraphs count; tables, content controls and text boxes
/// are skipped.
pub fn load_docx(path: &Path) -> Result<String, LoaderError> {
    let bytes = read_bytes(path)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| LoaderError::decode(path, e.to_string()))?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
            _ => None,
        })
        .collect();

    debug!(file = %file_name(path), paragraphs = paragraphs.len(), "DOCX extracted");
    Ok(paragraphs.join("\n"))
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        match child {
            ParagraphChild::Run(run) => push_run(run, &mut text),
            ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let ParagraphChild::Run(run) = inner {
                        push_run(run, &mut text);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn push_run(run: &Run, output: &mut String) {
    for child in &run.children {
        match child {
            RunChild::Text(t) => output.push_str(&t.text),
            RunChild::Tab(_) => output.push('\t'),
            RunChild::Break(_) => output.push('\n'),
            _ => {}
        }
    }
}

/// Fully decodes the image before handing its bytes over, so a truncated or
/// corrupt file never reaches the model.
pub fn load_image(path: &Path, kind: DocumentKind) -> Result<DocumentPayload, LoaderError> {
    let bytes = read_bytes(path)?;
    image::load_from_memory(&bytes).map_err(|e| {
        warn!(file = %file_name(path), error = %e, "Image verification failed");
        LoaderError::decode(path, e)
    })?;

    let media_type = match kind {
        DocumentKind::Png => PNG_MEDIA_TYPE,
        _ => JPEG_MEDIA_TYPE,
    };

    Ok(DocumentPayload::Binary { bytes, media_type })
}

pub fn load_text(path: &Path) -> Result<String, LoaderError> {
    std::fs::read_to_string(path).map_err(|e| io_error(path, e))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoaderError> {
    std::fs::read(path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, e: std::io::Error) -> LoaderError {
    if e.kind() == std::io::ErrorKind::NotFound {
        LoaderError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        LoaderError::decode(path, e)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use tempfile::TempDir;

    const LAB_LINE: &str = "Hemoglobin 13.5 g/dL (normal range 12.0 - 15.5) Glucose fasting 92 mg/dL";

    #[test]
    fn test_pdf_with_text_layer_returns_text() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(dir.path(), "report.pdf", &[LAB_LINE, LAB_LINE]);

        let payload = SmartLoader::default().process_file(&path).unwrap();
        match payload {
            DocumentPayload::Text(text) => assert!(text.contains("Hemoglobin")),
            other => panic!("expected text, got {}", other.describe()),
        }
    }

    #[test]
    fn test_blank_pdf_returns_raw_bytes() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(dir.path(), "scan.pdf", &["", "", ""]);
        let original = std::fs::read(&path).unwrap();

        let payload = SmartLoader::default().process_file(&path).unwrap();
        assert_eq!(
            payload,
            DocumentPayload::Binary {
                bytes: original,
                media_type: PDF_MEDIA_TYPE,
            }
        );
    }

    #[test]
    fn test_sparse_pdf_below_threshold_is_treated_as_scanned() {
        let dir = TempDir::new().unwrap();
        // One short caption spread over two pages is well under 50 chars/page.
        let path = write_pdf(dir.path(), "figure.pdf", &["Fig. 1", ""]);

        let payload = SmartLoader::default().process_file(&path).unwrap();
        assert_eq!(payload.media_type(), Some(PDF_MEDIA_TYPE));
    }

    #[test]
    fn test_threshold_is_configurable() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(dir.path(), "report.pdf", &[LAB_LINE]);

        let strict = SmartLoader::new(LoaderConfig {
            scanned_pdf_threshold: 10_000,
        });
        assert_eq!(
            strict.process_file(&path).unwrap().media_type(),
            Some(PDF_MEDIA_TYPE)
        );

        let lenient = SmartLoader::new(LoaderConfig {
            scanned_pdf_threshold: 0,
        });
        assert!(lenient.process_file(&path).unwrap().is_text());
    }

    #[test]
    fn test_huge_threshold_saturates_instead_of_overflowing() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(dir.path(), "report.pdf", &[LAB_LINE, LAB_LINE]);

        let loader = SmartLoader::new(LoaderConfig {
            scanned_pdf_threshold: usize::MAX / 2 + 1,
        });
        assert_eq!(
            loader.process_file(&path).unwrap().media_type(),
            Some(PDF_MEDIA_TYPE)
        );
    }

    #[test]
    fn test_corrupt_pdf_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf at all").unwrap();

        let err = SmartLoader::default().process_file(&path).unwrap_err();
        assert!(matches!(err, LoaderError::DecodeError { .. }), "got {err:?}");
    }

    #[test]
    fn test_docx_joins_paragraphs_in_order_keeping_empty_ones() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}<w:p/>{}<w:p><w:pPr/></w:p>{}",
            paragraph("Discharge Summary"),
            paragraph("Diagnosis: Type 2 diabetes"),
            paragraph("Follow up in 2 weeks")
        );
        let path = write_docx(dir.path(), "notes.docx", &body);

        let payload = SmartLoader::default().process_file(&path).unwrap();
        assert_eq!(
            payload,
            DocumentPayload::Text(
                "Discharge Summary\n\nDiagnosis: Type 2 diabetes\n\nFollow up in 2 weeks"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_docx_concatenates_runs_and_tabs() {
        let dir = TempDir::new().unwrap();
        let body = r#"<w:p><w:r><w:t>BP</w:t></w:r><w:r><w:t xml:space="preserve"> 120/80</w:t></w:r><w:r><w:tab/><w:t>normal</w:t></w:r></w:p>"#;
        let path = write_docx(dir.path(), "vitals.docx", body);

        let text = load_docx(&path).unwrap();
        assert_eq!(text, "BP 120/80\tnormal");
    }

    #[test]
    fn test_docx_tab_stops_add_no_text() {
        let dir = TempDir::new().unwrap();
        let body = r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/><w:tab w:val="right" w:pos="9000"/></w:tabs></w:pPr><w:r><w:t>Hemoglobin</w:t></w:r></w:p>"#;
        let path = write_docx(dir.path(), "tabs.docx", body);

        assert_eq!(load_docx(&path).unwrap(), "Hemoglobin");
    }

    #[test]
    fn test_docx_reads_hyperlink_text() {
        let dir = TempDir::new().unwrap();
        let body = r#"<w:p><w:r><w:t xml:space="preserve">See </w:t></w:r><w:hyperlink w:anchor="labs"><w:r><w:t>lab panel</w:t></w:r></w:hyperlink></w:p>"#;
        let path = write_docx(dir.path(), "link.docx", body);

        assert_eq!(load_docx(&path).unwrap(), "See lab panel");
    }

    #[test]
    fn test_docx_skips_table_paragraphs() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>{}",
            paragraph("Before"),
            paragraph("Cell"),
            paragraph("After")
        );
        let path = write_docx(dir.path(), "table.docx", &body);

        assert_eq!(load_docx(&path).unwrap(), "Before\nAfter");
    }

    #[test]
    fn test_docx_without_document_part_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.docx");
        std::fs::write(&path, b"PK but not really").unwrap();

        let err = SmartLoader::default().process_file(&path).unwrap_err();
        assert!(matches!(err, LoaderError::DecodeError { .. }));
    }

    #[test]
    fn test_docx_skips_content_control_paragraphs() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}<w:sdt><w:sdtPr/><w:sdtContent>{}</w:sdtContent></w:sdt>{}",
            paragraph("Patient: Jane Doe"),
            paragraph("Template field"),
            paragraph("Assessment: stable")
        );
        let path = write_docx(dir.path(), "form.docx", &body);

        assert_eq!(load_docx(&path).unwrap(), "Patient: Jane Doe\nAssessment: stable");
    }

    #[test]
    fn test_png_returns_bytes_with_png_media_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xray.PNG");
        let bytes = png_bytes();
        std::fs::write(&path, &bytes).unwrap();

        let payload = SmartLoader::default().process_file(&path).unwrap();
        assert_eq!(
            payload,
            DocumentPayload::Binary {
                bytes,
                media_type: PNG_MEDIA_TYPE,
            }
        );
    }

    #[test]
    fn test_jpeg_extensions_map_to_jpeg_media_type() {
        let dir = TempDir::new().unwrap();
        for name in ["scan.jpg", "scan.jpeg"] {
            let path = dir.path().join(name);
            std::fs::write(&path, jpeg_bytes()).unwrap();
            let payload = SmartLoader::default().process_file(&path).unwrap();
            assert_eq!(payload.media_type(), Some(JPEG_MEDIA_TYPE));
        }
    }

    #[test]
    fn test_corrupt_png_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        let mut bytes = png_bytes();
        bytes.truncate(bytes.len() / 2);
        std::fs::write(&path, &bytes).unwrap();

        let err = SmartLoader::default().process_file(&path).unwrap_err();
        assert!(matches!(err, LoaderError::DecodeError { .. }), "got {err:?}");
    }

    #[test]
    fn test_txt_returned_unmodified() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("symptoms.txt");
        let content = "  Headache for 3 days\r\nMild fever\n\n";
        std::fs::write(&path, content).unwrap();

        let payload = SmartLoader::default().process_file(&path).unwrap();
        assert_eq!(payload, DocumentPayload::Text(content.to_string()));
    }

    #[test]
    fn test_unsupported_extension_fails_before_io() {
        // The file does not exist, so NotFound would win if any I/O happened first.
        let err = SmartLoader::default()
            .process_file("/definitely/not/here/report.xyz")
            .unwrap_err();
        match err {
            LoaderError::UnsupportedFormat { extension } => assert_eq!(extension, ".xyz"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_extension_is_unsupported() {
        let err = SmartLoader::default().process_file("/tmp/README").unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.pdf");

        let err = SmartLoader::default().process_file(&path).unwrap_err();
        assert!(matches!(err, LoaderError::NotFound { .. }));
    }
}
