//! Text extraction for submitted documents (PDF, DOCX, plain text).
//!
//! The intake handler downloads a document to a temporary file and hands the
//! path here together with the [`DocumentFormat`] derived from its name. The
//! result is plain UTF-8 text; deciding whether that text is usable (non-empty)
//! is the caller's job.
//!
//! PDF and DOCX support are cargo features (`pdf`, `docx`, both on by
//! default) and can additionally be switched off in `[extraction]`. The
//! resulting [`Capabilities`] are fixed at startup; asking for a format that
//! is not available fails fast with [`ExtractError::DependencyMissing`].

use encoding_rs::Encoding;
use std::path::Path;

use crate::config::ExtractionConfig;

/// Maximum decompressed bytes to read from `word/document.xml` (zip-bomb protection).
#[cfg(feature = "docx")]
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[cfg(feature = "docx")]
const DOCX_BODY: &str = "word/document.xml";

/// A supported document format, derived from the file name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

impl DocumentFormat {
    /// Case-insensitive match on the file name's last suffix.
    ///
    /// `report.PDF` is a PDF; `notes.rtf`, `image.png` and `README` are `None`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// Suffix including the dot, used for temporary file names.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Docx => ".docx",
            Self::Text => ".txt",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Text => "TXT",
        };
        f.write_str(name)
    }
}

/// Which extractors this process can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub pdf: bool,
    pub docx: bool,
}

impl Capabilities {
    /// Extractors compiled into this binary.
    pub fn compiled() -> Self {
        Self {
            pdf: cfg!(feature = "pdf"),
            docx: cfg!(feature = "docx"),
        }
    }

    /// Compiled extractors, minus those switched off in config.
    pub fn detect(config: &ExtractionConfig) -> Self {
        let compiled = Self::compiled();
        Self {
            pdf: compiled.pdf && config.pdf,
            docx: compiled.docx && config.docx,
        }
    }

    pub fn supports(&self, format: DocumentFormat) -> bool {
        match format {
            DocumentFormat::Pdf => self.pdf,
            DocumentFormat::Docx => self.docx,
            DocumentFormat::Text => true,
        }
    }
}

/// Extraction error. Every variant is reported to the user.
#[derive(Debug)]
pub enum ExtractError {
    /// None of the candidate encodings decoded the text file.
    EncodingUnresolved,
    /// The extractor for this format is not available in this process.
    DependencyMissing(DocumentFormat),
    Pdf(String),
    Ooxml(String),
    Io(std::io::Error),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::EncodingUnresolved => {
                write!(f, "could not determine the text encoding of the file")
            }
            ExtractError::DependencyMissing(format) => {
                write!(f, "{} support is not available on this server", format)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "DOCX extraction failed: {}", e),
            ExtractError::Io(e) => write!(f, "could not read the downloaded file: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Extract the text of the file at `path`.
///
/// PDF and DOCX parsing runs on the blocking pool; a panic inside a parser
/// surfaces as an extraction error rather than taking the task down.
pub async fn extract_file(
    path: &Path,
    format: DocumentFormat,
    capabilities: Capabilities,
) -> Result<String, ExtractError> {
    if !capabilities.supports(format) {
        return Err(ExtractError::DependencyMissing(format));
    }

    let bytes = tokio::fs::read(path).await.map_err(ExtractError::Io)?;

    match format {
        DocumentFormat::Text => decode_text(&bytes),
        DocumentFormat::Pdf | DocumentFormat::Docx => {
            tokio::task::spawn_blocking(move || extract_bytes(&bytes, format))
                .await
                .map_err(|e| match format {
                    DocumentFormat::Docx => ExtractError::Ooxml(format!("extractor crashed: {}", e)),
                    _ => ExtractError::Pdf(format!("extractor crashed: {}", e)),
                })?
        }
    }
}

/// Extract text from in-memory bytes, synchronously.
pub fn extract_bytes(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Text => decode_text(bytes),
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Plain text
// ═══════════════════════════════════════════════════════════════════════

/// Candidate encodings for `.txt` files, tried in order.
///
/// UTF-8 first, then the legacy Cyrillic and Western code pages students'
/// editors still produce. `latin1` resolves to windows-1252 per WHATWG.
pub fn text_encodings() -> [&'static Encoding; 4] {
    [
        encoding_rs::UTF_8,
        encoding_rs::WINDOWS_1251,
        encoding_rs::WINDOWS_1252,
        encoding_rs::IBM866,
    ]
}

/// Decode with the first encoding that accepts every byte.
pub fn decode_text(bytes: &[u8]) -> Result<String, ExtractError> {
    for encoding in text_encodings() {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            tracing::debug!(encoding = encoding.name(), "decoded plain text");
            return Ok(text.into_owned());
        }
    }
    Err(ExtractError::EncodingUnresolved)
}

// ═══════════════════════════════════════════════════════════════════════
// PDF
// ═══════════════════════════════════════════════════════════════════════

#[cfg(feature = "pdf")]
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    tracing::debug!(pages = pages.len(), "PDF text extraction complete");
    Ok(join_pdf_pages(pages))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_bytes: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::DependencyMissing(DocumentFormat::Pdf))
}

/// Concatenate page texts under `--- Page N ---` headers.
///
/// Blank pages are skipped but still counted, so N is always the page's
/// 1-based position in the document.
pub fn join_pdf_pages<I>(pages: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out = String::new();
    for (index, page) in pages.into_iter().enumerate() {
        let text = page.as_ref();
        if text.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("--- Page {} ---\n{}\n\n", index + 1, text));
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
// DOCX
// ═══════════════════════════════════════════════════════════════════════

#[cfg(feature = "docx")]
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name(DOCX_BODY)
        .map_err(|_| ExtractError::Ooxml(format!("{} not found", DOCX_BODY)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "{} exceeds size limit ({} bytes)",
            DOCX_BODY, MAX_XML_ENTRY_BYTES
        )));
    }

    paragraph_text(&xml)
}

#[cfg(not(feature = "docx"))]
fn extract_docx(_bytes: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::DependencyMissing(DocumentFormat::Docx))
}

/// Collect `w:t` runs, one line per paragraph.
#[cfg(feature = "docx")]
fn paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    // Tab stops inside paragraph properties are layout, not content.
    let mut in_props = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"pPr" => in_props = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"pPr" => in_props = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" if !in_props => out.push('\t'),
                b"br" | b"cr" | b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
