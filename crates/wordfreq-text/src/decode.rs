use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::Path;

use encoding_rs::{Encoding, MACINTOSH, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use thiserror::Error;
use tracing::debug;

/// Hard ceiling on document size, checked before any decoding.
pub const MAX_FILE_BYTES: u64 = 20 * 1_048_576;

const MAX_REPLACEMENT_RATIO: f64 = 0.02;
const MAX_NUL_RATIO: f64 = 0.02;
const MIN_UTF16_ZERO_RATIO: f64 = 0.10;
const SUSPICIOUS_UPPER_RATIO: f64 = 0.70;
const EXPECTED_LOWER_RATIO: f64 = 0.50;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16BE_BOM: &[u8] = &[0xFE, 0xFF];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Could not read {filename} using common encodings.")]
    UnreadableFile { filename: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Unsupported file type. Please choose a .txt file.")]
    UnsupportedFileType,
    #[error(
        "File is {} MB. WordFreq supports up to {} MB.",
        megabytes(.size),
        megabytes(.limit)
    )]
    FileTooLarge { size: u64, limit: u64 },
    #[error(transparent)]
    Unreadable(#[from] DecodeError),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

fn megabytes(bytes: &u64) -> String {
    format!("{:.1}", *bytes as f64 / 1_048_576.0)
}

/// User-facing message for a document that exceeds `limit_bytes`.
pub fn file_too_large_message(size_bytes: u64, limit_bytes: u64) -> String {
    LoadError::FileTooLarge {
        size: size_bytes,
        limit: limit_bytes,
    }
    .to_string()
}

/// Raw bytes handed over by whatever selected the file.
#[derive(Clone, Debug)]
pub struct RawDocument {
    bytes: Vec<u8>,
    filename: Option<String>,
}

impl RawDocument {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Name used in error messages.
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("document")
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encodings tried by [`decode`], in priority order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Candidate {
    Utf8,
    /// UTF-16 with the byte order taken from a leading BOM.
    Utf16Bom,
    Utf16Le,
    Utf16Be,
    MacRoman,
    Latin1,
    Windows1252,
}

pub const CANDIDATES: [Candidate; 7] = [
    Candidate::Utf8,
    Candidate::Utf16Bom,
    Candidate::Utf16Le,
    Candidate::Utf16Be,
    Candidate::MacRoman,
    Candidate::Latin1,
    Candidate::Windows1252,
];

impl Candidate {
    pub fn name(self) -> &'static str {
        match self {
            Candidate::Utf8 => "utf-8",
            Candidate::Utf16Bom => "utf-16",
            Candidate::Utf16Le => "utf-16le",
            Candidate::Utf16Be => "utf-16be",
            Candidate::MacRoman => "macintosh",
            Candidate::Latin1 => "iso-8859-1",
            Candidate::Windows1252 => "windows-1252",
        }
    }

    /// Cheap byte-level screen applied before decoding.
    fn bytes_plausible(self, bytes: &[u8]) -> bool {
        match self {
            Candidate::Utf16Bom => utf16_bom(bytes).is_some(),
            Candidate::Utf16Le => {
                bytes.starts_with(UTF16LE_BOM)
                    || high_byte_zero_ratio(bytes, 1) >= MIN_UTF16_ZERO_RATIO
            }
            Candidate::Utf16Be => {
                bytes.starts_with(UTF16BE_BOM)
                    || high_byte_zero_ratio(bytes, 0) >= MIN_UTF16_ZERO_RATIO
            }
            // These bytes are smart punctuation in Windows-1252 but letters
            // and symbols in MacRoman.
            Candidate::MacRoman => !bytes.iter().any(|&b| is_cp1252_punctuation(b)),
            Candidate::Utf8 | Candidate::Latin1 | Candidate::Windows1252 => true,
        }
    }

    /// Strict decode; `None` on any malformed sequence.
    fn decode(self, bytes: &[u8]) -> Option<Cow<'_, str>> {
        match self {
            Candidate::Utf8 => strict(UTF_8, bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)),
            Candidate::Utf16Bom => {
                let (encoding, bom_len) = utf16_bom(bytes)?;
                strict(encoding, &bytes[bom_len..])
            }
            Candidate::Utf16Le => strict(
                UTF_16LE,
                bytes.strip_prefix(UTF16LE_BOM).unwrap_or(bytes),
            ),
            Candidate::Utf16Be => strict(
                UTF_16BE,
                bytes.strip_prefix(UTF16BE_BOM).unwrap_or(bytes),
            ),
            Candidate::MacRoman => strict(MACINTOSH, bytes),
            Candidate::Latin1 => Some(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())),
            Candidate::Windows1252 => strict(WINDOWS_1252, bytes),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn strict<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    encoding.decode_without_bom_handling_and_without_replacement(bytes)
}

fn utf16_bom(bytes: &[u8]) -> Option<(&'static Encoding, usize)> {
    match Encoding::for_bom(bytes) {
        Some((encoding, len)) if encoding == UTF_16LE || encoding == UTF_16BE => {
            Some((encoding, len))
        }
        _ => None,
    }
}

/// Share of all bytes that are zero and sit at `offset`, `offset + 2`, ...
///
/// ASCII text in UTF-16 puts a zero in every high byte: odd offsets for
/// little-endian, even offsets for big-endian.
fn high_byte_zero_ratio(bytes: &[u8], offset: usize) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let zeros = bytes
        .iter()
        .skip(offset)
        .step_by(2)
        .filter(|&&b| b == 0)
        .count();
    zeros as f64 / bytes.len() as f64
}

fn is_cp1252_punctuation(b: u8) -> bool {
    matches!(b, 0x80 | 0x82..=0x87 | 0x89 | 0x8B | 0x91..=0x97 | 0x99 | 0x9B)
}

#[derive(Debug, Default, Clone, Copy)]
struct TextStats {
    chars: usize,
    replacement: usize,
    nul: usize,
    disallowed_control: usize,
    alphabetic: usize,
    lowercase: usize,
    non_ascii_alphabetic: usize,
    non_ascii_uppercase: usize,
}

impl TextStats {
    fn collect(text: &str) -> Self {
        let mut stats = Self::default();
        for c in text.chars() {
            stats.chars += 1;
            match c {
                '\u{FFFD}' => stats.replacement += 1,
                '\0' => stats.nul += 1,
                _ => {}
            }
            if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
                stats.disallowed_control += 1;
            }
            if c.is_alphabetic() {
                stats.alphabetic += 1;
                if c.is_lowercase() {
                    stats.lowercase += 1;
                }
                if !c.is_ascii() {
                    stats.non_ascii_alphabetic += 1;
                    if c.is_uppercase() {
                        stats.non_ascii_uppercase += 1;
                    }
                }
            }
        }
        stats
    }

    fn ratio(part: usize, whole: usize) -> f64 {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64
        }
    }

    /// A single-byte decode of UTF-8-era text tends to turn accented lowercase
    /// letters into stray uppercase ones inside otherwise lowercase prose.
    fn suspicious_uppercase(&self) -> bool {
        self.non_ascii_alphabetic >= 2
            && Self::ratio(self.non_ascii_uppercase, self.non_ascii_alphabetic)
                > SUSPICIOUS_UPPER_RATIO
            && Self::ratio(self.lowercase, self.alphabetic) > EXPECTED_LOWER_RATIO
    }

    fn plausible(&self) -> bool {
        Self::ratio(self.replacement, self.chars) < MAX_REPLACEMENT_RATIO
            && Self::ratio(self.nul, self.chars) < MAX_NUL_RATIO
            && self.disallowed_control == 0
            && !self.suspicious_uppercase()
    }
}

/// Latin-1 lowercase accents (0xE0-0xFF) land on MacRoman symbols and
/// uppercase letters: "schön" reads as "schˆn", "café" as "cafÈ". Genuine
/// MacRoman prose keeps lowercase accents lowercase, so a non-ASCII
/// uppercase letter right after a lowercase one, or a non-ASCII symbol
/// wedged between two letters, marks the decode as wrong.
fn misplaced_macroman_chars(text: &str) -> bool {
    let mut prev = ' ';
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if !c.is_ascii() {
            if prev.is_lowercase() && c.is_uppercase() {
                return true;
            }
            let next_is_letter = chars.peek().is_some_and(|next| next.is_alphabetic());
            if prev.is_alphabetic() && next_is_letter && is_in_word_symbol(c) {
                return true;
            }
        }
        prev = c;
    }
    false
}

/// Non-letter characters that do not belong inside a word. Quotes,
/// dashes and ellipses are left out: "don’t" is ordinary MacRoman text.
fn is_in_word_symbol(c: char) -> bool {
    !c.is_lowercase()
        && !c.is_uppercase()
        && !c.is_whitespace()
        && !matches!(c, '\u{2013}' | '\u{2014}' | '\u{2018}'..='\u{201F}' | '\u{2022}' | '\u{2026}')
}

/// Text plus the encoding it was decoded with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decoded {
    pub text: String,
    pub encoding: Candidate,
}

/// Decode `bytes` with the first plausible candidate encoding.
///
/// Line endings in the result are always `\n`.
pub fn decode(bytes: &[u8], filename: &str) -> Result<String, DecodeError> {
    decode_detailed(bytes, filename).map(|decoded| decoded.text)
}

/// Like [`decode`], also reporting which encoding was accepted.
pub fn decode_detailed(bytes: &[u8], filename: &str) -> Result<Decoded, DecodeError> {
    for candidate in CANDIDATES {
        if !candidate.bytes_plausible(bytes) {
            debug!("{filename}: {candidate} rejected by byte screen");
            continue;
        }
        let Some(text) = candidate.decode(bytes) else {
            debug!("{filename}: {candidate} decode failed");
            continue;
        };
        let stats = TextStats::collect(&text);
        if !stats.plausible() {
            debug!("{filename}: {candidate} rejected by text screen ({stats:?})");
            continue;
        }
        if candidate == Candidate::MacRoman && misplaced_macroman_chars(&text) {
            debug!("{filename}: {candidate} rejected by in-word symbol screen");
            continue;
        }
        debug!("{filename}: decoded as {candidate}");
        return Ok(Decoded {
            text: normalize_line_endings(&text),
            encoding: candidate,
        });
    }
    Err(DecodeError::UnreadableFile {
        filename: filename.to_string(),
    })
}

/// Decode an in-memory document after enforcing [`MAX_FILE_BYTES`].
pub fn decode_document(document: &RawDocument) -> Result<Decoded, LoadError> {
    check_size(document.len(), MAX_FILE_BYTES)?;
    Ok(decode_detailed(document.bytes(), document.display_name())?)
}

/// Read and decode a text file from disk.
///
/// With `require_txt_extension` the path must end in `.txt` (any case).
/// The size ceiling is checked from metadata before the file is read.
pub fn load_text(path: impl AsRef<Path>, require_txt_extension: bool) -> Result<String, LoadError> {
    let path = path.as_ref();
    if require_txt_extension && !has_txt_extension(path) {
        return Err(LoadError::UnsupportedFileType);
    }

    check_size(fs::metadata(path)?.len(), MAX_FILE_BYTES)?;
    let bytes = fs::read(path)?;
    check_size(bytes.len() as u64, MAX_FILE_BYTES)?;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(decode(&bytes, &filename)?)
}

pub fn check_size(size: u64, limit: u64) -> Result<(), LoadError> {
    if size > limit {
        return Err(LoadError::FileTooLarge { size, limit });
    }
    Ok(())
}

/// True when `path` ends in `.txt`, case-insensitively.
pub fn has_txt_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}

fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}
