//! Loaded-text previews and the non-Latin script advisory.
//!
//! Neither affects analysis results; they exist so a front end can show
//! what was decoded and hint when the Latin-only default will discard most
//! of a document.

use crate::tokenize::is_latin_letter;

pub const COMPACT_PREVIEW_LINES: usize = 40;
pub const COMPACT_PREVIEW_CHARS: usize = 4_000;
pub const FULL_PREVIEW_LINES: usize = 120;
pub const FULL_PREVIEW_CHARS: usize = 12_000;
pub const DEBUG_PREVIEW_CHARS: usize = 300;

const ADVISORY_SAMPLE_LETTERS: usize = 2_000;
const ADVISORY_MIN_LETTERS: usize = 30;
const ADVISORY_NON_LATIN_RATIO: f64 = 0.70;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PreviewData {
    pub compact: String,
    pub full: String,
    /// Single-line excerpt; newlines flattened to spaces.
    pub debug: String,
    pub loaded_chars: usize,
}

pub fn build_preview(text: &str) -> PreviewData {
    PreviewData {
        compact: excerpt(text, COMPACT_PREVIEW_LINES, COMPACT_PREVIEW_CHARS),
        full: excerpt(text, FULL_PREVIEW_LINES, FULL_PREVIEW_CHARS),
        debug: text
            .chars()
            .take(DEBUG_PREVIEW_CHARS)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect(),
        loaded_chars: text.chars().count(),
    }
}

/// First `max_lines` lines, then capped at `max_chars` characters.
fn excerpt(text: &str, max_lines: usize, max_chars: usize) -> String {
    let mut out = String::new();
    let mut chars = 0usize;
    for (idx, line) in text.split('\n').take(max_lines).enumerate() {
        if idx > 0 {
            if chars == max_chars {
                break;
            }
            out.push('\n');
            chars += 1;
        }
        for c in line.chars() {
            if chars == max_chars {
                return out;
            }
            out.push(c);
            chars += 1;
        }
    }
    out
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScriptAdvisory {
    pub sampled_letters: usize,
    pub non_latin_letters: usize,
}

impl ScriptAdvisory {
    pub fn ratio(&self) -> f64 {
        self.non_latin_letters as f64 / self.sampled_letters as f64
    }

    pub fn message(&self) -> String {
        format!(
            "{:.0}% of sampled letters are outside the Latin script. Enable non-Latin letters to count them.",
            self.ratio() * 100.0
        )
    }
}

/// Suggest enabling non-Latin letters when they dominate the opening text.
pub fn script_advisory(text: &str) -> Option<ScriptAdvisory> {
    let mut sampled = 0usize;
    let mut non_latin = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()).take(ADVISORY_SAMPLE_LETTERS) {
        sampled += 1;
        if !is_latin_letter(c) {
            non_latin += 1;
        }
    }
    if sampled < ADVISORY_MIN_LETTERS {
        return None;
    }
    let advisory = ScriptAdvisory {
        sampled_letters: sampled,
        non_latin_letters: non_latin,
    };
    (advisory.ratio() >= ADVISORY_NON_LATIN_RATIO).then_some(advisory)
}
