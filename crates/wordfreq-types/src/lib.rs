//! Shared records passed between the word frequency pipeline and its callers.
//!
//! [`AnalysisOptions`] is the configuration a caller hands to the analyzer,
//! [`TokenizerOptions`] is the subset the tokenizer cares about, and
//! [`WordCount`] is one row of a ranked result.
//!
//! Numeric options have fixed valid ranges ([`TOP_N_RANGE`],
//! [`MIN_WORD_LENGTH_RANGE`]); callers clamp with [`AnalysisOptions::clamped`]
//! before running an analysis.
//!
//! ```rust
//! use wordfreq_types::AnalysisOptions;
//!
//! let opts = AnalysisOptions {
//!     top_n: 0,
//!     min_word_length: 500,
//!     ..AnalysisOptions::default()
//! }
//! .clamped();
//! assert_eq!(opts.top_n, 1);
//! assert_eq!(opts.min_word_length, 50);
//! ```

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Valid range for [`AnalysisOptions::top_n`].
pub const TOP_N_RANGE: RangeInclusive<usize> = 1..=10_000;
/// Valid range for [`AnalysisOptions::min_word_length`].
pub const MIN_WORD_LENGTH_RANGE: RangeInclusive<usize> = 1..=50;

pub const DEFAULT_TOP_N: usize = 100;
pub const DEFAULT_MIN_WORD_LENGTH: usize = 2;

/// Configuration for a single analysis pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Maximum number of ranked rows returned.
    pub top_n: usize,
    /// Tokens with fewer characters than this are not counted.
    pub min_word_length: usize,
    pub keep_internal_apostrophes: bool,
    pub include_numbers: bool,
    pub allow_non_latin_letters: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            min_word_length: DEFAULT_MIN_WORD_LENGTH,
            keep_internal_apostrophes: false,
            include_numbers: false,
            allow_non_latin_letters: false,
        }
    }
}

impl AnalysisOptions {
    /// Clamp numeric fields into [`TOP_N_RANGE`] and [`MIN_WORD_LENGTH_RANGE`].
    pub fn clamped(self) -> Self {
        Self {
            top_n: clamp_to(self.top_n, &TOP_N_RANGE),
            min_word_length: clamp_to(self.min_word_length, &MIN_WORD_LENGTH_RANGE),
            ..self
        }
    }

    /// The switches that drive tokenization.
    pub fn tokenizer(&self) -> TokenizerOptions {
        TokenizerOptions {
            keep_internal_apostrophes: self.keep_internal_apostrophes,
            include_numbers: self.include_numbers,
            allow_non_latin_letters: self.allow_non_latin_letters,
        }
    }
}

fn clamp_to(value: usize, range: &RangeInclusive<usize>) -> usize {
    value.clamp(*range.start(), *range.end())
}

/// Character-class switches for the tokenizer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TokenizerOptions {
    /// Keep `'` when it sits between two token characters (`don't`).
    pub keep_internal_apostrophes: bool,
    /// Treat characters with a numeric type as token characters.
    pub include_numbers: bool,
    /// Accept alphabetic characters outside the Latin script blocks.
    pub allow_non_latin_letters: bool,
}

/// One ranked row: a distinct word and how often it occurred.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

impl WordCount {
    pub fn new(word: impl Into<String>, count: usize) -> Self {
        Self {
            word: word.into(),
            count,
        }
    }
}
