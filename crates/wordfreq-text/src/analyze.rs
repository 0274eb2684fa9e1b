use std::cmp::Ordering;
use std::collections::HashMap;

use wordfreq_types::{AnalysisOptions, WordCount};

use crate::normalize::normalize;
use crate::stopwords::StopwordSet;
use crate::tokenize::tokenize;

/// How many leading tokens are kept for diagnostics.
pub const SAMPLE_TOKENS: usize = 25;

/// Counters gathered while aggregating, for diagnostics only.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AnalysisStats {
    /// Every token the tokenizer produced.
    pub tokens: usize,
    pub skipped_short: usize,
    pub skipped_stopwords: usize,
    pub distinct_words: usize,
    /// The first [`SAMPLE_TOKENS`] tokens, in text order.
    pub sample_tokens: Vec<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Analysis {
    pub results: Vec<WordCount>,
    pub stats: AnalysisStats,
}

/// Rank the words of `text` by frequency.
///
/// Tokens shorter than `min_word_length` characters or present in
/// `stopwords` are skipped. Ties are broken by codepoint order of the word.
pub fn analyze(text: &str, stopwords: &StopwordSet, options: &AnalysisOptions) -> Vec<WordCount> {
    analyze_detailed(text, stopwords, options).results
}

pub fn analyze_detailed(
    text: &str,
    stopwords: &StopwordSet,
    options: &AnalysisOptions,
) -> Analysis {
    let normalized = normalize(text);
    let mut counter = FrequencyCounter::new(stopwords, options.min_word_length);
    for token in tokenize(&normalized, options.tokenizer()) {
        counter.observe(token);
    }
    counter.finish(options.top_n)
}

/// Incremental word counter; lets a caller interleave its own checks
/// between tokens.
pub struct FrequencyCounter<'a> {
    stopwords: &'a StopwordSet,
    min_word_length: usize,
    counts: HashMap<String, usize>,
    stats: AnalysisStats,
}

impl<'a> FrequencyCounter<'a> {
    pub fn new(stopwords: &'a StopwordSet, min_word_length: usize) -> Self {
        Self {
            stopwords,
            min_word_length,
            counts: HashMap::new(),
            stats: AnalysisStats::default(),
        }
    }

    pub fn observe(&mut self, token: String) {
        self.stats.tokens += 1;
        if self.stats.sample_tokens.len() < SAMPLE_TOKENS {
            self.stats.sample_tokens.push(token.clone());
        }
        if token.chars().count() < self.min_word_length {
            self.stats.skipped_short += 1;
            return;
        }
        if self.stopwords.contains(&token) {
            self.stats.skipped_stopwords += 1;
            return;
        }
        *self.counts.entry(token).or_insert(0) += 1;
    }

    pub fn tokens_seen(&self) -> usize {
        self.stats.tokens
    }

    pub fn finish(mut self, top_n: usize) -> Analysis {
        self.stats.distinct_words = self.counts.len();
        Analysis {
            results: rank(self.counts, top_n),
            stats: self.stats,
        }
    }
}

/// Count descending, then word ascending; keeps at most `top_n` rows.
pub fn rank(counts: HashMap<String, usize>, top_n: usize) -> Vec<WordCount> {
    if top_n == 0 {
        return Vec::new();
    }
    let mut rows: Vec<WordCount> = counts
        .into_iter()
        .map(|(word, count)| WordCount { word, count })
        .collect();
    rows.sort_unstable_by(compare_rows);
    rows.truncate(top_n);
    rows
}

fn compare_rows(a: &WordCount, b: &WordCount) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word))
}
