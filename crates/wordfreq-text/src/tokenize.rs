use std::iter::Peekable;

use unicode_segmentation::{Graphemes, UnicodeSegmentation};
use wordfreq_types::TokenizerOptions;

/// Lazy word tokens over normalized text, in left-to-right order.
///
/// Iterates extended grapheme clusters so that a letter carrying an
/// uncomposed combining mark is seen as one (rejected) character.
pub struct Tokens<'a> {
    graphemes: Peekable<Graphemes<'a>>,
    options: TokenizerOptions,
    current: String,
}

pub fn tokenize(text: &str, options: TokenizerOptions) -> Tokens<'_> {
    Tokens {
        graphemes: text.graphemes(true).peekable(),
        options,
        current: String::new(),
    }
}

impl Tokens<'_> {
    fn flush(&mut self) -> Option<String> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

impl Iterator for Tokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some(cluster) = self.graphemes.next() {
            if is_hyphen(cluster) {
                if let Some(token) = self.flush() {
                    return Some(token);
                }
                continue;
            }

            if cluster == "'" {
                if !self.options.keep_internal_apostrophes {
                    // Dropped in place: "don't" counts as "dont".
                    continue;
                }
                let options = self.options;
                let next_is_token = self
                    .graphemes
                    .peek()
                    .is_some_and(|next| is_token_char(next, &options));
                if !self.current.is_empty() && next_is_token {
                    self.current.push('\'');
                    continue;
                }
                if let Some(token) = self.flush() {
                    return Some(token);
                }
                continue;
            }

            if is_token_char(cluster, &self.options) {
                self.current.push_str(cluster);
            } else if let Some(token) = self.flush() {
                return Some(token);
            }
        }
        self.flush()
    }
}

fn is_hyphen(cluster: &str) -> bool {
    matches!(
        cluster,
        "-" | "\u{2010}" | "\u{2011}" | "\u{2012}" | "\u{2013}" | "\u{2014}" | "\u{2015}"
    )
}

/// Whether a single cluster may be part of a word under `options`.
pub fn is_token_char(cluster: &str, options: &TokenizerOptions) -> bool {
    let mut chars = cluster.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return false;
    };
    if c.is_alphabetic() {
        return options.allow_non_latin_letters || is_latin_letter(c);
    }
    options.include_numbers && c.is_numeric()
}

/// Latin-script block coverage for Western text.
pub fn is_latin_letter(c: char) -> bool {
    matches!(
        u32::from(c),
        0x0041..=0x007A
            | 0x00C0..=0x00FF
            | 0x0100..=0x017F
            | 0x0180..=0x024F
            | 0x1E00..=0x1EFF
            | 0x2C60..=0x2C7F
            | 0xA720..=0xA7FF
            | 0xAB30..=0xAB6F
    )
}
