//! Word frequency analysis for plain-text documents of unknown encoding.
//!
//! The pipeline runs leaf-first:
//! 1. [`decode`] tries UTF-8, UTF-16 (BOM, LE, BE), MacRoman, Latin-1 and
//!    Windows-1252 in that order, screening each candidate at the byte level
//!    and again after decoding, and normalizes line endings to `\n`.
//! 2. [`normalize`] applies NFKC, lowercases and folds curly quotes.
//! 3. [`tokenize`] splits words: hyphens always separate, apostrophes are kept
//!    only inside words when asked, digits and non-Latin letters are opt-in.
//! 4. [`analyze`] drops short tokens and stopwords, counts, and ranks by count
//!    then word.
//!
//! [`run::Pipeline`] chains the stages for one document and checks a
//! [`run::RunToken`] between them so a superseded run stops early and
//! publishes nothing. [`session::transition`] is the state machine a front
//! end drives.
//!
//! # Example
//! ```rust
//! use wordfreq_text::{analyze, parse_stopwords};
//! use wordfreq_types::AnalysisOptions;
//!
//! let stopwords = parse_stopwords("the");
//! let rows = analyze(
//!     "apple apple apple\nbanana banana\norange\nthe the the",
//!     &stopwords,
//!     &AnalysisOptions::default(),
//! );
//! assert_eq!(rows[0].word, "apple");
//! assert_eq!(rows[0].count, 3);
//! assert_eq!(rows.len(), 3);
//! ```
//!
//! For a runnable demo, see `cargo run -p wordfreq-text --example rank -- <file.txt>`.

pub mod analyze;
pub mod decode;
pub mod export;
pub mod normalize;
pub mod preview;
pub mod run;
pub mod session;
pub mod stopwords;
pub mod tokenize;

pub use analyze::{Analysis, AnalysisStats, analyze, analyze_detailed};
pub use decode::{
    Candidate, DecodeError, LoadError, MAX_FILE_BYTES, RawDocument, decode, decode_detailed,
    file_too_large_message, has_txt_extension, load_text,
};
pub use export::{ExportError, to_csv_string, write_csv, write_csv_file};
pub use normalize::normalize;
pub use preview::{PreviewData, ScriptAdvisory, build_preview, script_advisory};
pub use run::{AnalysisReport, Pipeline, RunController, RunOutcome, RunToken};
pub use session::{RunPhase, SessionEvent, SessionState, transition};
pub use stopwords::{
    StopwordError, StopwordSet, load_builtin, load_builtin_or_empty, merge_stopwords,
    parse_stopwords,
};
pub use tokenize::{Tokens, tokenize};
pub use wordfreq_types::{AnalysisOptions, TokenizerOptions, WordCount};
