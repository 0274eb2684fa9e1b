use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, info};
use wordfreq_types::{AnalysisOptions, WordCount};

use crate::analyze::{AnalysisStats, FrequencyCounter};
use crate::decode::{Candidate, LoadError, RawDocument, decode_document};
use crate::normalize::normalize;
use crate::preview::{PreviewData, ScriptAdvisory, build_preview, script_advisory};
use crate::stopwords::{StopwordSet, merge_stopwords, parse_stopwords};
use crate::tokenize::tokenize;

/// Tokens counted between two cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4_096;

/// Issues run tokens; only the most recently issued one is current.
#[derive(Clone, Debug, Default)]
pub struct RunController {
    current: Arc<AtomicU64>,
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run, invalidating whatever run was outstanding.
    pub fn begin(&self) -> RunToken {
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        RunToken {
            generation,
            current: Arc::clone(&self.current),
        }
    }

    /// Invalidate the outstanding run. Returns the new generation.
    pub fn cancel(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn generation(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug)]
pub struct RunToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl RunToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        !self.is_current()
    }
}

/// Sizes of the stopword sets that were in effect for a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StopwordCounts {
    pub built_in: usize,
    pub additional: usize,
    pub merged: usize,
}

/// Everything a completed run publishes.
#[derive(Clone, Debug)]
pub struct AnalysisReport {
    pub generation: u64,
    pub filename: Option<String>,
    pub encoding: Candidate,
    pub options: AnalysisOptions,
    pub results: Vec<WordCount>,
    pub stats: AnalysisStats,
    pub stopwords: StopwordCounts,
    pub preview: PreviewData,
    pub advisory: Option<ScriptAdvisory>,
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Completed(AnalysisReport),
    /// The token was invalidated; nothing is published.
    Cancelled,
}

/// Decode -> tokenize -> count over one document, checking a [`RunToken`]
/// between stages.
pub struct Pipeline<'a> {
    built_in: &'a StopwordSet,
    additional_stopwords: &'a str,
    options: AnalysisOptions,
}

impl<'a> Pipeline<'a> {
    /// Numeric options are clamped here.
    pub fn new(
        built_in: &'a StopwordSet,
        additional_stopwords: &'a str,
        options: AnalysisOptions,
    ) -> Self {
        Self {
            built_in,
            additional_stopwords,
            options: options.clamped(),
        }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn run(&self, document: &RawDocument, token: &RunToken) -> Result<RunOutcome, LoadError> {
        self.run_with(document, token, |_| {})
    }

    /// [`Pipeline::run`] with a callback invoked at every checkpoint, just
    /// before the token is checked.
    pub(crate) fn run_with(
        &self,
        document: &RawDocument,
        token: &RunToken,
        mut at: impl FnMut(Checkpoint),
    ) -> Result<RunOutcome, LoadError> {
        let start = Instant::now();
        let name = document.display_name();
        let mut superseded = |point: Checkpoint| {
            at(point);
            token.is_cancelled()
        };

        if superseded(Checkpoint::BeforeDecode) {
            return Ok(cancelled(name, token, Checkpoint::BeforeDecode));
        }
        let decoded = decode_document(document)?;

        if superseded(Checkpoint::AfterDecode) {
            return Ok(cancelled(name, token, Checkpoint::AfterDecode));
        }
        let normalized = normalize(&decoded.text);
        let additional = parse_stopwords(self.additional_stopwords);
        let merged = merge_stopwords(self.built_in, self.additional_stopwords);

        if superseded(Checkpoint::AfterNormalize) {
            return Ok(cancelled(name, token, Checkpoint::AfterNormalize));
        }
        let mut counter = FrequencyCounter::new(&merged, self.options.min_word_length);
        for word in tokenize(&normalized, self.options.tokenizer()) {
            counter.observe(word);
            if counter.tokens_seen() % CANCEL_CHECK_INTERVAL == 0
                && superseded(Checkpoint::Counting)
            {
                return Ok(cancelled(name, token, Checkpoint::Counting));
            }
        }

        if superseded(Checkpoint::AfterCounting) {
            return Ok(cancelled(name, token, Checkpoint::AfterCounting));
        }
        let analysis = counter.finish(self.options.top_n);
        info!(
            "analyzed {name} as {} in {} ms: {} tokens, {} distinct words",
            decoded.encoding,
            start.elapsed().as_millis(),
            analysis.stats.tokens,
            analysis.stats.distinct_words
        );

        Ok(RunOutcome::Completed(AnalysisReport {
            generation: token.generation(),
            filename: document.filename().map(str::to_string),
            encoding: decoded.encoding,
            options: self.options,
            results: analysis.results,
            stats: analysis.stats,
            stopwords: StopwordCounts {
                built_in: self.built_in.len(),
                additional: additional.len(),
                merged: merged.len(),
            },
            preview: build_preview(&decoded.text),
            advisory: script_advisory(&decoded.text),
        }))
    }
}

/// Where a run stops to check its token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Checkpoint {
    BeforeDecode,
    AfterDecode,
    AfterNormalize,
    /// Every [`CANCEL_CHECK_INTERVAL`] tokens.
    Counting,
    AfterCounting,
}

impl Checkpoint {
    fn label(self) -> &'static str {
        match self {
            Checkpoint::BeforeDecode => "before decode",
            Checkpoint::AfterDecode => "after decode",
            Checkpoint::AfterNormalize => "after normalize",
            Checkpoint::Counting => "while counting",
            Checkpoint::AfterCounting => "after counting",
        }
    }
}

fn cancelled(name: &str, token: &RunToken, at: Checkpoint) -> RunOutcome {
    debug!("run {} for {name} superseded {}", token.generation(), at.label());
    RunOutcome::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> StopwordSet {
        parse_stopwords("the\nand")
    }

    fn completed(outcome: RunOutcome) -> AnalysisReport {
        match outcome {
            RunOutcome::Completed(report) => report,
            RunOutcome::Cancelled => panic!("run was cancelled"),
        }
    }

    #[test]
    fn newer_run_invalidates_older_token() {
        let controller = RunController::new();
        let first = controller.begin();
        assert!(first.is_current());
        let second = controller.begin();
        assert!(first.is_cancelled());
        assert!(second.is_current());
        assert_eq!(second.generation(), first.generation() + 1);

        let after_cancel = controller.cancel();
        assert!(second.is_cancelled());
        assert_eq!(controller.generation(), after_cancel);
    }

    #[test]
    fn pipeline_reports_results_and_stats() {
        let built_in = builtin();
        let pipeline = Pipeline::new(&built_in, "banana\n# fruit", AnalysisOptions::default());
        let doc = RawDocument::new(
            "Apple apple, the banana\r\nand orange ORANGE".as_bytes().to_vec(),
            Some("fruit.txt".into()),
        );
        let token = RunController::new().begin();
        let report = completed(pipeline.run(&doc, &token).unwrap());

        assert_eq!(report.results, vec![
            WordCount::new("apple", 2),
            WordCount::new("orange", 2),
        ]);
        assert_eq!(report.encoding, Candidate::Utf8);
        assert_eq!(report.stats.tokens, 7);
        assert_eq!(report.stats.skipped_stopwords, 3);
        assert_eq!(report.stopwords, StopwordCounts {
            built_in: 2,
            additional: 1,
            merged: 3,
        });
        assert_eq!(report.filename.as_deref(), Some("fruit.txt"));
        assert!(!report.preview.compact.contains('\r'));
    }

    #[test]
    fn pipeline_clamps_options() {
        let built_in = StopwordSet::new();
        let pipeline = Pipeline::new(&built_in, "", AnalysisOptions {
            top_n: 0,
            ..AnalysisOptions::default()
        });
        assert_eq!(pipeline.options().top_n, 1);
        let doc = RawDocument::new(b"aa bb bb".to_vec(), None);
        let report = completed(pipeline.run(&doc, &RunController::new().begin()).unwrap());
        assert_eq!(report.results, vec![WordCount::new("bb", 2)]);
    }

    #[test]
    fn superseded_token_publishes_nothing() {
        let built_in = builtin();
        let pipeline = Pipeline::new(&built_in, "", AnalysisOptions::default());
        let controller = RunController::new();
        let stale = controller.begin();
        controller.cancel();
        let doc = RawDocument::new(b"hello hello".to_vec(), None);
        assert!(matches!(
            pipeline.run(&doc, &stale).unwrap(),
            RunOutcome::Cancelled
        ));
    }

    fn long_document() -> RawDocument {
        let text = "alpha beta gamma delta ".repeat(2 * CANCEL_CHECK_INTERVAL);
        RawDocument::new(text.into_bytes(), Some("long.txt".into()))
    }

    #[test]
    fn cancellation_is_seen_at_every_checkpoint() {
        let built_in = builtin();
        let pipeline = Pipeline::new(&built_in, "", AnalysisOptions::default());
        let doc = long_document();
        for target in [
            Checkpoint::AfterDecode,
            Checkpoint::AfterNormalize,
            Checkpoint::Counting,
            Checkpoint::AfterCounting,
        ] {
            let controller = RunController::new();
            let token = controller.begin();
            let mut seen = Vec::new();
            let outcome = pipeline
                .run_with(&doc, &token, |point| {
                    seen.push(point);
                    if point == target {
                        controller.cancel();
                    }
                })
                .unwrap();
            assert!(matches!(outcome, RunOutcome::Cancelled), "{target:?}");
            assert_eq!(seen.last(), Some(&target));
            assert_eq!(seen.iter().filter(|&&p| p == target).count(), 1);
        }
    }

    #[test]
    fn checkpoints_run_in_order_when_uncancelled() {
        let built_in = builtin();
        let pipeline = Pipeline::new(&built_in, "", AnalysisOptions::default());
        let mut seen = Vec::new();
        let outcome = pipeline
            .run_with(&long_document(), &RunController::new().begin(), |point| {
                seen.push(point)
            })
            .unwrap();
        assert_eq!(completed(outcome).stats.tokens, 8 * CANCEL_CHECK_INTERVAL);
        assert_eq!(seen[..3], [
            Checkpoint::BeforeDecode,
            Checkpoint::AfterDecode,
            Checkpoint::AfterNormalize
        ]);
        assert_eq!(
            seen.iter().filter(|&&p| p == Checkpoint::Counting).count(),
            8
        );
        assert_eq!(seen.last(), Some(&Checkpoint::AfterCounting));
    }

    #[test]
    fn run_cancelled_from_another_thread_while_counting() {
        let built_in = builtin();
        let controller = RunController::new();
        let token = controller.begin();
        let (reached_tx, reached_rx) = std::sync::mpsc::channel();
        let (resume_tx, resume_rx) = std::sync::mpsc::channel::<()>();

        let canceller = std::thread::spawn(move || {
            reached_rx.recv().unwrap();
            controller.cancel();
            resume_tx.send(()).unwrap();
        });

        let pipeline = Pipeline::new(&built_in, "", AnalysisOptions::default());
        let mut signalled = false;
        let outcome = pipeline
            .run_with(&long_document(), &token, |point| {
                if point == Checkpoint::Counting && !signalled {
                    signalled = true;
                    reached_tx.send(()).unwrap();
                    resume_rx.recv().unwrap();
                }
            })
            .unwrap();
        canceller.join().unwrap();

        assert!(signalled);
        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert!(token.is_cancelled());
    }

    #[test]
    fn unreadable_documents_surface_errors() {
        let built_in = builtin();
        let pipeline = Pipeline::new(&built_in, "", AnalysisOptions::default());
        let doc = RawDocument::new(vec![0x01, 0x02, 0x03], Some("bad.txt".into()));
        let err = pipeline
            .run(&doc, &RunController::new().begin())
            .unwrap_err();
        assert!(matches!(err, LoadError::Unreadable(_)));
        assert!(err.to_string().contains("bad.txt"));
    }
}
