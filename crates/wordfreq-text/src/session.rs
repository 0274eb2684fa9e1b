//! Explicit state machine for one analysis session.
//!
//! Front ends never mutate [`SessionState`] directly: they feed
//! [`SessionEvent`]s through [`transition`] and render whatever comes out.
//! Completions and failures carry the generation of the run that produced
//! them; anything not matching the session's current generation is dropped,
//! so a superseded or cancelled run can never overwrite newer state.

use std::sync::Arc;

use wordfreq_types::{AnalysisOptions, WordCount};

use crate::run::AnalysisReport;

pub const INITIAL_STATUS: &str = "Upload a .txt file and run an analysis.";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct SessionState {
    /// Generation of the only run allowed to publish.
    pub generation: u64,
    pub phase: RunPhase,
    pub options: AnalysisOptions,
    pub additional_stopwords: String,
    /// Last successful report; kept when a later run fails or is cancelled.
    pub report: Option<Arc<AnalysisReport>>,
    pub status_message: String,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            generation: 0,
            phase: RunPhase::Idle,
            options: AnalysisOptions::default(),
            additional_stopwords: String::new(),
            report: None,
            status_message: INITIAL_STATUS.to_string(),
        }
    }
}

impl SessionState {
    pub fn results(&self) -> &[WordCount] {
        match &self.report {
            Some(report) => &report.results,
            None => &[],
        }
    }

    /// Results whose word contains `query` (case-insensitive); blank
    /// queries return everything.
    pub fn filtered_results(&self, query: &str) -> Vec<WordCount> {
        let query = query.trim();
        if query.is_empty() {
            return self.results().to_vec();
        }
        let query = query.to_lowercase();
        self.results()
            .iter()
            .filter(|row| row.word.contains(&query))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    OptionsChanged(AnalysisOptions),
    StopwordsChanged(String),
    StopwordsCleared,
    RunStarted {
        generation: u64,
        filename: Option<String>,
    },
    RunCompleted(AnalysisReport),
    RunFailed {
        generation: u64,
        message: String,
    },
    /// The user cancelled; `generation` is the controller's new generation.
    RunCancelled { generation: u64 },
}

pub fn transition(state: SessionState, event: SessionEvent) -> SessionState {
    match event {
        SessionEvent::OptionsChanged(options) => SessionState {
            options: options.clamped(),
            ..state
        },
        SessionEvent::StopwordsChanged(raw) => SessionState {
            additional_stopwords: raw,
            status_message: "Custom stopwords updated.".to_string(),
            ..state
        },
        SessionEvent::StopwordsCleared => SessionState {
            additional_stopwords: String::new(),
            status_message: "Custom stopwords cleared.".to_string(),
            ..state
        },
        SessionEvent::RunStarted {
            generation,
            filename,
        } => {
            if generation <= state.generation {
                return state;
            }
            SessionState {
                generation,
                phase: RunPhase::Running,
                status_message: format!(
                    "Analyzing {}...",
                    filename.as_deref().unwrap_or("document")
                ),
                ..state
            }
        }
        SessionEvent::RunCompleted(report) => {
            if report.generation != state.generation || state.phase != RunPhase::Running {
                return state;
            }
            SessionState {
                phase: RunPhase::Completed,
                status_message: format!(
                    "Analysis complete. Found {} words.",
                    report.results.len()
                ),
                report: Some(Arc::new(report)),
                ..state
            }
        }
        SessionEvent::RunFailed {
            generation,
            message,
        } => {
            if generation != state.generation || state.phase != RunPhase::Running {
                return state;
            }
            SessionState {
                phase: RunPhase::Failed,
                status_message: message,
                ..state
            }
        }
        SessionEvent::RunCancelled { generation } => {
            if generation <= state.generation {
                return state;
            }
            let was_running = state.phase == RunPhase::Running;
            SessionState {
                generation,
                phase: if was_running {
                    RunPhase::Cancelled
                } else {
                    state.phase
                },
                status_message: if was_running {
                    "Analysis cancelled.".to_string()
                } else {
                    state.status_message
                },
                ..state
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Candidate;
    use crate::run::StopwordCounts;

    fn report(generation: u64, words: &[(&str, usize)]) -> AnalysisReport {
        AnalysisReport {
            generation,
            filename: Some("play.txt".into()),
            encoding: Candidate::Utf8,
            options: AnalysisOptions::default(),
            results: words.iter().map(|(w, c)| WordCount::new(*w, *c)).collect(),
            stats: Default::default(),
            stopwords: StopwordCounts::default(),
            preview: Default::default(),
            advisory: None,
        }
    }

    fn started(state: SessionState, generation: u64) -> SessionState {
        transition(state, SessionEvent::RunStarted {
            generation,
            filename: Some("play.txt".into()),
        })
    }

    #[test]
    fn completed_run_publishes_results() {
        let state = started(SessionState::default(), 1);
        assert_eq!(state.phase, RunPhase::Running);
        let state = transition(state, SessionEvent::RunCompleted(report(1, &[("king", 3)])));
        assert_eq!(state.phase, RunPhase::Completed);
        assert_eq!(state.results(), &[WordCount::new("king", 3)]);
        assert_eq!(state.status_message, "Analysis complete. Found 1 words.");
    }

    #[test]
    fn stale_completion_is_ignored() {
        let state = started(SessionState::default(), 1);
        let state = started(state, 2);
        let state = transition(state, SessionEvent::RunCompleted(report(1, &[("stale", 9)])));
        assert_eq!(state.phase, RunPhase::Running);
        assert!(state.results().is_empty());

        let state = transition(state, SessionEvent::RunCompleted(report(2, &[("fresh", 1)])));
        assert_eq!(state.results(), &[WordCount::new("fresh", 1)]);
    }

    #[test]
    fn cancelled_run_cannot_publish() {
        let state = started(SessionState::default(), 1);
        let state = transition(state, SessionEvent::RunCancelled { generation: 2 });
        assert_eq!(state.phase, RunPhase::Cancelled);
        let state = transition(state, SessionEvent::RunCompleted(report(1, &[("late", 1)])));
        assert!(state.results().is_empty());
        assert_eq!(state.status_message, "Analysis cancelled.");
    }

    #[test]
    fn failure_keeps_previous_results() {
        let state = started(SessionState::default(), 1);
        let state = transition(state, SessionEvent::RunCompleted(report(1, &[("kept", 2)])));
        let state = started(state, 2);
        let state = transition(state, SessionEvent::RunFailed {
            generation: 2,
            message: "Could not read x.txt using common encodings.".into(),
        });
        assert_eq!(state.phase, RunPhase::Failed);
        assert_eq!(state.results(), &[WordCount::new("kept", 2)]);
        assert!(state.status_message.contains("x.txt"));
    }

    #[test]
    fn late_start_after_cancel_is_ignored() {
        let state = transition(SessionState::default(), SessionEvent::RunCancelled { generation: 2 });
        let state = started(state, 1);
        assert_eq!(state.generation, 2);
        assert_eq!(state.phase, RunPhase::Idle);
    }

    #[test]
    fn filters_results_by_substring() {
        let state = started(SessionState::default(), 1);
        let state = transition(
            state,
            SessionEvent::RunCompleted(report(1, &[("hamlet", 5), ("ham", 2), ("king", 1)])),
        );
        let hits: Vec<_> = state.filtered_results(" HAM ").into_iter().map(|r| r.word).collect();
        assert_eq!(hits, vec!["hamlet", "ham"]);
        assert_eq!(state.filtered_results("  ").len(), 3);
    }

    #[test]
    fn options_are_clamped_and_stopwords_tracked() {
        let state = transition(
            SessionState::default(),
            SessionEvent::OptionsChanged(AnalysisOptions {
                top_n: 0,
                ..AnalysisOptions::default()
            }),
        );
        assert_eq!(state.options.top_n, 1);
        let state = transition(state, SessionEvent::StopwordsChanged("hamlet".into()));
        assert_eq!(state.additional_stopwords, "hamlet");
        let state = transition(state, SessionEvent::StopwordsCleared);
        assert!(state.additional_stopwords.is_empty());
        assert_eq!(state.status_message, "Custom stopwords cleared.");
    }
}
