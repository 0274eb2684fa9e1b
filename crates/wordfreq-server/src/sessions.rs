use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use thiserror::Error;
use tracing::info;
use wordfreq_text::{RunController, RunPhase, RunToken, SessionEvent, SessionState, transition};

pub const MAX_SESSION_ID_LEN: usize = 64;
pub const DEFAULT_MAX_SESSIONS: usize = 1_024;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("too many active sessions (limit {limit}); try again later")]
    Full { limit: usize },
}

/// All live sessions, keyed by caller-chosen id.
///
/// Holds at most `max_sessions` entries. Creating one more evicts the least
/// recently used session that has no run in flight.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Arc<Session>>>,
    clock: Arc<AtomicU64>,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            clock: Arc::new(AtomicU64::new(0)),
            max_sessions: max_sessions.max(1),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|entry| Arc::clone(entry.value()))?;
        session.touch(self.tick());
        Some(session)
    }

    pub fn get_or_create(&self, id: &str) -> Result<Arc<Session>, SessionStoreError> {
        if let Some(session) = self.get(id) {
            return Ok(session);
        }
        if self.sessions.len() >= self.max_sessions {
            self.evict_idle()?;
        }
        let session = Arc::clone(
            self.sessions
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Session::new()))
                .value(),
        );
        session.touch(self.tick());
        Ok(session)
    }

    /// Drop a session, cancelling its run. Returns `None` for unknown ids.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        session.cancel_run();
        Some(session)
    }

    fn evict_idle(&self) -> Result<(), SessionStoreError> {
        let oldest = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().is_running())
            .min_by_key(|entry| entry.value().last_used())
            .map(|entry| entry.key().clone());
        let Some(id) = oldest else {
            return Err(SessionStoreError::Full {
                limit: self.max_sessions,
            });
        };
        self.sessions.remove(&id);
        info!("evicted idle session {id}");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub fn valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// One session: its run controller and the state the transition function
/// maintains. Run identity changes happen under the state lock so the
/// controller and the state never disagree about the current generation.
pub struct Session {
    controller: RunController,
    state: Mutex<SessionState>,
    last_used: AtomicU64,
}

impl Session {
    fn new() -> Self {
        Self {
            controller: RunController::new(),
            state: Mutex::new(SessionState::default()),
            last_used: AtomicU64::new(0),
        }
    }

    fn touch(&self, tick: u64) {
        self.last_used.store(tick, Ordering::Relaxed);
    }

    fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.lock().phase == RunPhase::Running
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    /// Feed one event through [`transition`] and return the new state.
    pub fn apply(&self, event: SessionEvent) -> SessionState {
        let mut guard = self.lock();
        let next = transition(std::mem::take(&mut *guard), event);
        *guard = next.clone();
        next
    }

    /// Start a run, superseding any outstanding one.
    pub fn begin_run(&self, filename: Option<String>) -> RunToken {
        let mut guard = self.lock();
        let token = self.controller.begin();
        let next = transition(std::mem::take(&mut *guard), SessionEvent::RunStarted {
            generation: token.generation(),
            filename,
        });
        *guard = next;
        token
    }

    /// Invalidate the outstanding run, if any.
    pub fn cancel_run(&self) -> SessionState {
        let mut guard = self.lock();
        let generation = self.controller.cancel();
        let next = transition(std::mem::take(&mut *guard), SessionEvent::RunCancelled {
            generation,
        });
        *guard = next.clone();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordfreq_text::{AnalysisOptions, Pipeline, RawDocument, RunOutcome, StopwordSet};

    fn run(session: &Session, text: &str, token: &RunToken) -> SessionState {
        let built_in = StopwordSet::new();
        let doc = RawDocument::new(text.as_bytes().to_vec(), Some("doc.txt".into()));
        match Pipeline::new(&built_in, "", AnalysisOptions::default())
            .run(&doc, token)
            .unwrap()
        {
            RunOutcome::Completed(report) => session.apply(SessionEvent::RunCompleted(report)),
            RunOutcome::Cancelled => session.snapshot(),
        }
    }

    #[test]
    fn validates_ids() {
        assert!(valid_session_id("abc-123_x"));
        assert!(!valid_session_id(""));
        assert!(!valid_session_id("has space"));
        assert!(!valid_session_id(&"a".repeat(65)));
    }

    #[test]
    fn store_reuses_sessions() {
        let store = SessionStore::new();
        let a = store.get_or_create("a").unwrap();
        let again = store.get_or_create("a").unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert!(store.get("b").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_drops_session_and_cancels_its_run() {
        let store = SessionStore::new();
        let session = store.get_or_create("gone").unwrap();
        let token = session.begin_run(None);
        assert!(store.remove("gone").is_some());
        assert!(token.is_cancelled());
        assert!(store.get("gone").is_none());
        assert!(store.is_empty());
        assert!(store.remove("gone").is_none());
    }

    #[test]
    fn full_store_evicts_least_recently_used_idle_session() {
        let store = SessionStore::with_capacity(2);
        store.get_or_create("old").unwrap();
        store.get_or_create("recent").unwrap();
        store.get("old");
        store.get_or_create("new").unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("recent").is_none());
        assert!(store.get("old").is_some());
        assert!(store.get("new").is_some());
    }

    #[test]
    fn running_sessions_are_never_evicted() {
        let store = SessionStore::with_capacity(1);
        let busy = store.get_or_create("busy").unwrap();
        let _token = busy.begin_run(None);
        let err = store.get_or_create("other").err().unwrap();
        assert!(matches!(err, SessionStoreError::Full { limit: 1 }));
        assert!(store.get("busy").is_some());
    }

    #[test]
    fn older_run_cannot_overwrite_newer_one() {
        let session = Session::new();
        let first = session.begin_run(Some("one.txt".into()));
        let second = session.begin_run(Some("two.txt".into()));

        let state = run(&session, "newer newer", &second);
        assert_eq!(state.phase, RunPhase::Completed);
        assert_eq!(state.results()[0].word, "newer");

        // The first pipeline notices it was superseded and publishes nothing.
        let state = run(&session, "older older older", &first);
        assert_eq!(state.results()[0].word, "newer");
    }

    #[test]
    fn cancel_discards_in_flight_run() {
        let session = Session::new();
        let token = session.begin_run(None);
        let state = session.cancel_run();
        assert_eq!(state.phase, RunPhase::Cancelled);
        assert!(token.is_cancelled());
        let state = run(&session, "late late", &token);
        assert!(state.results().is_empty());
    }
}
