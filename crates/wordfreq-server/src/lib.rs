pub mod handlers;
pub mod sessions;

pub use handlers::{AnalyzeQuery, ApiError, AppState, router};
pub use sessions::{Session, SessionStore, SessionStoreError, valid_session_id};
