use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

pub type StopwordSet = HashSet<String>;

#[derive(Debug, Error)]
pub enum StopwordError {
    #[error("built-in stopword list not found at {}", path.display())]
    MissingBuiltInStopwordList { path: PathBuf },
    #[error("failed to read stopword list: {0}")]
    Io(#[from] io::Error),
}

/// One lowercase entry per non-empty line; `#` lines are comments.
pub fn parse_stopwords(raw: &str) -> StopwordSet {
    raw.split(is_line_break)
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

pub fn merge_stopwords(built_in: &StopwordSet, additional_raw: &str) -> StopwordSet {
    let mut merged = built_in.clone();
    merged.extend(parse_stopwords(additional_raw));
    merged
}

/// Read the packaged built-in list.
pub fn load_builtin(path: impl AsRef<Path>) -> Result<StopwordSet, StopwordError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => StopwordError::MissingBuiltInStopwordList {
            path: path.to_path_buf(),
        },
        _ => StopwordError::Io(err),
    })?;
    Ok(parse_stopwords(&raw))
}

/// [`load_builtin`], degrading to an empty set with a warning.
pub fn load_builtin_or_empty(path: impl AsRef<Path>) -> StopwordSet {
    match load_builtin(path) {
        Ok(set) => {
            info!("loaded {} built-in stopwords", set.len());
            set
        }
        Err(err) => {
            warn!("{err}; continuing without built-in stopwords");
            StopwordSet::new()
        }
    }
}
