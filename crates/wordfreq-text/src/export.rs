use std::borrow::Cow;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;
use wordfreq_types::WordCount;

pub const CSV_HEADER: &str = "word,count";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No results to export.")]
    Empty,
    #[error("CSV export failed: {0}")]
    Io(#[from] io::Error),
}

/// Write `word,count` rows separated by `\n`, quoting fields as RFC 4180 does.
pub fn write_csv<W: Write>(rows: &[WordCount], mut writer: W) -> io::Result<()> {
    writer.write_all(CSV_HEADER.as_bytes())?;
    for row in rows {
        write!(writer, "\n{},{}", escape_field(&row.word), row.count)?;
    }
    writer.flush()
}

pub fn to_csv_string(rows: &[WordCount]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + rows.len() * 16);
    out.push_str(CSV_HEADER);
    for row in rows {
        out.push('\n');
        out.push_str(&escape_field(&row.word));
        out.push(',');
        out.push_str(&row.count.to_string());
    }
    out
}

/// Replace `path` with the CSV in one step, via a temp file in the same
/// directory.
pub fn write_csv_file(rows: &[WordCount], path: impl AsRef<Path>) -> Result<(), ExportError> {
    if rows.is_empty() {
        return Err(ExportError::Empty);
    }
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    write_csv(rows, tmp.as_file_mut())?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

pub fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
