use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use wordfreq_text::{AnalysisOptions, analyze, load_builtin, load_text};

const USAGE: &str = "usage: cargo run -p wordfreq-text --example rank -- <file.txt> [top_n]";

fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let path = args.next().map(PathBuf::from).context(USAGE)?;
    let top_n = match args.next() {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("top_n must be a number, got {raw}"))?,
        None => 20,
    };
    if args.next().is_some() {
        bail!("too many arguments\n{USAGE}");
    }

    let stopwords_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../resources/stopwords.txt");
    let stopwords = load_builtin(&stopwords_path)
        .with_context(|| format!("loading stopwords from {}", stopwords_path.display()))?;
    let text = load_text(&path, false).with_context(|| format!("loading {}", path.display()))?;

    let options = AnalysisOptions {
        top_n,
        ..AnalysisOptions::default()
    }
    .clamped();
    let rows = analyze(&text, &stopwords, &options);

    println!("File: {}", path.display());
    println!("Distinct words shown: {}", rows.len());
    for (rank, row) in rows.iter().enumerate() {
        println!("{:>4}. {:<24} {}", rank + 1, row.word, row.count);
    }
    Ok(())
}
