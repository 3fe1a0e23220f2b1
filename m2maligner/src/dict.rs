//! Training-dictionary input.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use unicode_segmentation::UnicodeSegmentation;

/// One training pair: the word as a grapheme sequence and its
/// pronunciation as a phone sequence.
pub type Entry = (Vec<String>, Vec<String>);

/// Parse a two-column tab-separated dictionary: the word, then its
/// space-separated pronunciation. The word is split into Unicode grapheme
/// clusters. Rows with no pronunciation column are kept with an empty phone
/// sequence; blank rows are skipped.
pub fn read_dictionary<R: Read>(reader: R) -> Result<Vec<Entry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(reader);

    let mut entries = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                eprintln!(
                    "{} line {}: {}",
                    "Skipping malformed dictionary row".yellow(),
                    line + 1,
                    e
                );
                continue;
            }
        };
        let word = match record.get(0) {
            Some(w) if !w.is_empty() => w,
            _ => continue,
        };
        let seq1: Vec<String> = word.graphemes(true).map(String::from).collect();
        let seq2: Vec<String> = record
            .get(1)
            .map(|p| p.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        entries.push((seq1, seq2));
    }
    Ok(entries)
}

pub fn read_dictionary_file<P: AsRef<Path>>(path: P) -> Result<Vec<Entry>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("failed to open input file {}", path.as_ref().display()))?;
    read_dictionary(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_word_and_pronunciation() {
        let data = "cat\tK AE T\ndog\tD AO G\n";
        let entries = read_dictionary(data.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, vec!["c", "a", "t"]);
        assert_eq!(entries[0].1, vec!["K", "AE", "T"]);
    }

    #[test]
    fn test_graphemes_not_bytes() {
        let data = "naïve\tN AY IY V\n";
        let entries = read_dictionary(data.as_bytes()).unwrap();
        assert_eq!(entries[0].0, vec!["n", "a", "ï", "v", "e"]);
    }

    #[test]
    fn test_missing_pronunciation_column() {
        let data = "cat\n";
        let entries = read_dictionary(data.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.is_empty());
    }
}
