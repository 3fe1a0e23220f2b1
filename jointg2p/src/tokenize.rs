//! Query-word tokenization against the model's input alphabet.

use colored::Colorize;
use rustfst::prelude::*;
use rustfst::Label;
use unicode_segmentation::UnicodeSegmentation;

/// Split a word into tokens and map them to input labels. With an empty
/// separator the word is split into Unicode grapheme clusters. Tokens
/// missing from the symbol table are warned about and dropped; decoding
/// continues on the shortened sequence.
pub fn word_to_labels(word: &str, gsep: &str, syms: &SymbolTable) -> Vec<Label> {
    let tokens: Vec<&str> = if gsep.is_empty() {
        word.graphemes(true).collect()
    } else {
        word.split(gsep).filter(|t| !t.is_empty()).collect()
    };

    tokens
        .into_iter()
        .filter_map(|token| match syms.get_label(token) {
            Some(label) => Some(label),
            None => {
                eprintln!(
                    "{} '{}' not found in input symbols table; mapping to null",
                    "Symbol:".yellow(),
                    token
                );
                None
            }
        })
        .collect()
}
