use std::fs::read_to_string;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use jointg2p::decoder::{DecodeOpts, Decoder, PMASS_DISABLED};
use jointg2p::model::DecodeMode;

/// Phoneticize words with a joint N-gram model WFST.
#[derive(Parser)]
#[command(name = "g2p", version, about)]
struct Args {
    /// Input FST G2P model
    #[arg(long)]
    model: PathBuf,

    /// Input word to phoneticize
    #[arg(long)]
    word: Option<String>,

    /// Input word list to phoneticize, one word per line
    #[arg(long)]
    word_list: Option<PathBuf>,

    /// N-best hypotheses to output
    #[arg(long, default_value_t = 1)]
    nbest: usize,

    /// Decoder beam
    #[arg(long, default_value_t = 10000)]
    beam: usize,

    /// N-best comparison threshold, relative to the best hypothesis
    #[arg(long, default_value_t = 99.0)]
    threshold: f32,

    /// Probability-mass budget in (0, 1]; 1 returns the plain N-best
    #[arg(long, default_value_t = 1.0)]
    pmass: f32,

    /// Accumulate the scores of tied hypotheses instead of discarding them
    #[arg(long)]
    accumulate: bool,

    /// Reverse the input word
    #[arg(long)]
    reverse: bool,

    /// Grapheme separator; empty splits into Unicode graphemes
    #[arg(long, default_value = "")]
    grapheme_separator: String,

    /// Back-off handling: fsa_eps, fsa_phi or fst_phi
    #[arg(long, default_value = "fsa_eps")]
    decoder_type: DecodeMode,

    /// Write the word machine and lattice FSTs for debugging
    #[arg(long)]
    write_fsts: bool,
}

fn print_paths(decoder: &Decoder, word: &str, opts: &DecodeOpts) -> Result<()> {
    let results = decoder.phoneticize(word, opts)?;
    for path in results {
        let phones: Vec<&str> = path
            .uniques
            .iter()
            .filter_map(|label| decoder.osym(*label))
            .collect();
        println!("{}\t{}\t{}", word, path.path_weight, phones.join(" "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.model.is_file() {
        bail!("failed to open --model file '{}'", args.model.display());
    }
    if !(args.pmass > 0.0 && args.pmass <= 1.0) {
        bail!("--pmass must lie in (0, 1], got {}", args.pmass);
    }
    if args.word.is_none() && args.word_list.is_none() {
        bail!("either --word or --word-list must be set");
    }

    let decoder = Decoder::from_file(
        &args.model,
        args.decoder_type.clone(),
        &args.grapheme_separator,
    )?;
    let opts = DecodeOpts {
        nbest: args.nbest,
        beam: args.beam,
        threshold: args.threshold,
        accumulate: args.accumulate,
        pmass: if args.pmass < 1.0 {
            -args.pmass.ln()
        } else {
            PMASS_DISABLED
        },
        reverse: args.reverse,
        write_fsts: args.write_fsts,
    };

    if let Some(list) = &args.word_list {
        let corpus = read_to_string(list)
            .with_context(|| format!("failed to open --word-list file '{}'", list.display()))?;
        for word in corpus.lines().filter(|l| !l.is_empty()) {
            print_paths(&decoder, word, &opts)?;
        }
    } else if let Some(word) = &args.word {
        print_paths(&decoder, word, &opts)?;
    }

    Ok(())
}
