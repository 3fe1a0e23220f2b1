use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use colored::Colorize;

use m2maligner::aligner::{Aligner, AlignerConfig};
use m2maligner::corpus;
use m2maligner::dict;
use m2maligner::model;
use m2maligner::pruner::Pruner;

/// Align a pronunciation dictionary with the many-to-many EM aligner and
/// write the aligned corpus (or an N-best lattice archive).
#[derive(Parser)]
#[command(name = "align", version, about)]
struct Args {
    /// Two-column tab-separated dictionary to align
    #[arg(long)]
    input: PathBuf,

    /// Output corpus file, or archive directory with --lattice
    #[arg(long)]
    ofile: PathBuf,

    /// Allow deletions in sequence one
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    seq1_del: bool,

    /// Allow deletions in sequence two
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    seq2_del: bool,

    /// Maximum subsequence length for sequence one
    #[arg(long, default_value_t = 2)]
    seq1_max: usize,

    /// Maximum subsequence length for sequence two
    #[arg(long, default_value_t = 2)]
    seq2_max: usize,

    /// Maximum number of EM iterations to perform
    #[arg(long, default_value_t = 11)]
    iter: usize,

    /// Change threshold for EM termination
    #[arg(long, default_value_t = 1e-10)]
    thresh: f32,

    /// Output the N-best alignments given the model
    #[arg(long, default_value_t = 1)]
    nbest: usize,

    /// Pruning beam for N-best candidates; -99 disables
    #[arg(long, default_value_t = -99.0)]
    pthresh: f32,

    /// Use forward-backward pruning for the alignment lattices
    #[arg(long)]
    fb: bool,

    /// Penalize scores by subsequence size when pruning
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    penalize: bool,

    /// Penalize links during EM training
    #[arg(long)]
    penalize_em: bool,

    /// Restrict links to M-1 and 1-N during initialization
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    restrict: bool,

    /// Grow subsequence maxima for words that cannot be aligned
    #[arg(long)]
    grow: bool,

    /// Write the alignment lattices as a keyed archive instead of a corpus
    #[arg(long)]
    lattice: bool,

    /// Multi-token separator for sequence-one tokens
    #[arg(long, default_value = "|")]
    seq1_sep: String,

    /// Multi-token separator for sequence-two tokens
    #[arg(long, default_value = "|")]
    seq2_sep: String,

    /// Token separating the input and output sides of a multigram
    #[arg(long, default_value = "}")]
    s1s2_sep: String,

    /// Skip token for null transitions; distinct from epsilon
    #[arg(long, default_value = "_")]
    skip: String,

    /// Write the trained alignment model to this path
    #[arg(long)]
    write_model: Option<PathBuf>,

    /// Load a pre-trained alignment model instead of training
    #[arg(long)]
    load_model: bool,

    /// Alignment model to load with --load-model
    #[arg(long)]
    model_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let entries = dict::read_dictionary_file(&args.input)?;
    if entries.is_empty() {
        bail!("no usable entries in {}", args.input.display());
    }
    eprintln!("{} {} entries", "Loaded".blue(), entries.len());

    let mut aligner = if args.load_model {
        let path = match &args.model_file {
            Some(p) => p,
            None => bail!("--load-model requires --model-file"),
        };
        eprintln!("{} {}", "Restoring alignment model from".blue(), path.display());
        model::load_model(path, args.penalize, args.penalize_em, args.restrict)?
    } else {
        Aligner::new(AlignerConfig {
            seq1_del: args.seq1_del,
            seq2_del: args.seq2_del,
            seq1_max: args.seq1_max,
            seq2_max: args.seq2_max,
            seq1_sep: args.seq1_sep.clone(),
            seq2_sep: args.seq2_sep.clone(),
            s1s2_sep: args.s1s2_sep.clone(),
            skip: args.skip.clone(),
            penalize: args.penalize,
            penalize_em: args.penalize_em,
            restrict: args.restrict,
            grow: args.grow,
        })
    };

    let mut failed = 0usize;
    for (seq1, seq2) in &entries {
        let aligned = if args.load_model {
            aligner.add_entry_with_model(seq1, seq2)?
        } else {
            aligner.add_entry(seq1, seq2)?
        };
        if !aligned {
            failed += 1;
        }
    }
    if failed > 0 {
        eprintln!(
            "{} {} pairs could not be aligned and were skipped",
            "Warning:".yellow(),
            failed
        );
    }

    if !args.load_model {
        eprintln!("{}", "Starting EM...".blue());
        aligner.train(args.iter, args.thresh)?;
    }

    if let Some(model_path) = &args.write_model {
        eprintln!(
            "{} {}",
            "Writing alignment model to".blue(),
            model_path.display()
        );
        model::write_model(&aligner, model_path)?;
    }

    let beam = if args.pthresh == -99.0 {
        f32::INFINITY
    } else {
        args.pthresh
    };
    let pruner = Pruner::new(
        aligner.penalties.clone(),
        beam,
        args.nbest,
        args.fb,
        args.penalize,
    );

    if args.lattice {
        corpus::write_archive(&aligner, &pruner, &args.ofile)?;
    } else {
        let file = File::create(&args.ofile)
            .with_context(|| format!("failed to create {}", args.ofile.display()))?;
        let mut out = BufWriter::new(file);
        corpus::write_corpus(&aligner, &pruner, &mut out)?;
    }

    eprintln!("{}", "Done.".green());
    Ok(())
}
