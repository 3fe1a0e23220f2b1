//! End-to-end alignment: dictionary in, corpus and model out.

use m2maligner::aligner::{Aligner, AlignerConfig};
use m2maligner::corpus::{write_archive, write_corpus};
use m2maligner::dict::read_dictionary;
use m2maligner::model::{load_model, write_model};
use m2maligner::pruner::Pruner;

fn train_with(dict: &str, iters: usize, config: AlignerConfig) -> Aligner {
    let entries = read_dictionary(dict.as_bytes()).unwrap();
    let mut aligner = Aligner::new(config);
    for (seq1, seq2) in &entries {
        aligner.add_entry(seq1, seq2).unwrap();
    }
    aligner.train(iters, 1e-10).unwrap();
    aligner
}

fn train_from(dict: &str, iters: usize) -> Aligner {
    train_with(dict, iters, AlignerConfig::default())
}

/// 1-token subsequences force the diagonal alignment.
fn one_to_one() -> AlignerConfig {
    AlignerConfig {
        seq1_max: 1,
        seq2_max: 1,
        ..Default::default()
    }
}

fn corpus_lines(aligner: &Aligner, nbest: usize) -> Vec<String> {
    let pruner = Pruner::new(aligner.penalties.clone(), f32::INFINITY, nbest, false, true);
    let mut out = Vec::new();
    write_corpus(aligner, &pruner, &mut out).unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

#[test]
fn test_single_pair_corpus() {
    let aligner = train_with("cat\tK AE T\n", 5, one_to_one());
    let lines = corpus_lines(&aligner, 1);
    assert_eq!(lines, vec!["c}K a}AE t}T"]);
}

#[test]
fn test_dominant_alignment_wins() {
    // Ten copies pairing "ph" with a single phone, one with two: the
    // cluster alignment dominates the corpus.
    let mut dict = String::new();
    for _ in 0..10 {
        dict.push_str("ph\tF\n");
    }
    dict.push_str("ph\tP HH\n");
    let aligner = train_from(&dict, 7);
    let lines = corpus_lines(&aligner, 1);

    assert_eq!(lines.len(), 11);
    assert_eq!(lines.iter().filter(|l| l.as_str() == "p|h}F").count(), 10);
    assert_eq!(lines[10], "p}P h}HH");
}

#[test]
fn test_corpus_line_per_entry_in_input_order() {
    let aligner = train_with("cat\tK AE T\ndog\tD AO G\n", 5, one_to_one());
    let lines = corpus_lines(&aligner, 1);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "c}K a}AE t}T");
    assert_eq!(lines[1], "d}D o}AO g}G");
}

#[test]
fn test_model_round_trip_realigns_identically() {
    let aligner = train_from("cat\tK AE T\ndog\tD AO G\n", 5);
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("align.fst");
    write_model(&aligner, &model_path).unwrap();

    let mut restored = load_model(&model_path, true, false, true).unwrap();
    let entries = read_dictionary("cat\tK AE T\ndog\tD AO G\n".as_bytes()).unwrap();
    for (seq1, seq2) in &entries {
        assert!(restored.add_entry_with_model(seq1, seq2).unwrap());
    }
    let lines = corpus_lines(&restored, 1);
    assert_eq!(lines, corpus_lines(&aligner, 1));
}

#[test]
fn test_archive_holds_one_entry_per_aligned_pair() {
    let aligner = train_from("cat\tK AE T\ndog\tD AO G\n", 5);
    let pruner = Pruner::new(aligner.penalties.clone(), f32::INFINITY, 2, false, true);
    let dir = tempfile::tempdir().unwrap();
    write_archive(&aligner, &pruner, dir.path()).unwrap();

    assert!(dir.path().join("00000001.fst").exists());
    assert!(dir.path().join("00000002.fst").exists());
    assert!(!dir.path().join("00000003.fst").exists());
}

#[test]
fn test_unalignable_pair_leaves_an_archive_hole() {
    let config = AlignerConfig {
        seq1_del: false,
        seq2_del: false,
        ..Default::default()
    };
    let mut aligner = Aligner::new(config);
    let entries =
        read_dictionary("cat\tK AE T\nabcdef\tX\ndog\tD AO G\n".as_bytes()).unwrap();
    for (seq1, seq2) in &entries {
        aligner.add_entry(seq1, seq2).unwrap();
    }
    aligner.train(3, 1e-10).unwrap();

    let pruner = Pruner::new(aligner.penalties.clone(), f32::INFINITY, 1, false, true);
    let dir = tempfile::tempdir().unwrap();
    write_archive(&aligner, &pruner, dir.path()).unwrap();

    // Keys track input order; the failed pair is omitted, not renumbered.
    assert!(dir.path().join("00000001.fst").exists());
    assert!(!dir.path().join("00000002.fst").exists());
    assert!(dir.path().join("00000003.fst").exists());
}
