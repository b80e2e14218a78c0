//! End-to-end training runs.

use std::io::Write;

use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use wordvec::{
    AnomalyPolicy, Mode, OptimizerKind, Word2Vec, Word2VecConfig, Word2VecError,
    config::{EvaluationConfig, SamplerConfig, TrainingConfig},
    error::ConfigError,
};

const SHARED: &[&str] = &["p1", "p2", "p3", "p4"];
const LEFT: &[&str] = &["q1", "q2", "q3", "q4"];
const RIGHT: &[&str] = &["r1", "r2", "r3", "r4"];

fn pick<'a>(pool: &[&'a str], rng: &mut ChaCha8Rng) -> &'a str {
    pool.choose(rng).copied().unwrap_or(pool[0])
}

/// Three-word segments. `alpha` and `beta` are interchangeable: both sit
/// between words of the `SHARED` pool. `gamma` only ever sees `LEFT` words
/// and `delta` only `RIGHT` words, so they share no context.
fn synthetic_corpus(segments: usize, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut tokens = Vec::new();
    for _ in 0..segments {
        let (pool, centre) = match rng.gen_range(0..4) {
            0 => (SHARED, "alpha"),
            1 => (SHARED, "beta"),
            2 => (LEFT, "gamma"),
            _ => (RIGHT, "delta"),
        };
        let segment = [pick(pool, &mut rng), centre, pick(pool, &mut rng)];
        tokens.extend(segment.into_iter().map(str::to_owned));
    }
    tokens
}

const FILLERS: usize = 30;

/// `A B` pairs interleaved with single filler words drawn uniformly from
/// `f0..f29`. `A` and `B` always sit next to each other; any two fillers
/// meet only by chance.
fn paired_corpus(segments: usize, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut tokens = Vec::new();
    for _ in 0..segments {
        if rng.gen_bool(0.5) {
            tokens.extend(["A", "B"].map(str::to_owned));
        } else {
            tokens.push(format!("f{}", rng.gen_range(0..FILLERS)));
        }
    }
    tokens
}

fn config(seed: u64) -> Word2VecConfig {
    Word2VecConfig {
        vocabulary_size: 50,
        seed,
        show_progress: false,
        sampler: SamplerConfig {
            batch_size: 32,
            num_skips: 2,
            skip_window: 1,
            mode: Mode::SkipGram,
        },
        training: TrainingConfig {
            embedding_size: 16,
            num_sampled: 5,
            num_steps: 2_000,
            learning_rate: 0.05,
            report_interval: 500,
            ..Default::default()
        },
        evaluation: EvaluationConfig {
            valid_size: 4,
            valid_window: 8,
            eval_interval: 1_000_000,
            top_k: 3,
        },
    }
}

#[test]
fn test_shared_context_words_converge() {
    let mut wins = 0;
    for seed in 1..=5 {
        let tokens = synthetic_corpus(3_000, seed);
        let mut w2v = Word2Vec::new(config(seed), &tokens).expect("pipeline should build");
        let summary = w2v.run().expect("training should succeed");
        assert_eq!(summary.steps, 2_000);

        let vocab = w2v.vocabulary();
        let ids = ["alpha", "beta", "gamma", "delta"].map(|w| vocab.id(w));
        let emb = w2v.into_embeddings();
        let related = emb.similarity(ids[0], ids[1]).unwrap_or(f32::NAN);
        let unrelated = emb.similarity(ids[2], ids[3]).unwrap_or(f32::NAN);
        if related > unrelated {
            wins += 1;
        }
    }
    assert!(wins >= 4, "related pair won only {wins} of 5 runs");
}

#[test]
fn test_always_co_occurring_pair_scores_highest() {
    let mut wins = 0;
    for seed in 1..=5 {
        let tokens = paired_corpus(1_500, seed);
        let mut w2v = Word2Vec::new(config(seed), &tokens).expect("pipeline should build");
        w2v.run().expect("training should succeed");

        let vocab = w2v.vocabulary();
        let trainer = w2v.trainer();
        let (a, b) = (vocab.id("A"), vocab.id("B"));
        let pair = trainer.score(a, b).unwrap_or(f32::NAN);

        let fillers: Vec<_> = (0..FILLERS)
            .map(|i| vocab.id(&format!("f{i}")))
            .collect();
        let mut total = 0.0;
        let mut count = 0;
        for &x in &fillers {
            for &y in fillers.iter().filter(|&&y| y != x) {
                total += trainer.score(x, y).unwrap_or(f32::NAN);
                count += 1;
            }
        }
        let unrelated = total / count as f32;
        if pair > unrelated {
            wins += 1;
        }
    }
    assert!(wins >= 4, "co-occurring pair won only {wins} of 5 runs");
}

#[test]
fn test_loss_decreases_over_training() {
    let tokens = synthetic_corpus(2_000, 8);
    let mut w2v = Word2Vec::new(config(8), &tokens).expect("pipeline should build");
    let summary = w2v.run().expect("training should succeed");
    let means: Vec<f32> = summary
        .reports
        .iter()
        .filter_map(|r| r.interval_loss)
        .collect();
    assert_eq!(means.len(), 4);
    assert!(
        means[3] < means[0],
        "interval losses did not decrease: {means:?}"
    );
}

#[test]
fn test_cbow_and_alternative_optimizers_train() {
    for optimizer in [
        OptimizerKind::Sgd,
        OptimizerKind::Adagrad {
            initial_accumulator: 0.1,
        },
        OptimizerKind::default(),
    ] {
        let mut config = config(2);
        config.sampler.mode = Mode::Cbow;
        config.training.optimizer = optimizer;
        config.training.num_steps = 200;
        config.training.anomaly_policy = AnomalyPolicy::Abort;

        let tokens = synthetic_corpus(500, 2);
        let mut w2v = Word2Vec::new(config, &tokens).expect("pipeline should build");
        let summary = w2v.run().expect("training should succeed");
        assert_eq!(summary.anomalies, 0);
        assert!(summary.last_loss.is_some_and(f32::is_finite));
    }
}

#[test]
fn test_evaluation_neighbours_are_well_formed() {
    let mut config = config(4);
    config.training.num_steps = 300;
    config.evaluation.eval_interval = 100;
    let tokens = synthetic_corpus(500, 4);
    let mut w2v = Word2Vec::new(config, &tokens).expect("pipeline should build");
    let summary = w2v.run().expect("training should succeed");

    let steps: Vec<u64> = summary.evaluations.iter().map(|e| e.step).collect();
    assert_eq!(steps, vec![0, 100, 200]);
    for eval in &summary.evaluations {
        for list in &eval.neighbours {
            assert_eq!(list.neighbours.len(), 3);
            assert!(list.neighbours.iter().all(|n| n.id != list.query));
            assert!(list
                .neighbours
                .windows(2)
                .all(|w| w[0].similarity >= w[1].similarity));
        }
    }
}

#[test]
fn test_config_file_drives_run() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
    write!(
        file,
        r#"
vocabulary_size = 30
seed = 11

[sampler]
batch_size = 16
num_skips = 2
skip_window = 1
mode = "cbow"

[training]
embedding_size = 8
num_sampled = 4
num_steps = 50
learning_rate = 0.1
optimizer = {{ kind = "adagrad" }}
negative_sampling = {{ kind = "unigram", power = 0.75 }}

[evaluation]
valid_size = 2
valid_window = 5
top_k = 2
"#
    )
    .expect("temp file should be writable");

    let config = Word2VecConfig::from_file(file.path()).expect("config should load");
    assert_eq!(config.sampler.mode, Mode::Cbow);
    assert_eq!(
        config.training.optimizer,
        OptimizerKind::Adagrad {
            initial_accumulator: 0.1
        }
    );

    let tokens = synthetic_corpus(200, 11);
    let mut w2v = Word2Vec::new(config, &tokens).expect("pipeline should build");
    let summary = w2v.run().expect("training should succeed");
    assert_eq!(summary.steps, 50);
}

#[test]
fn test_config_file_errors() {
    let mut bad_syntax = tempfile::NamedTempFile::new().expect("temp file should be created");
    write!(bad_syntax, "vocabulary_size = [").expect("temp file should be writable");
    assert!(matches!(
        Word2VecConfig::from_file(bad_syntax.path()),
        Err(Word2VecError::ConfigParse(_))
    ));

    let mut bad_value = tempfile::NamedTempFile::new().expect("temp file should be created");
    write!(bad_value, "[sampler]\nnum_skips = 3\nskip_window = 1\nbatch_size = 9\n")
        .expect("temp file should be writable");
    assert!(matches!(
        Word2VecConfig::from_file(bad_value.path()),
        Err(Word2VecError::Config(ConfigError::TooManySkips { .. }))
    ));

    assert!(matches!(
        Word2VecConfig::from_file("/nonexistent/wordvec.toml"),
        Err(Word2VecError::Io(_))
    ));
}

#[test]
fn test_empty_corpus_rejected() {
    let tokens: Vec<String> = Vec::new();
    assert!(matches!(
        Word2Vec::new(config(1), &tokens),
        Err(Word2VecError::Vocab(_))
    ));
}
