//! Trains on a small synthetic corpus and prints nearest neighbours.
//!
//! Animals appear after "the" and before verbs; numbers appear in counting
//! phrases. After a few thousand steps each group clusters together.
//!
//! ```bash
//! cargo run --release --example toy_corpus
//! ```

use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use wordvec::{
    Word2Vec, Word2VecConfig,
    config::{EvaluationConfig, SamplerConfig, TrainingConfig},
};

const ANIMALS: &[&str] = &["cat", "dog", "horse", "cow", "sheep"];
const VERBS: &[&str] = &["runs", "sleeps", "eats", "jumps"];
const NUMBERS: &[&str] = &["one", "two", "three", "four", "five"];
const THINGS: &[&str] = &["apples", "stones", "books"];

fn corpus(sentences: usize, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut tokens = Vec::new();
    for _ in 0..sentences {
        let sentence: Vec<&str> = if rng.gen_bool(0.5) {
            vec![
                "the",
                ANIMALS.choose(&mut rng).copied().unwrap_or("cat"),
                VERBS.choose(&mut rng).copied().unwrap_or("runs"),
            ]
        } else {
            vec![
                "count",
                NUMBERS.choose(&mut rng).copied().unwrap_or("one"),
                THINGS.choose(&mut rng).copied().unwrap_or("books"),
            ]
        };
        tokens.extend(sentence.into_iter().map(str::to_owned));
    }
    tokens
}

fn main() -> wordvec::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = Word2VecConfig {
        vocabulary_size: 100,
        seed: 3,
        show_progress: true,
        sampler: SamplerConfig {
            batch_size: 64,
            num_skips: 2,
            skip_window: 1,
            ..Default::default()
        },
        training: TrainingConfig {
            embedding_size: 16,
            num_sampled: 5,
            num_steps: 3_000,
            learning_rate: 0.02,
            report_interval: 500,
            ..Default::default()
        },
        evaluation: EvaluationConfig {
            valid_size: 4,
            valid_window: 10,
            eval_interval: 1_000,
            top_k: 3,
        },
    };

    let tokens = corpus(5_000, 11);
    let mut w2v = Word2Vec::new(config, &tokens)?;
    w2v.run()?;

    for word in ["cat", "three"] {
        if let Some(neighbours) = w2v.nearest(word, 4) {
            let listed: Vec<String> = neighbours
                .iter()
                .map(|(w, sim)| format!("{w} ({sim:.2})"))
                .collect();
            println!("{word}: {}", listed.join(", "));
        }
    }
    Ok(())
}
