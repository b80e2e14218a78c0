//! `wordvec` command-line trainer.
//!
//! ```bash
//! # Train on a whitespace-tokenized text file with the defaults
//! wordvec train text8.txt
//!
//! # Override settings from a TOML file and flags
//! wordvec train text8.txt --config run.toml --steps 20000 --mode cbow
//!
//! # Print the default configuration as TOML
//! wordvec config
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use wordvec::{
    Mode, Word2Vec, Word2VecConfig,
    corpus::{DEFAULT_PATTERN, Tokenizer},
};

/// Train word embeddings with skip-gram or CBOW and negative sampling.
#[derive(Parser, Debug)]
#[command(name = "wordvec")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is not set (e.g. "info", "wordvec=debug").
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a plain text corpus and print neighbours of the validation words.
    Train(TrainArgs),
    /// Print the default configuration as TOML.
    Config,
}

#[derive(clap::Args, Debug)]
struct TrainArgs {
    /// UTF-8 text file to train on.
    corpus: PathBuf,

    /// TOML configuration file; missing keys keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Regex whose matches become tokens.
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// Lowercase tokens before building the vocabulary.
    #[arg(long)]
    lowercase: bool,

    #[arg(long)]
    steps: Option<u64>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    #[arg(long)]
    vocabulary_size: Option<usize>,

    #[arg(long)]
    embedding_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,

    /// Draw progress bars.
    #[arg(long)]
    progress: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    SkipGram,
    Cbow,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::SkipGram => Mode::SkipGram,
            ModeArg::Cbow => Mode::Cbow,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Command::Train(args) => train(args),
        Command::Config => {
            let text = toml::to_string_pretty(&Word2VecConfig::default())
                .context("failed to serialize default configuration")?;
            print!("{text}");
            Ok(())
        }
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let config = load_config(&args)?;

    let tokenizer = Tokenizer::new(&args.pattern)
        .with_context(|| format!("invalid token pattern {:?}", args.pattern))?
        .with_lowercase(args.lowercase);
    let tokens = tokenizer
        .tokenize_file(&args.corpus, config.show_progress)
        .with_context(|| format!("failed to read corpus {}", args.corpus.display()))?;

    let mut w2v = Word2Vec::new(config, &tokens).context("failed to set up training")?;
    let summary = w2v.run().context("training failed")?;
    if summary.anomalies > 0 {
        tracing::warn!(anomalies = summary.anomalies, "some steps were skipped");
    }

    let top_k = w2v.config().evaluation.top_k;
    let vocab = w2v.vocabulary();
    let embeddings = w2v.embeddings();
    for &id in w2v.evaluator().valid_ids() {
        let words: Vec<&str> = embeddings
            .nearest(id, top_k)
            .into_iter()
            .map(|(word, _)| word)
            .collect();
        println!(
            "Nearest to {}: {}",
            vocab.word(id).unwrap_or_default(),
            words.join(", ")
        );
    }
    Ok(())
}

/// Reads the config file (if any) and applies flag overrides, then validates.
fn load_config(args: &TrainArgs) -> Result<Word2VecConfig> {
    let mut config = match &args.config {
        Some(path) => Word2VecConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Word2VecConfig::default(),
    };

    if let Some(steps) = args.steps {
        config.training.num_steps = steps;
    }
    if let Some(mode) = args.mode {
        config.sampler.mode = mode.into();
    }
    if let Some(size) = args.vocabulary_size {
        config.vocabulary_size = size;
    }
    if let Some(size) = args.embedding_size {
        config.training.embedding_size = size;
    }
    if let Some(lr) = args.learning_rate {
        config.training.learning_rate = lr;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.show_progress |= args.progress;

    config.validate().context("invalid configuration")?;
    Ok(config)
}
