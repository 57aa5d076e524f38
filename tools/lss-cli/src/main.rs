// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use clap::{Args, Parser, Subcommand, ValueHint};
use serde::{Deserialize, Serialize};
use spiral_config::tracing::{flush_chrome_trace, init_tracing};
use st_lss::{
    CosineDecoder, HeadsDecoder, LssConfig, LssModel, ParsingSentence, ParsingToken, ScoredArcs,
    Vocabulary,
};
use std::error::Error;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::info;

type DynError = Box<dyn Error>;

type Result<T> = std::result::Result<T, DynError>;

/// One token of a sentence file.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct TokenRecord {
    id: i32,
    #[serde(default)]
    form: Option<String>,
    /// Overrides the punctuation flag inferred from the form.
    #[serde(default)]
    punctuation: Option<bool>,
}

impl TokenRecord {
    fn into_token(self) -> ParsingToken {
        let token = match self.form {
            Some(form) => ParsingToken::new(self.id, form),
            None => ParsingToken::formless(self.id),
        };
        match self.punctuation {
            Some(punctuation) => token.with_punctuation(punctuation),
            None => token,
        }
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Latent syntactic structure driver for SpiralTorch sequence encoders"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode a sentence and write the cosine arc scores as JSON
    Score(ScoreArgs),

    /// Print the widths and parameter count derived from a configuration
    Describe(DescribeArgs),

    /// Write freshly initialised parameters to a JSON snapshot
    Init(InitArgs),
}

#[derive(Args)]
struct ScoreArgs {
    /// Model configuration (TOML, or JSON when the extension is .json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Sentence as a JSON array of {id, form, punctuation} records
    #[arg(long, value_hint = ValueHint::FilePath)]
    sentence: PathBuf,

    /// JSON array of known forms; defaults to the forms of the sentence
    #[arg(long, value_hint = ValueHint::FilePath)]
    vocabulary: Option<PathBuf>,

    /// Parameter snapshot loaded before scoring
    #[arg(long, value_hint = ValueHint::FilePath)]
    parameters: Option<PathBuf>,

    /// Emit raw cosine similarities instead of normalised distributions
    #[arg(long)]
    raw: bool,

    /// Destination for the scored arcs; STDOUT when omitted
    #[arg(long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct DescribeArgs {
    /// Model configuration (TOML, or JSON when the extension is .json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// JSON array of known forms, used for the parameter count
    #[arg(long, value_hint = ValueHint::FilePath)]
    vocabulary: Option<PathBuf>,
}

#[derive(Args)]
struct InitArgs {
    /// Model configuration (TOML, or JSON when the extension is .json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// JSON array of known forms
    #[arg(long, value_hint = ValueHint::FilePath)]
    vocabulary: Option<PathBuf>,

    /// Destination for the parameter snapshot
    #[arg(long, value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

fn main() {
    if let Err(err) = init_tracing() {
        eprintln!("warning: {err}");
    }
    let outcome = try_main();
    flush_chrome_trace();
    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Score(args) => run_score(args),
        Command::Describe(args) => run_describe(args),
        Command::Init(args) => run_init(args),
    }
}

fn run_score(args: &ScoreArgs) -> Result<()> {
    let config = LssConfig::load(&args.config)?;
    let sentence = read_sentence(&args.sentence)?;
    let vocabulary = match &args.vocabulary {
        Some(path) => read_vocabulary(path)?,
        None => Vocabulary::from_forms(
            sentence
                .tokens()
                .iter()
                .filter_map(|token| token.form().map(str::to_owned)),
        ),
    };
    let model = LssModel::new(config, vocabulary)?;
    if let Some(path) = &args.parameters {
        model.load_parameters(path)?;
        info!(path = %path.display(), "loaded parameter snapshot");
    }
    let mut encoder = model.build_encoder(0);
    let lss = encoder.encode(&sentence)?;
    let decoder = CosineDecoder::new();
    let arcs = if args.raw {
        decoder.similarities(&lss)?
    } else {
        decoder.decode(&lss)?
    };
    info!(tokens = sentence.len(), raw = args.raw, "scored sentence");
    write_arcs(&arcs, args.output.as_deref())
}

fn run_describe(args: &DescribeArgs) -> Result<()> {
    let config = LssConfig::load(&args.config)?;
    let vocabulary = match &args.vocabulary {
        Some(path) => read_vocabulary(path)?,
        None => Vocabulary::default(),
    };
    let model = LssModel::new(config, vocabulary)?;
    let config = model.config();
    println!("token_encoding_size: {}", model.token_encoding_size());
    println!("context_vectors_size: {}", model.context_vectors_size());
    println!(
        "context: {:?} x{} ({:?})",
        config.context.connection, config.context.layers, config.context.hidden_activation
    );
    println!(
        "heads: {:?} ({:?})",
        config.heads.connection, config.heads.hidden_activation
    );
    println!("vocabulary_rows: {}", model.tokens_encoder().vocabulary().rows());
    println!("parameters: {}", model.parameter_count()?);
    Ok(())
}

fn run_init(args: &InitArgs) -> Result<()> {
    let config = LssConfig::load(&args.config)?;
    let vocabulary = match &args.vocabulary {
        Some(path) => read_vocabulary(path)?,
        None => Vocabulary::default(),
    };
    let model = LssModel::new(config, vocabulary)?;
    ensure_parent_dir(&args.output)?;
    model.save_parameters(&args.output)?;
    info!(path = %args.output.display(), "wrote parameter snapshot");
    Ok(())
}

fn read_sentence(path: &Path) -> Result<ParsingSentence> {
    let contents = fs::read_to_string(path)?;
    let records: Vec<TokenRecord> = serde_json::from_str(&contents)?;
    if records.is_empty() {
        return Err(Box::new(io::Error::new(
            ErrorKind::InvalidInput,
            "sentence file holds no tokens",
        )));
    }
    let tokens = records.into_iter().map(TokenRecord::into_token).collect();
    Ok(ParsingSentence::new(tokens)?)
}

fn read_vocabulary(path: &Path) -> Result<Vocabulary> {
    let contents = fs::read_to_string(path)?;
    let forms: Vec<String> = serde_json::from_str(&contents)?;
    Ok(Vocabulary::from_forms(forms))
}

fn write_arcs(arcs: &ScoredArcs, destination: Option<&Path>) -> Result<()> {
    let payload = serde_json::to_string_pretty(arcs)?;
    match destination {
        Some(path) => {
            ensure_parent_dir(path)?;
            fs::write(path, payload)?;
        }
        None => println!("{payload}"),
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
