use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// `genrelay` - multi-provider text generation with retry and fallback.
#[derive(Parser, Debug)]
#[command(name = "genrelay")]
#[command(version)]
#[command(about = "Send one prompt through a prioritized set of LLM backends.", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.genrelay/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a response and print the normalized payload as JSON
    Generate(GenerateArgs),

    /// List configured backends and whether a credential was found
    Backends,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// The new user message
    #[arg(short, long)]
    pub prompt: String,

    /// System prompt (persona and instructions)
    #[arg(short, long)]
    pub system: Option<String>,

    /// Backend to try first (openai, anthropic, gemini, ...)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Expected response shape
    #[arg(long, value_enum, default_value_t = ShapeArg::Text)]
    pub shape: ShapeArg,

    /// Expected keys for --shape json, comma separated
    #[arg(long, value_delimiter = ',')]
    pub keys: Vec<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// JSON file holding prior turns: [{"role": "...", "content": "..."}]
    #[arg(long)]
    pub history: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeArg {
    Text,
    Code,
    Json,
}
