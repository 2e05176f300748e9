use crate::cli::commands::{Cli, Commands, GenerateArgs, ShapeArg};
use anyhow::{Context, Result};
use genrelay::Config;
use genrelay::llm::registry::EnvCredentialStore;
use genrelay::llm::{GenerationRequest, GenerationResult, HistoryTurn, JsonShape, Orchestrator, ResponseShape};
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate(&config, args).await,
        Commands::Backends => {
            list_backends(&config);
            Ok(())
        }
    }
}

fn load_history(path: &Path) -> Result<Vec<HistoryTurn>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("History file {} is not a JSON array of turns", path.display()))
}

fn response_shape(shape: ShapeArg, keys: &[String]) -> ResponseShape {
    match shape {
        ShapeArg::Text => ResponseShape::FreeText,
        ShapeArg::Code => ResponseShape::CodeBlock,
        ShapeArg::Json => ResponseShape::StructuredJson(JsonShape::new(
            keys.iter().map(|k| k.trim()).filter(|k| !k.is_empty()),
        )),
    }
}

fn build_request(args: GenerateArgs) -> Result<GenerationRequest> {
    let mut builder = GenerationRequest::builder(args.prompt)
        .response_shape(response_shape(args.shape, &args.keys));
    if let Some(system) = args.system {
        builder = builder.system_prompt(system);
    }
    if let Some(path) = &args.history {
        builder = builder.history(load_history(path)?);
    }
    if let Some(backend) = args.backend {
        builder = builder.preferred_backend(backend);
    }
    if let Some(temperature) = args.temperature {
        anyhow::ensure!(
            (0.0..=2.0).contains(&temperature),
            "--temperature must be between 0.0 and 2.0"
        );
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    Ok(builder.build())
}

fn render_result(result: &GenerationResult) -> Result<String> {
    let output = serde_json::json!({
        "backend": result.backend_used,
        "model": result.model,
        "payload": result.normalized_payload,
        "usage": {
            "input_tokens": result.input_tokens,
            "output_tokens": result.output_tokens,
        },
        "attempts": result.attempts.len(),
    });
    serde_json::to_string_pretty(&output).context("Failed to serialize result")
}

async fn run_generate(config: &Config, args: GenerateArgs) -> Result<()> {
    let request = build_request(args)?;
    let orchestrator = Orchestrator::from_config(config, &EnvCredentialStore);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling generation");
            on_signal.cancel();
        }
    });

    let result = orchestrator.generate_with_cancel(&request, &cancel).await;
    cancel.cancel();
    let result = result?;
    println!("{}", render_result(&result)?);
    Ok(())
}

fn list_backends(config: &Config) {
    let orchestrator = Orchestrator::from_config(config, &EnvCredentialStore);
    println!("Backends (tried in this order when no preference is given):");
    for descriptor in orchestrator.registry().all() {
        let status = if descriptor.available { "available" } else { "no credential" };
        let model = config
            .backends
            .iter()
            .find(|b| b.id.eq_ignore_ascii_case(&descriptor.id))
            .map_or("-", |b| b.model.as_str());
        println!(
            "  {:<12} priority {:<3} {:<14} {model}",
            descriptor.id, descriptor.priority, status
        );
    }
    if let Some(default) = &config.default_backend {
        println!("Default backend: {default}");
    }
}
