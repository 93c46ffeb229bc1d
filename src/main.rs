//! english - compile plain English into source code.
//!
//! Sends a description to a local Ollama-compatible endpoint and prints the
//! code it returns. Model, endpoint and API key live in `~/.english/config.txt`.

mod config;
mod error;
mod llm;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{ConfigStore, Configuration};
use llm::CompletionClient;
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "english")]
#[command(author, version, about = "Compile English descriptions into code with a local LLM")]
struct Cli {
    /// Print request and response diagnostics to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Change a stored setting
    Set {
        #[command(subcommand)]
        setting: SetAction,
    },
    /// Show a stored setting
    Get {
        #[command(subcommand)]
        setting: GetAction,
    },
    /// Compile an English description to LANGUAGE
    Compile(CompileArgs),
}

#[derive(Subcommand)]
enum SetAction {
    /// Set the model to use (e.g., llama3, codellama, mistral, gemma)
    Model {
        name: String,
    },
    /// Set the inference endpoint URL
    Endpoint {
        url: String,
    },
    /// Set the API key sent as a bearer token
    ApiKey {
        key: String,
    },
}

#[derive(Subcommand)]
enum GetAction {
    /// Show the current model
    Model,
    /// Show the current endpoint URL
    Endpoint,
    /// Show whether an API key is stored (masked)
    ApiKey,
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Target programming language (e.g., python, rust, javascript)
    language: String,

    /// Read the English description from a file instead of stdin
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Write the generated code to a file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Override the stored model for this run
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Override the stored endpoint for this run
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Truncate the generated code to at most BYTES bytes
    #[arg(long, value_name = "BYTES")]
    max_output: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = report_error(&e, &mut std::io::stderr());
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr so stdout only ever carries generated code.
fn init_logging(verbose: bool) -> Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(verbose, env.as_deref())?;
    log_subscriber(filter, std::io::stderr)
        .try_init()
        .context("Could not initialize logging")
}

/// `RUST_LOG` replaces the default filter, but `--verbose` always turns on
/// debug output for this crate on top of whatever it says.
fn log_filter(verbose: bool, env: Option<&str>) -> Result<EnvFilter> {
    let default = if verbose {
        "english=debug,reqwest=warn"
    } else {
        "english=warn"
    };
    let filter = env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    if verbose {
        Ok(filter.add_directive("english=debug".parse()?))
    } else {
        Ok(filter)
    }
}

fn log_subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .without_time()
        .with_target(false)
        .finish()
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Set { setting } => handle_set(setting),
        Commands::Get { setting } => handle_get(setting),
        Commands::Compile(args) => handle_compile(args).await,
    }
}

fn open_store() -> Result<ConfigStore> {
    ConfigStore::open().context("Could not initialize configuration")
}

/// Handle set subcommands.
fn handle_set(action: SetAction) -> Result<()> {
    let mut store = open_store()?;
    match action {
        SetAction::Model { name } => {
            store.set_model(&name).context("Failed to set model")?;
            println!("Model set to '{}' successfully.", name);
        }
        SetAction::Endpoint { url } => {
            store.set_endpoint(&url).context("Failed to set endpoint")?;
            println!("Endpoint set to: {}", url);
        }
        SetAction::ApiKey { key } => {
            store.set_api_key(&key).context("Failed to set API key")?;
            println!("API key saved to {}", store.path().display());
        }
    }
    Ok(())
}

/// Handle get subcommands.
fn handle_get(action: GetAction) -> Result<()> {
    let store = open_store()?;
    match action {
        GetAction::Model => println!("Current model: {}", store.model()),
        GetAction::Endpoint => println!("Current endpoint: {}", store.endpoint()),
        GetAction::ApiKey => match store.api_key() {
            Some(key) => println!("Current API key: {}", mask_key(key)),
            None => println!("No API key set"),
        },
    }
    Ok(())
}

/// Handle the compile command.
async fn handle_compile(mut args: CompileArgs) -> Result<()> {
    let store = open_store()?;
    let config = store
        .config()
        .clone()
        .with_overrides(args.model.take(), args.endpoint.take());

    let description = read_description(args.file.as_deref())?;
    compile_to_output(&config, &args, &description, &mut std::io::stdout()).await
}

/// Compile `description` and write the code to the output file, or to
/// `stdout` when none was given. Nothing is written if compilation fails.
async fn compile_to_output(
    config: &Configuration,
    args: &CompileArgs,
    description: &str,
    stdout: &mut impl Write,
) -> Result<()> {
    let client = CompletionClient::new(config)?.with_max_output(args.max_output);
    debug!(
        "Compiling to {} with {} at {}",
        args.language,
        client.model(),
        client.endpoint()
    );

    let code = client
        .compile(description, &args.language)
        .await
        .with_context(|| {
            format!(
                "Failed to compile English to {} with model '{}'",
                args.language,
                client.model()
            )
        })?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", code))
                .with_context(|| format!("Could not write output file {}", path.display()))?;
            debug!("Wrote {} bytes to {}", code.len() + 1, path.display());
        }
        None => writeln!(stdout, "{}", code).context("Could not write to stdout")?,
    }
    Ok(())
}

/// Read the description from `file`, or stdin when no file is given.
fn read_description(file: Option<&Path>) -> Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Could not open input file {}", path.display()));
    }

    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Enter English description (Ctrl+D to end):");
    }
    let mut description = String::new();
    stdin
        .read_to_string(&mut description)
        .context("Could not read description from stdin")?;
    Ok(description)
}

/// Print the error chain, plus a hint for errors the user can fix themselves.
fn report_error(err: &anyhow::Error, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "Error: {:#}", err)?;
    if err
        .downcast_ref::<error::Error>()
        .is_some_and(error::Error::is_model_not_found)
    {
        writeln!(out, "The configured model is not available at the endpoint.")?;
        writeln!(out, "Try setting a different model with 'english set model MODEL_NAME'")?;
        writeln!(out, "Common Ollama models include: llama3, codellama, mistral, gemma")?;
    }
    Ok(())
}

/// Show only the last four characters of a key.
fn mask_key(key: &str) -> String {
    let visible: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if visible.len() == key.len() {
        "*".repeat(key.chars().count())
    } else {
        format!("****{}", visible)
    }
}
