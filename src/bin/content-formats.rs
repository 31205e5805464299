use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use content_formats::{
    FileFormat, FileSink, FormatKind, FormatRegistry, GenerationOptions, GenerationRequest,
    GenerationResult, OutputRecord, Settings,
};

#[derive(Parser)]
#[command(
    name = "content-formats",
    version,
    about = "Generate chat posts, emails, letters and newsletters from one text"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the requested formats from the input text.
    Generate {
        /// Source text every format is generated from.
        #[arg(long, short)]
        input: String,
        /// Format id to generate; repeat for several. Default: all built-in formats.
        #[arg(long = "format", short = 'f')]
        formats: Vec<String>,
        /// Write the results to this file instead of a timestamped file in OUTPUT_DIR.
        /// A `.txt` extension selects the text layout.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Print readable sections instead of JSON.
        #[arg(long)]
        pretty: bool,
        /// Sampling temperature override for every format.
        #[arg(long)]
        temperature: Option<f64>,
        /// Token cap override for every format.
        #[arg(long)]
        max_tokens: Option<u32>,
    },
    /// List the available formats.
    Formats,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("content_formats=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Generate {
            input,
            formats,
            output,
            pretty,
            temperature,
            max_tokens,
        } => {
            let options = GenerationOptions {
                temperature,
                max_tokens,
            };
            handle_generate(&settings, input, formats, options, output, pretty).await
        }
        Command::Formats => {
            handle_formats(&settings)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn handle_generate(
    settings: &Settings,
    input: String,
    formats: Vec<String>,
    options: GenerationOptions,
    output: Option<PathBuf>,
    pretty: bool,
) -> anyhow::Result<ExitCode> {
    let mut builder = settings.orchestrator_builder()?;
    if output.is_none() {
        builder = builder.sink(Arc::new(settings.file_sink()));
    }
    let orchestrator = builder.build()?;
    let formats = select_formats(formats, orchestrator.registry())?;

    let request = GenerationRequest::new(input, formats).with_options(options);
    let result = orchestrator.run(&request).await?;

    if let Some(path) = output {
        let saved = save_to(&path, &OutputRecord::new(&request, &result)).await?;
        eprintln!("Results saved to `{}`", saved.display());
    }

    if pretty {
        print_sections(&result);
    } else {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if batch_failed(&result) {
        eprintln!(
            "{} of {} formats failed",
            result.failure_count(),
            result.len()
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Formats to request: all registered built-ins when none were named.
/// Ids the registry does not know are rejected before anything runs.
fn select_formats(requested: Vec<String>, registry: &FormatRegistry) -> anyhow::Result<Vec<String>> {
    let formats: Vec<String> = if requested.is_empty() {
        FormatKind::BUILTIN
            .iter()
            .map(|(id, _)| id.to_string())
            .filter(|id| registry.contains(id))
            .collect()
    } else {
        requested
    };

    let unknown: Vec<&str> = formats
        .iter()
        .map(String::as_str)
        .filter(|id| !registry.contains(id))
        .collect();
    if !unknown.is_empty() {
        bail!(
            "unknown format(s): {}. Available: {}",
            unknown.join(", "),
            registry.ids().join(", ")
        );
    }
    Ok(formats)
}

/// Any failed format makes the process exit with status 1.
fn batch_failed(result: &GenerationResult) -> bool {
    result.failure_count() > 0
}

async fn save_to(path: &Path, record: &OutputRecord) -> anyhow::Result<PathBuf> {
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("txt") => FileFormat::Text,
        _ => FileFormat::Json,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("output path needs a file name")?;

    let saved = FileSink::new(dir)
        .with_format(format)
        .save_named(record, stem)
        .await?;
    Ok(saved)
}

fn print_sections(result: &GenerationResult) {
    for (id, outcome) in result.iter() {
        println!("=== {} ===\n", id.to_uppercase());
        match (&outcome.content, &outcome.error_detail) {
            (Some(content), _) => println!("{}\n", content),
            (None, Some(detail)) => println!("error: {}\n", detail),
            (None, None) => println!(),
        }
    }
}

fn handle_formats(settings: &Settings) -> anyhow::Result<()> {
    let store = settings.template_store()?;
    let registry = FormatRegistry::from_store(&store);

    println!("{:<20} {:<8} {}", "Format", "Kind", "Description");
    for info in registry.catalog(&store) {
        println!(
            "{:<20} {:<8} {}",
            info.id,
            if info.builtin { "builtin" } else { "custom" },
            info.description.unwrap_or_default()
        );
    }
    Ok(())
}
