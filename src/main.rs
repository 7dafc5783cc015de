//! kothaset CLI - synthetic dataset generation via LLM teachers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use kothaset::{
    new_writer, CancelToken, GenerationConfig, Generator, ProviderRegistry, SchemaRegistry,
    TopicSampler,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "kothaset")]
#[command(version)]
#[command(about = "Generate synthetic fine-tuning datasets with an LLM teacher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "kothaset.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a dataset
    Generate {
        /// Number of samples to generate
        #[arg(short, long)]
        num_samples: Option<usize>,

        /// Dataset schema (instruction, chat, preference, classification)
        #[arg(short, long)]
        schema: Option<String>,

        /// Output JSONL file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Topics file or a single inline topic
        #[arg(short, long)]
        input: Option<String>,

        /// Provider name
        #[arg(short, long)]
        provider: Option<String>,

        /// Model identifier
        #[arg(short, long)]
        model: Option<String>,

        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Resume from a checkpoint file
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// List available schemas and their fields
    Schemas,

    /// Print an example configuration file
    Example,

    /// Validate the configuration file
    Validate,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn load_config(path: &PathBuf) -> Result<GenerationConfig> {
    if path.exists() {
        GenerationConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {path:?}"))
    } else {
        Ok(GenerationConfig::default())
    }
}

fn print_example_config() {
    let example = r#"# kothaset configuration file

num_samples = 100
schema = "instruction"           # instruction | chat | preference | classification
output_path = "data/dataset.jsonl"
input = "topics.txt"             # topics file (one per line, # comments) or inline topic

provider = "openai"
model = "gpt-4o-mini"

temperature = 0.7
max_tokens = 2048
# top_p = 0.9
# system_prompt = "You are a dataset generation assistant."

# seed = 42                      # fixed seed for every request
# random_seed = true             # or a fresh random seed per request

workers = 4
rate_limit_rpm = 0               # 0 disables throttling
max_retries = 3
retry_delay_ms = 2000
checkpoint_every = 50
cache_dir = ".kothaset"

# user_context = "Samples are for a customer support assistant."
# user_instruction = "Keep responses under 200 words."

[providers.openai]
type = "openai"
# api_key_env = "OPENAI_API_KEY"
# base_url = "https://api.openai.com/v1"
timeout_secs = 120
"#;
    println!("{example}");
}

fn print_schemas() {
    let registry = SchemaRegistry::new();
    for name in registry.list() {
        let schema = registry.get(name).expect("listed schema exists");
        println!("{name}: {}", schema.description());
        for field in schema.fields() {
            let required = if field.required { "required" } else { "optional" };
            println!(
                "  {} ({}, {}) - {}",
                field.name, field.field_type, required, field.description
            );
        }
        println!();
    }
}

async fn run_generate(config: GenerationConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let schemas = SchemaRegistry::new();
    let schema = schemas.get(&config.schema)?;

    let mut providers = ProviderRegistry::new();
    let provider = providers
        .get_or_create(&config)
        .context("Failed to build provider")?;

    let sampler = TopicSampler::new(&config.input).context("Failed to load topics")?;
    let writer = Arc::new(new_writer(&config.output_format)?);

    let progress = ProgressBar::new(config.num_samples as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
            .expect("static template is valid")
            .progress_chars("##-"),
    );

    let mut generator = Generator::new(config.clone(), provider, schema);
    generator.set_sampler(sampler);
    generator.set_writer(writer);
    let bar = progress.clone();
    generator.set_progress_callback(move |p| {
        bar.set_position(p.completed as u64);
        bar.set_message(format!("failed: {}, tokens: {}", p.failed, p.tokens_used));
    });

    let cancel = CancelToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work");
            signal_cancel.cancel();
        }
    });

    let result = generator.run(&cancel).await?;
    progress.finish_with_message(format!(
        "done: {} ok, {} failed",
        result.success_count, result.failed_count
    ));

    println!("\n=== Generation Complete ===");
    println!("Requested:  {}", result.total_samples);
    println!("Generated:  {}", result.success_count);
    println!("Failed:     {}", result.failed_count);
    println!("Tokens:     {}", result.total_tokens);
    println!("Runtime:    {:.1}s", result.duration.as_secs_f64());
    println!("Output:     {}", result.output_path.display());

    if let Some(write_error) = result.write_error {
        return Err(anyhow::Error::new(write_error).context("Run aborted by a write failure"));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Schemas => {
            print_schemas();
        }

        Commands::Validate => {
            let config = GenerationConfig::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            config.validate().context("Invalid configuration")?;
            config
                .provider_settings()
                .resolve_api_key(&config.provider)
                .context("Failed to resolve API key")?;

            println!("Configuration is valid");
            println!("  Schema:   {}", config.schema);
            println!("  Provider: {} ({})", config.provider, config.model);
            println!("  Output:   {}", config.output_path.display());
            println!("  Workers:  {}", config.workers);
        }

        Commands::Generate {
            num_samples,
            schema,
            output,
            input,
            provider,
            model,
            workers,
            resume,
        } => {
            let mut config = load_config(&cli.config)?;

            if let Some(n) = num_samples {
                config.num_samples = n;
            }
            if let Some(s) = schema {
                config.schema = s;
            }
            if let Some(o) = output {
                config.output_path = o;
            }
            if let Some(i) = input {
                config.input = i;
            }
            if let Some(p) = provider {
                config.provider = p;
            }
            if let Some(m) = model {
                config.model = m;
            }
            if let Some(w) = workers {
                config.workers = w;
            }
            if resume.is_some() {
                config.resume_from = resume;
            }

            run_generate(config).await?;
        }
    }

    Ok(())
}
